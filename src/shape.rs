//! Layer shape arithmetic.
//!
//! A network with neuron counts `[n_0, n_1, …, n_H, n_{H+1}]` has `H + 1`
//! weight layers. Weight layer `i` maps `n_{i-1}` neurons to `n_i` neurons and
//! is stored as an `(n_i, n_{i-1} + 1)` matrix whose last column is the bias.
//!
//! ```rust
//! use adjnet::NetworkShape;
//!
//! let shape = NetworkShape::new(2, &[10, 10], 1).unwrap();
//! // 10·(2+1) + 10·(10+1) + 1·(10+1)
//! assert_eq!(shape.param_count(), 151);
//! assert_eq!(shape.layers()[0].rows(), 10);
//! assert_eq!(shape.layers()[0].cols(), 3);
//! ```

use crate::config::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape of one weight layer: `rows` output neurons, `cols = inputs + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "LayerShapeRepr"))]
pub struct LayerShape {
    rows: usize,
    cols: usize,
}

/// Unchecked wire form of [`LayerShape`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct LayerShapeRepr {
    rows: usize,
    cols: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<LayerShapeRepr> for LayerShape {
    type Error = ConfigError;

    fn try_from(repr: LayerShapeRepr) -> Result<Self, Self::Error> {
        if repr.rows == 0 {
            return Err(ConfigError::InvalidDimension("layer rows must be >= 1"));
        }
        if repr.cols < 2 {
            return Err(ConfigError::InvalidDimension("layer cols must be >= 2"));
        }
        Ok(Self {
            rows: repr.rows,
            cols: repr.cols,
        })
    }
}

impl LayerShape {
    /// Shape of the layer mapping `in_dim` neurons to `out_dim` neurons.
    #[inline]
    pub const fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            rows: out_dim,
            cols: in_dim + 1,
        }
    }

    /// Output neurons.
    #[inline]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Input neurons plus the bias column.
    #[inline]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Number of scalars in the layer, bias included.
    #[inline]
    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Always `false` for a validated shape.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Input neurons (bias excluded).
    #[inline]
    pub const fn in_dim(&self) -> usize {
        self.cols - 1
    }

    /// Output neurons.
    #[inline]
    pub const fn out_dim(&self) -> usize {
        self.rows
    }
}

/// Validated neuron counts and the weight-layer shapes they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "NetworkShapeRepr"))]
pub struct NetworkShape {
    dims: Vec<usize>,
    layers: Vec<LayerShape>,
    param_count: usize,
}

/// Wire form of [`NetworkShape`]; layers and count are rebuilt from `dims`.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct NetworkShapeRepr {
    dims: Vec<usize>,
}

#[cfg(feature = "serde")]
impl TryFrom<NetworkShapeRepr> for NetworkShape {
    type Error = ConfigError;

    fn try_from(repr: NetworkShapeRepr) -> Result<Self, Self::Error> {
        Self::from_dims(&repr.dims)
    }
}

impl NetworkShape {
    /// Builds the shape for `input → hidden… → output`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ZeroNeurons`] if any count is zero
    /// - [`ConfigError::NoHiddenLayers`] if `hidden` is empty
    pub fn new(input: usize, hidden: &[usize], output: usize) -> Result<Self, ConfigError> {
        let mut dims = Vec::with_capacity(hidden.len() + 2);
        dims.push(input);
        dims.extend_from_slice(hidden);
        dims.push(output);
        Self::from_dims(&dims)
    }

    /// Builds the shape from the full neuron-count list
    /// `[input, hidden…, output]`.
    pub fn from_dims(dims: &[usize]) -> Result<Self, ConfigError> {
        if dims.len() < 3 {
            return Err(ConfigError::NoHiddenLayers);
        }
        if let Some(layer) = dims.iter().position(|&n| n == 0) {
            return Err(ConfigError::ZeroNeurons { layer });
        }

        let layers: Vec<LayerShape> = dims
            .windows(2)
            .map(|pair| LayerShape::new(pair[0], pair[1]))
            .collect();
        let param_count = layers.iter().map(LayerShape::len).sum();

        Ok(Self {
            dims: dims.to_vec(),
            layers,
            param_count,
        })
    }

    /// Full neuron-count list `[input, hidden…, output]`.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Weight-layer shapes, input side first.
    #[inline]
    pub fn layers(&self) -> &[LayerShape] {
        &self.layers
    }

    /// Required parameter-vector length.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Input neurons.
    #[inline]
    pub fn input_dim(&self) -> usize {
        self.dims[0]
    }

    /// Output neurons.
    #[inline]
    pub fn output_dim(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    /// Hidden-layer neuron counts.
    #[inline]
    pub fn hidden_dims(&self) -> &[usize] {
        &self.dims[1..self.dims.len() - 1]
    }

    /// Number of hidden layers (`H`).
    #[inline]
    pub fn num_hidden(&self) -> usize {
        self.dims.len() - 2
    }

    /// Number of weight layers (`H + 1`).
    #[inline]
    pub fn num_weight_layers(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_count_two_hidden() {
        let shape = NetworkShape::new(2, &[10, 10], 1).unwrap();
        assert_eq!(shape.param_count(), 30 + 110 + 11);
        assert_eq!(shape.num_weight_layers(), 3);
        assert_eq!(
            shape.layers(),
            &[
                LayerShape::new(2, 10),
                LayerShape::new(10, 10),
                LayerShape::new(10, 1),
            ]
        );
    }

    #[test]
    fn test_layer_shape_accessors() {
        let shape = LayerShape::new(4, 3);
        assert_eq!(shape.rows(), 3);
        assert_eq!(shape.cols(), 5);
        assert_eq!(shape.in_dim(), 4);
        assert_eq!(shape.out_dim(), 3);
        assert_eq!(shape.len(), 15);
        assert!(!shape.is_empty());
    }

    #[test]
    fn test_single_hidden_layer() {
        let shape = NetworkShape::new(2, &[5], 1).unwrap();
        assert_eq!(shape.param_count(), 5 * 3 + 6);
        assert_eq!(shape.num_hidden(), 1);
        assert_eq!(shape.hidden_dims(), &[5]);
        assert_eq!(shape.input_dim(), 2);
        assert_eq!(shape.output_dim(), 1);
    }

    #[test]
    fn test_zero_neurons_rejected() {
        assert_eq!(
            NetworkShape::new(0, &[4], 1),
            Err(ConfigError::ZeroNeurons { layer: 0 })
        );
        assert_eq!(
            NetworkShape::new(3, &[4, 0], 1),
            Err(ConfigError::ZeroNeurons { layer: 2 })
        );
        assert_eq!(
            NetworkShape::new(3, &[4], 0),
            Err(ConfigError::ZeroNeurons { layer: 2 })
        );
    }

    #[test]
    fn test_no_hidden_layers_rejected() {
        assert_eq!(NetworkShape::new(3, &[], 1), Err(ConfigError::NoHiddenLayers));
        assert_eq!(NetworkShape::from_dims(&[3]), Err(ConfigError::NoHiddenLayers));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_validates_shapes() {
        let shape: LayerShape = serde_json::from_str(r#"{"rows":3,"cols":5}"#).unwrap();
        assert_eq!(shape, LayerShape::new(4, 3));
        assert!(serde_json::from_str::<LayerShape>(r#"{"rows":3,"cols":0}"#).is_err());
        assert!(serde_json::from_str::<LayerShape>(r#"{"rows":0,"cols":4}"#).is_err());

        let net = NetworkShape::new(2, &[5], 1).unwrap();
        let json = serde_json::to_string(&net).unwrap();
        assert_eq!(serde_json::from_str::<NetworkShape>(&json).unwrap(), net);
        // the stored count is recomputed, not trusted
        let forged = r#"{"dims":[2,5,1],"layers":[],"param_count":7}"#;
        assert_eq!(serde_json::from_str::<NetworkShape>(forged).unwrap(), net);
        assert!(serde_json::from_str::<NetworkShape>(r#"{"dims":[2,1]}"#).is_err());
    }
}
