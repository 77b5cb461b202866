//! Weight layers and the flat parameter-vector format.
//!
//! # Layer Layout
//!
//! Weight layer `i` maps `n_{i-1}` neurons to `n_i` neurons and is stored as a
//! row-major `(n_i, n_{i-1} + 1)` matrix: row `o` holds the incoming weights
//! of neuron `o` followed by its bias.
//!
//! # Parameter Vector Order (Critical!)
//!
//! The flat vector is consumed starting from the **output-side** layer, then
//! backward through the hidden-to-hidden layers, ending at the input-side
//! layer. Within a layer, elements are row-major (all columns of neuron 1,
//! then neuron 2, …) with the bias last. Saved and exported models depend on
//! this order bit for bit.
//!
//! ```rust
//! use adjnet::{pack, unpack, NetworkShape};
//!
//! let shape = NetworkShape::new(1, &[1], 1).unwrap();
//! // output layer [w, b], then input layer [w, b]
//! let params = vec![2.0, 0.5, -1.0, 0.25];
//! let layers = unpack(&params, &shape).unwrap();
//!
//! assert_eq!(layers.get(1).row(0), &[2.0, 0.5]);
//! assert_eq!(layers.get(0).row(0), &[-1.0, 0.25]);
//! assert_eq!(pack(&layers), params);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{AdjnetError, AdjnetResult};
use crate::shape::{LayerShape, NetworkShape};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Issues a process-unique weights version token.
fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// One weight layer: `(out_dim, in_dim + 1)` matrix, bias in the last column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "WeightLayerRepr"))]
pub struct WeightLayer {
    shape: LayerShape,
    /// Row-major, `shape.rows() * shape.cols()` scalars.
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct WeightLayerRepr {
    shape: LayerShape,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<WeightLayerRepr> for WeightLayer {
    type Error = AdjnetError;

    fn try_from(repr: WeightLayerRepr) -> Result<Self, Self::Error> {
        Self::from_vec(repr.shape, repr.data)
    }
}

impl WeightLayer {
    /// Zero-initialized layer.
    pub fn zeros(shape: LayerShape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    /// Wraps a row-major buffer.
    pub fn from_vec(shape: LayerShape, data: Vec<f64>) -> AdjnetResult<Self> {
        if data.len() != shape.len() {
            return Err(AdjnetError::param_length(shape.len(), data.len()));
        }
        Ok(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> LayerShape {
        self.shape
    }

    /// Input neurons (bias column excluded).
    #[inline]
    pub fn in_dim(&self) -> usize {
        self.shape.in_dim()
    }

    /// Output neurons.
    #[inline]
    pub fn out_dim(&self) -> usize {
        self.shape.out_dim()
    }

    /// Row `o`: incoming weights of neuron `o` followed by its bias.
    #[inline]
    pub fn row(&self, o: usize) -> &[f64] {
        let start = o * self.shape.cols();
        &self.data[start..start + self.shape.cols()]
    }

    /// Incoming weights of neuron `o` without the bias.
    #[inline]
    pub fn weights_row(&self, o: usize) -> &[f64] {
        let start = o * self.shape.cols();
        &self.data[start..start + self.shape.cols() - 1]
    }

    /// Bias of neuron `o`.
    #[inline]
    pub fn bias(&self, o: usize) -> f64 {
        self.data[o * self.shape.cols() + self.shape.cols() - 1]
    }

    /// Weight from input `i` to neuron `o`.
    #[inline]
    pub fn weight(&self, o: usize, i: usize) -> f64 {
        debug_assert!(i < self.in_dim());
        self.data[o * self.shape.cols() + i]
    }

    /// Row-major data, bias columns included.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Ordered weight layers of one network, input side first.
///
/// Immutable once built. Every construction draws a fresh version token so
/// that forward caches can be matched against the weights that made them;
/// clones share the token because they share the values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "WeightLayersRepr"))]
pub struct WeightLayers {
    layers: Vec<WeightLayer>,
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    version: u64,
}

/// Deserialized layers are re-chained and get a fresh version token.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct WeightLayersRepr {
    layers: Vec<WeightLayer>,
}

#[cfg(feature = "serde")]
impl TryFrom<WeightLayersRepr> for WeightLayers {
    type Error = AdjnetError;

    fn try_from(repr: WeightLayersRepr) -> Result<Self, Self::Error> {
        Self::from_layers(repr.layers)
    }
}

impl WeightLayers {
    /// Assembles layers, checking that consecutive layers chain and that
    /// there is at least one hidden layer.
    pub fn from_layers(layers: Vec<WeightLayer>) -> AdjnetResult<Self> {
        let mut dims = Vec::with_capacity(layers.len() + 1);
        if let Some(first) = layers.first() {
            dims.push(first.in_dim());
        }
        for (i, layer) in layers.iter().enumerate() {
            if i > 0 && layer.in_dim() != layers[i - 1].out_dim() {
                return Err(AdjnetError::shape_mismatch(
                    &[layer.out_dim(), layers[i - 1].out_dim() + 1],
                    &[layer.out_dim(), layer.shape().cols()],
                ));
            }
            dims.push(layer.out_dim());
        }
        NetworkShape::from_dims(&dims)?;

        Ok(Self {
            layers,
            version: next_version(),
        })
    }

    /// Version token identifying these weight values.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of weight layers (`H + 1`).
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always `false`: a network has at least two weight layers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of hidden layers (`H`).
    #[inline]
    pub fn num_hidden(&self) -> usize {
        self.layers.len() - 1
    }

    /// Layer `i`, counted from the input side.
    #[inline]
    pub fn get(&self, i: usize) -> &WeightLayer {
        &self.layers[i]
    }

    /// All layers, input side first.
    #[inline]
    pub fn layers(&self) -> &[WeightLayer] {
        &self.layers
    }

    /// Output-side layer.
    #[inline]
    pub fn output_layer(&self) -> &WeightLayer {
        &self.layers[self.layers.len() - 1]
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output_layer().out_dim()
    }

    /// Neuron counts `[input, hidden..., output]`.
    pub fn dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.layers.len() + 1);
        dims.push(self.input_dim());
        dims.extend(self.layers.iter().map(WeightLayer::out_dim));
        dims
    }

    /// Total scalar count, biases included.
    pub fn param_count(&self) -> usize {
        self.layers.iter().map(|l| l.shape().len()).sum()
    }
}

/// Splits a flat parameter vector into weight layers.
///
/// # Errors
///
/// [`AdjnetError::ParamLength`] if `params.len() != shape.param_count()`.
/// The vector is never padded or truncated.
pub fn unpack(params: &[f64], shape: &NetworkShape) -> AdjnetResult<WeightLayers> {
    if params.len() != shape.param_count() {
        return Err(AdjnetError::param_length(shape.param_count(), params.len()));
    }

    let mut slots: Vec<Option<WeightLayer>> = vec![None; shape.num_weight_layers()];
    let mut offset = 0;
    for (i, layer_shape) in shape.layers().iter().enumerate().rev() {
        let len = layer_shape.len();
        let data = params[offset..offset + len].to_vec();
        slots[i] = Some(WeightLayer {
            shape: *layer_shape,
            data,
        });
        offset += len;
    }
    debug_assert_eq!(offset, params.len());

    let layers = slots.into_iter().flatten().collect();
    Ok(WeightLayers {
        layers,
        version: next_version(),
    })
}

/// Flattens weight layers into the parameter-vector order [`unpack`] reads.
pub fn pack(layers: &WeightLayers) -> Vec<f64> {
    let mut params = Vec::with_capacity(layers.param_count());
    for layer in layers.layers().iter().rev() {
        params.extend_from_slice(layer.as_slice());
    }
    params
}

/// Initial parameter vector: Xavier-uniform weights, zero biases.
///
/// Deterministic for `Some(seed)`; `None` draws from OS entropy.
pub fn init_params(shape: &NetworkShape, seed: Option<u64>) -> Vec<f64> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut layers = Vec::with_capacity(shape.num_weight_layers());
    for layer_shape in shape.layers() {
        let (in_dim, out_dim) = (layer_shape.in_dim(), layer_shape.out_dim());
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        let mut data = Vec::with_capacity(layer_shape.len());
        for _ in 0..out_dim {
            for _ in 0..in_dim {
                data.push(rng.gen_range(-limit..limit));
            }
            data.push(0.0);
        }
        layers.push(WeightLayer {
            shape: *layer_shape,
            data,
        });
    }

    let mut params = Vec::with_capacity(shape.param_count());
    for layer in layers.iter().rev() {
        params.extend_from_slice(&layer.data);
    }
    params
}
