//! Network and training configuration.
//!
//! [`NetworkConfig`] is the single immutable description of a model: neuron
//! counts, activation, threading threshold and initialization seed. It is
//! passed by reference into every evaluation and never mutated in place.
//! [`TrainConfig`] holds the stopping rules of the recurrent epoch loop.
//!
//! # Example
//!
//! ```rust
//! use adjnet::{Activation, NetworkConfig};
//!
//! let config = NetworkConfig::builder()
//!     .input_dim(2)
//!     .hidden_dims(vec![10, 10])
//!     .output_dim(1)
//!     .activation(Activation::Tanh)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.layer_dims(), vec![2, 10, 10, 1]);
//! assert_eq!(config.shape().unwrap().param_count(), 151);
//! ```

use crate::activation::Activation;
use crate::shape::NetworkShape;
use crate::solver::Bounds;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default batch size above which forward/adjoint evaluation is split
/// across rayon worker threads.
pub const DEFAULT_MULTITHREADING_THRESHOLD: usize = 256;

/// Default residual-norm target of the recurrent training loop.
pub const DEFAULT_RESNORM_TARGET: f64 = 1e-3;

/// Default epoch ceiling of the recurrent training loop.
pub const DEFAULT_EPOCH_MAX: usize = 1000;

/// MLP configuration.
///
/// The network has layers `input_dim → hidden_dims[0] → … → output_dim`;
/// at least one hidden layer is required.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkConfig {
    /// Input neurons.
    pub input_dim: usize,

    /// Hidden-layer neuron counts, input side first.
    pub hidden_dims: Vec<usize>,

    /// Output neurons.
    pub output_dim: usize,

    /// Activation applied in every hidden layer. The output layer is linear.
    pub activation: Activation,

    /// Batches with at least this many samples are evaluated in parallel.
    pub multithreading_threshold: usize,

    /// Optional seed for deterministic initialization (None => random).
    pub init_seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_dim: 2,
            hidden_dims: vec![10, 10],
            output_dim: 1,
            activation: Activation::Tanh,
            multithreading_threshold: DEFAULT_MULTITHREADING_THRESHOLD,
            init_seed: None,
        }
    }
}

impl NetworkConfig {
    /// Creates a configuration with default threading and random init.
    pub fn new(
        input_dim: usize,
        hidden_dims: Vec<usize>,
        output_dim: usize,
        activation: Activation,
    ) -> Self {
        Self {
            input_dim,
            hidden_dims,
            output_dim,
            activation,
            ..Default::default()
        }
    }

    /// Starts a [`NetworkConfigBuilder`].
    pub fn builder() -> NetworkConfigBuilder {
        NetworkConfigBuilder::default()
    }

    /// Returns all neuron counts: `[input, hidden..., output]`.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.hidden_dims.len() + 2);
        dims.push(self.input_dim);
        dims.extend_from_slice(&self.hidden_dims);
        dims.push(self.output_dim);
        dims
    }

    /// Number of hidden layers.
    #[inline]
    pub fn num_hidden(&self) -> usize {
        self.hidden_dims.len()
    }

    /// Computes the validated [`NetworkShape`].
    pub fn shape(&self) -> Result<NetworkShape, ConfigError> {
        NetworkShape::new(self.input_dim, &self.hidden_dims, self.output_dim)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a neuron count is zero or there is no
    /// hidden layer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shape().map(|_| ())
    }
}

/// Builder for [`NetworkConfig`].
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    /// Sets the input neuron count.
    pub fn input_dim(mut self, dim: usize) -> Self {
        self.config.input_dim = dim;
        self
    }

    /// Sets the hidden-layer neuron counts.
    pub fn hidden_dims(mut self, dims: Vec<usize>) -> Self {
        self.config.hidden_dims = dims;
        self
    }

    /// Sets the output neuron count.
    pub fn output_dim(mut self, dim: usize) -> Self {
        self.config.output_dim = dim;
        self
    }

    /// Sets the hidden-layer activation.
    pub fn activation(mut self, activation: Activation) -> Self {
        self.config.activation = activation;
        self
    }

    /// Sets the parallel-evaluation batch threshold.
    pub fn multithreading_threshold(mut self, threshold: usize) -> Self {
        self.config.multithreading_threshold = threshold;
        self
    }

    /// Sets the initialization seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.init_seed = Some(seed);
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Stopping rules and solver settings for the recurrent training loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainConfig {
    /// Training stops as `Converged` once the solver's resnorm is at or
    /// below this value.
    pub resnorm_target: f64,

    /// Maximum number of epochs before stopping as `MaxEpochsReached`.
    pub epoch_max: usize,

    /// Solver iterations allowed per epoch (1 = one-step-stale scheme).
    pub solver_iterations: usize,

    /// Optional box constraints forwarded to every solver call.
    pub bounds: Option<Bounds>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            resnorm_target: DEFAULT_RESNORM_TARGET,
            epoch_max: DEFAULT_EPOCH_MAX,
            solver_iterations: 1,
            bounds: None,
        }
    }
}

impl TrainConfig {
    /// Creates a configuration with the given target and ceiling.
    pub fn new(resnorm_target: f64, epoch_max: usize) -> Self {
        Self {
            resnorm_target,
            epoch_max,
            ..Default::default()
        }
    }

    /// Validates the configuration against a parameter count.
    pub fn validate(&self, num_params: usize) -> Result<(), ConfigError> {
        if !(self.resnorm_target.is_finite() && self.resnorm_target >= 0.0) {
            return Err(ConfigError::InvalidResnormTarget(self.resnorm_target));
        }
        if self.epoch_max == 0 {
            return Err(ConfigError::InvalidDimension("epoch_max must be > 0"));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::InvalidDimension("solver_iterations must be > 0"));
        }
        if let Some(bounds) = &self.bounds {
            bounds.validate(num_params)?;
        }
        Ok(())
    }
}

/// Errors returned by configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A scalar setting is out of range.
    #[error("Invalid dimension: {0}")]
    InvalidDimension(&'static str),

    /// A neuron count is zero.
    #[error("Neuron count must be >= 1 (layer {layer})")]
    ZeroNeurons {
        /// Index into `[input, hidden..., output]`.
        layer: usize,
    },

    /// The architecture has no hidden layer.
    #[error("At least one hidden layer is required")]
    NoHiddenLayers,

    /// Activation name not present in the registry.
    #[error("Unknown activation function: {0}")]
    UnknownActivation(String),

    /// Derivative probe width differs from the input width.
    #[error("Derivative probe length {got} does not match input width {expected}")]
    ProbeLength {
        /// Network input width.
        expected: usize,
        /// Probe width.
        got: usize,
    },

    /// Output selection mask has the wrong size.
    #[error("Output mask length {got} does not match {expected}")]
    MaskLength {
        /// Expected entries.
        expected: usize,
        /// Entries received.
        got: usize,
    },

    /// Bound vector length differs from the parameter count.
    #[error("Bounds length {got} does not match parameter count {expected}")]
    BoundsLength {
        /// Parameter count.
        expected: usize,
        /// Bound vector length.
        got: usize,
    },

    /// Lower bound exceeds upper bound.
    #[error("Lower bound exceeds upper bound at parameter {0}")]
    InvalidBounds(usize),

    /// Residual target is negative or not finite.
    #[error("Residual norm target must be finite and >= 0, got {0}")]
    InvalidResnormTarget(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layer_dims(), vec![2, 10, 10, 1]);
        assert_eq!(config.num_hidden(), 2);
    }

    #[test]
    fn test_builder_validates() {
        let err = NetworkConfig::builder()
            .input_dim(3)
            .hidden_dims(vec![])
            .output_dim(1)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NoHiddenLayers);

        let err = NetworkConfig::builder()
            .input_dim(3)
            .hidden_dims(vec![4, 0])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroNeurons { layer: 2 });
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = NetworkConfig::builder()
            .input_dim(4)
            .hidden_dims(vec![6])
            .output_dim(2)
            .activation(Activation::Sigmoid)
            .multithreading_threshold(8)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(config.layer_dims(), vec![4, 6, 2]);
        assert_eq!(config.activation, Activation::Sigmoid);
        assert_eq!(config.multithreading_threshold, 8);
        assert_eq!(config.init_seed, Some(7));
    }

    #[test]
    fn test_train_config_validation() {
        assert!(TrainConfig::default().validate(10).is_ok());
        assert!(TrainConfig::new(-1.0, 10).validate(10).is_err());
        assert!(TrainConfig::new(f64::NAN, 10).validate(10).is_err());
        assert!(TrainConfig::new(1e-3, 0).validate(10).is_err());

        let config = TrainConfig {
            bounds: Some(Bounds::new(Some(vec![-1.0; 3]), None)),
            ..Default::default()
        };
        assert_eq!(
            config.validate(4),
            Err(ConfigError::BoundsLength { expected: 4, got: 3 })
        );
    }
}
