//! # adjnet - Feed-Forward Networks with Adjoint Sensitivities
//!
//! Multilayer perceptrons over a single flat parameter vector, exact
//! input/output derivatives through an adjoint network, output-feedback
//! (recurrent) evaluation, and least-squares training.
//!
//! ## Architecture
//! - Packed parameters: output layer first, row-major, bias as last column
//! - Forward pass caches pre-activations for the adjoint pass
//! - Version-tagged weights so a stale cache is rejected, never silently used
//! - Sample-parallel batches via rayon above a configurable threshold
//! - Solver-agnostic training through the [`LeastSquaresSolver`] trait
//!
//! ## Usage
//! ```rust
//! use adjnet::{Matrix, Mlp, NetworkConfig, OutputMask, unit_probes};
//!
//! let config = NetworkConfig::builder()
//!     .input_dim(2)
//!     .hidden_dims(vec![5])
//!     .output_dim(1)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! let mlp = Mlp::random(config).unwrap();
//!
//! let inputs = Matrix::from_rows(&[[0.1, 0.2], [0.3, -0.4]]).unwrap();
//! let pass = mlp.forward(&inputs).unwrap();
//!
//! // ∂y/∂x₀ and ∂y/∂x₁ for every sample
//! let probes = unit_probes(2, &[0, 1]).unwrap();
//! let dy = mlp.adjoint(&pass.cache, &probes, &OutputMask::All).unwrap();
//! assert_eq!(dy.shape(), (2, 2));
//! ```

pub mod activation;
pub mod adjoint;
pub mod config;
pub mod error;
pub mod layer;
pub mod matrix;
pub mod network;
pub mod recurrent;
pub mod shape;
pub mod solver;
pub mod train;

// Re-exports
pub use activation::{sigmoid, Activation, ActivationFn};
pub use adjoint::{adjoint, combine_outputs, unit_probes, AdjointNetwork, OutputMask};
pub use config::{
    ConfigError, NetworkConfig, NetworkConfigBuilder, TrainConfig, DEFAULT_EPOCH_MAX,
    DEFAULT_MULTITHREADING_THRESHOLD, DEFAULT_RESNORM_TARGET,
};
pub use error::{AdjnetError, AdjnetResult};
pub use layer::{init_params, pack, unpack, WeightLayer, WeightLayers};
pub use matrix::Matrix;
pub use network::{forward, forward_parallel, ForwardPass, LayerCache, Mlp, Workspace};
pub use recurrent::{lagged_inputs, recur, recurrent_input_dim, LagBuffer, RecurrentOutput};
pub use shape::{LayerShape, NetworkShape};
pub use solver::{
    Bounds, ExitStatus, LeastSquaresSolver, LevenbergMarquardt, LmConfig, Objective, SolveInfo,
    SolveOptions, SolveReport,
};
pub use train::{
    fit_sensitivities, fit_static, train_recurrent, EpochRecord, EpochTrace, FitReport,
    RecurrentTrainReport, RecurrentTrainer, SensitivityObjective, StaticObjective, TrainState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
