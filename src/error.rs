//! Unified error types for adjnet.
//!
//! [`AdjnetError`] covers every structural failure the engine can detect:
//! parameter vectors of the wrong length, input or target matrices that do
//! not match the declared architecture, and adjoint calls made against a
//! stale forward cache. It uses the `thiserror` crate for ergonomic error
//! handling.
//!
//! Numerical trouble (saturated activations) and failure to reach a residual
//! target are *not* errors; they surface as data in the training report.
//!
//! # Example
//!
//! ```rust
//! use adjnet::{unpack, AdjnetError, NetworkShape};
//!
//! let shape = NetworkShape::new(2, &[10, 10], 1).unwrap();
//! assert_eq!(shape.param_count(), 151);
//!
//! match unpack(&vec![0.0; 150], &shape) {
//!     Err(AdjnetError::ParamLength { expected, got }) => {
//!         assert_eq!((expected, got), (151, 150));
//!     }
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for adjnet operations.
#[derive(Error, Debug)]
pub enum AdjnetError {
    /// Matrix shape does not match what the architecture requires.
    ///
    /// Raised for input batches, training targets and exogenous sequences
    /// whose `[rows, cols]` disagree with the network.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected `[rows, cols]`.
        expected: Vec<usize>,
        /// Actual `[rows, cols]` received.
        got: Vec<usize>,
    },

    /// Flat parameter vector has the wrong length for the architecture.
    #[error("Parameter vector length mismatch: architecture needs {expected}, got {got}")]
    ParamLength {
        /// Length implied by the network shape.
        expected: usize,
        /// Length of the vector passed in.
        got: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Layer cache was produced by different weights than the ones used
    /// for the adjoint evaluation.
    #[error(
        "Stale layer cache: built from weights version {cache_version}, \
         adjoint called with weights version {weights_version}"
    )]
    StaleCache {
        /// Version token stored in the cache.
        cache_version: u64,
        /// Version token of the weights passed to the adjoint.
        weights_version: u64,
    },

    /// Objective evaluation failed inside the solver.
    #[error("Solver error: {0}")]
    Solver(String),
}

/// Result type alias for adjnet operations.
pub type AdjnetResult<T> = Result<T, AdjnetError>;

impl AdjnetError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        AdjnetError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates a parameter length error.
    pub fn param_length(expected: usize, got: usize) -> Self {
        AdjnetError::ParamLength { expected, got }
    }

    /// Creates a stale cache error.
    pub fn stale_cache(cache_version: u64, weights_version: u64) -> Self {
        AdjnetError::StaleCache {
            cache_version,
            weights_version,
        }
    }

    /// Creates a solver error.
    pub fn solver<S: Into<String>>(msg: S) -> Self {
        AdjnetError::Solver(msg.into())
    }

    /// Returns `true` for the shape family of errors (matrix and parameter
    /// length mismatches).
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            AdjnetError::ShapeMismatch { .. } | AdjnetError::ParamLength { .. }
        )
    }
}
