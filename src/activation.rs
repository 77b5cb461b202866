//! Pointwise activation functions.
//!
//! Hidden layers compute a pre-activation `gamma = [x, 1] · Wᵀ` and apply an
//! activation element-wise: `z = f(gamma)`. The adjoint pass needs the
//! analytic derivative `f'(gamma)`, evaluated at the cached *pre-activation*.
//!
//! [`ActivationFn`] is the capability the engine depends on; [`Activation`]
//! is the built-in registry of concrete functions, selectable by name:
//!
//! ```rust
//! use adjnet::{Activation, ActivationFn};
//!
//! let act: Activation = "tanh".parse().unwrap();
//! assert_eq!(act, Activation::Tanh);
//! assert_eq!(act.eval(0.0), 0.0);
//! assert_eq!(act.derivative(0.0), 1.0);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A pointwise nonlinearity paired with its analytic derivative.
///
/// Implementors must be pure: identical inputs give bit-identical outputs.
pub trait ActivationFn: Send + Sync {
    /// Evaluates `f(x)`.
    fn eval(&self, x: f64) -> f64;

    /// Evaluates `f'(x)` at the pre-activation `x`.
    fn derivative(&self, x: f64) -> f64;
}

/// Built-in activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Activation {
    /// Hyperbolic tangent, derivative `1 - tanh²`.
    #[default]
    Tanh,
    /// Logistic sigmoid, derivative `s·(1 - s)`.
    Sigmoid,
}

impl Activation {
    /// All registered activations.
    pub const ALL: [Activation; 2] = [Activation::Tanh, Activation::Sigmoid];

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
        }
    }
}

impl ActivationFn for Activation {
    #[inline]
    fn eval(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    #[inline]
    fn derivative(&self, x: f64) -> f64 {
        match self {
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanh" | "tansig" => Ok(Activation::Tanh),
            "sigmoid" | "logsig" | "logistic" => Ok(Activation::Sigmoid),
            other => Err(ConfigError::UnknownActivation(other.to_string())),
        }
    }
}

/// Numerically stable logistic sigmoid.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
