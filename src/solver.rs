//! Nonlinear least-squares solving.
//!
//! The training code only talks to [`LeastSquaresSolver`]: hand it an
//! [`Objective`] (parameters → residual vector) and a starting point, get
//! back fitted parameters, the residual norm and an exit status. Any solver
//! can be plugged in; [`LevenbergMarquardt`] is the built-in one.
//!
//! `resnorm` is always the *sum of squared residuals*.
//!
//! ```rust
//! use adjnet::{AdjnetResult, LeastSquaresSolver, LevenbergMarquardt, Objective, SolveOptions};
//!
//! /// Fit y = a·x + b through three points.
//! struct Line;
//!
//! impl Objective for Line {
//!     fn num_params(&self) -> usize { 2 }
//!     fn num_residuals(&self) -> usize { 3 }
//!     fn residuals(&self, p: &[f64], out: &mut [f64]) -> AdjnetResult<()> {
//!         for (i, (x, y)) in [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)].iter().enumerate() {
//!             out[i] = p[0] * x + p[1] - y;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let report = LevenbergMarquardt::default()
//!     .solve(&Line, &[0.0, 0.0], None, &SolveOptions::default())
//!     .unwrap();
//! assert!((report.params[0] - 2.0).abs() < 1e-6);
//! assert!((report.params[1] - 1.0).abs() < 1e-6);
//! assert!(report.resnorm < 1e-10);
//! ```

use crate::config::ConfigError;
use crate::error::{AdjnetError, AdjnetResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A residual function `params → r(params)` to be driven towards zero.
pub trait Objective {
    /// Length of the parameter vector.
    fn num_params(&self) -> usize;

    /// Length of the residual vector.
    fn num_residuals(&self) -> usize;

    /// Writes `r(params)` into `out` (`out.len() == num_residuals()`).
    fn residuals(&self, params: &[f64], out: &mut [f64]) -> AdjnetResult<()>;
}

/// Optional per-parameter box constraints.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Lower bound per parameter.
    pub lower: Option<Vec<f64>>,
    /// Upper bound per parameter.
    pub upper: Option<Vec<f64>>,
}

impl Bounds {
    pub fn new(lower: Option<Vec<f64>>, upper: Option<Vec<f64>>) -> Self {
        Self { lower, upper }
    }

    /// Same symmetric box `[-limit, limit]` for every parameter.
    pub fn symmetric(limit: f64, num_params: usize) -> Self {
        Self {
            lower: Some(vec![-limit; num_params]),
            upper: Some(vec![limit; num_params]),
        }
    }

    /// Checks lengths and ordering against `num_params`.
    pub fn validate(&self, num_params: usize) -> Result<(), ConfigError> {
        for bound in [&self.lower, &self.upper].into_iter().flatten() {
            if bound.len() != num_params {
                return Err(ConfigError::BoundsLength {
                    expected: num_params,
                    got: bound.len(),
                });
            }
        }
        if let (Some(lo), Some(hi)) = (&self.lower, &self.upper) {
            if let Some(i) = lo.iter().zip(hi).position(|(l, h)| l > h) {
                return Err(ConfigError::InvalidBounds(i));
            }
        }
        Ok(())
    }

    /// Clamps `x` into the box.
    pub fn project(&self, x: &mut [f64]) {
        if let Some(lo) = &self.lower {
            x.iter_mut().zip(lo).for_each(|(v, l)| *v = v.max(*l));
        }
        if let Some(hi) = &self.upper {
            x.iter_mut().zip(hi).for_each(|(v, h)| *v = v.min(*h));
        }
    }

    #[inline]
    fn upper(&self, i: usize) -> f64 {
        self.upper.as_ref().map_or(f64::INFINITY, |u| u[i])
    }
}

/// Per-call solver limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveOptions {
    /// Maximum outer iterations (Jacobian evaluations).
    pub max_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 400,
        }
    }
}

impl SolveOptions {
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExitStatus {
    /// Gradient `Jᵀr` fell below tolerance.
    GradientTolerance,
    /// Step length fell below tolerance.
    StepTolerance,
    /// Relative decrease of the resnorm fell below tolerance.
    FunctionTolerance,
    /// Iteration budget exhausted.
    IterationLimit,
    /// No damping level produced a decrease.
    NoProgress,
}

impl ExitStatus {
    /// Stopped at a (local) solution rather than on a budget or stall.
    pub fn converged(self) -> bool {
        matches!(
            self,
            ExitStatus::GradientTolerance
                | ExitStatus::StepTolerance
                | ExitStatus::FunctionTolerance
        )
    }
}

/// Counters from one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveInfo {
    pub iterations: usize,
    pub function_evaluations: usize,
    /// Damping factor when the solver stopped.
    pub damping: f64,
}

/// Outcome of one solve.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveReport {
    /// Fitted parameters.
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub resnorm: f64,
    /// Residual vector at `params`.
    pub residual: Vec<f64>,
    pub exit: ExitStatus,
    pub info: SolveInfo,
}

/// A nonlinear least-squares solver.
pub trait LeastSquaresSolver {
    /// Minimizes `Σ r_i(x)²` starting from `x0`, within `bounds` if given.
    fn solve(
        &self,
        objective: &dyn Objective,
        x0: &[f64],
        bounds: Option<&Bounds>,
        options: &SolveOptions,
    ) -> AdjnetResult<SolveReport>;
}

/// Levenberg–Marquardt configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LmConfig {
    /// Initial damping factor.
    pub damping_init: f64,
    /// Damping multiplier after a rejected step.
    pub damping_up: f64,
    /// Damping multiplier after an accepted step.
    pub damping_down: f64,
    /// Damping above which the solver gives up on the iteration.
    pub damping_max: f64,
    /// Relative forward-difference step for the Jacobian.
    pub fd_step: f64,
    /// Stop when `max |Jᵀr| <= gradient_tol`.
    pub gradient_tol: f64,
    /// Stop when `|Δx| <= step_tol · (step_tol + |x|)`.
    pub step_tol: f64,
    /// Stop when the resnorm decrease is `<= function_tol · resnorm`.
    pub function_tol: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            damping_init: 1e-2,
            damping_up: 10.0,
            damping_down: 0.1,
            damping_max: 1e12,
            fd_step: f64::EPSILON.sqrt(),
            gradient_tol: 1e-12,
            step_tol: 1e-12,
            function_tol: 1e-14,
        }
    }
}

/// Floor for the Marquardt diagonal scaling.
const MIN_DIAG: f64 = 1e-12;

/// Floor for the damping factor after repeated accepted steps.
const MIN_DAMPING: f64 = 1e-15;

/// Levenberg–Marquardt with a forward-difference Jacobian.
///
/// Each iteration solves `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` by Cholesky and
/// raises `λ` until the step decreases the resnorm. Bounds are enforced by
/// projecting every trial point.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt {
    pub config: LmConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    /// Forward-difference Jacobian, column-major (`jac[j * m + i] = ∂r_i/∂x_j`).
    fn jacobian(
        &self,
        objective: &dyn Objective,
        x: &mut [f64],
        r: &[f64],
        bounds: Option<&Bounds>,
        jac: &mut [f64],
        scratch: &mut [f64],
    ) -> AdjnetResult<()> {
        let m = r.len();
        for j in 0..x.len() {
            let orig = x[j];
            let mut h = self.config.fd_step * orig.abs().max(1.0);
            if bounds.is_some_and(|b| orig + h > b.upper(j)) {
                h = -h;
            }
            x[j] = orig + h;
            let result = objective.residuals(x, scratch);
            x[j] = orig;
            result?;

            let col = &mut jac[j * m..(j + 1) * m];
            for ((c, rp), r0) in col.iter_mut().zip(scratch.iter()).zip(r) {
                *c = (rp - r0) / h;
            }
        }
        Ok(())
    }
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn solve(
        &self,
        objective: &dyn Objective,
        x0: &[f64],
        bounds: Option<&Bounds>,
        options: &SolveOptions,
    ) -> AdjnetResult<SolveReport> {
        let n = objective.num_params();
        let m = objective.num_residuals();
        if x0.len() != n {
            return Err(AdjnetError::param_length(n, x0.len()));
        }
        if let Some(b) = bounds {
            b.validate(n)?;
        }

        let mut x = x0.to_vec();
        if let Some(b) = bounds {
            b.project(&mut x);
        }

        let mut r = vec![0.0; m];
        objective.residuals(&x, &mut r)?;
        let mut cost = sum_squares(&r);
        let mut evals = 1;

        let mut jac = vec![0.0; m * n];
        let mut scratch = vec![0.0; m];
        let mut grad = vec![0.0; n];
        let mut normal = vec![0.0; n * n];
        let mut system = vec![0.0; n * n];
        let mut step = vec![0.0; n];
        let mut x_trial = vec![0.0; n];
        let mut r_trial = vec![0.0; m];

        let mut damping = self.config.damping_init;
        let mut exit = ExitStatus::IterationLimit;
        let mut iterations = 0;

        while iterations < options.max_iterations {
            iterations += 1;

            self.jacobian(objective, &mut x, &r, bounds, &mut jac, &mut scratch)?;
            evals += n;

            for j in 0..n {
                let cj = &jac[j * m..(j + 1) * m];
                grad[j] = dot(cj, &r);
                for k in 0..=j {
                    let v = dot(cj, &jac[k * m..(k + 1) * m]);
                    normal[j * n + k] = v;
                    normal[k * n + j] = v;
                }
            }

            let grad_inf = grad.iter().fold(0.0f64, |a, g| a.max(g.abs()));
            if grad_inf <= self.config.gradient_tol {
                exit = ExitStatus::GradientTolerance;
                break;
            }

            let mut accepted = None;
            while damping <= self.config.damping_max {
                system.copy_from_slice(&normal);
                for j in 0..n {
                    let d = normal[j * n + j];
                    system[j * n + j] = d + damping * d.max(MIN_DIAG);
                }
                step.iter_mut().zip(&grad).for_each(|(s, g)| *s = -g);

                if !cholesky_solve(&mut system, n, &mut step) {
                    damping *= self.config.damping_up;
                    continue;
                }

                x_trial.iter_mut().zip(x.iter().zip(&step)).for_each(|(t, (xi, si))| *t = xi + si);
                if let Some(b) = bounds {
                    b.project(&mut x_trial);
                }
                objective.residuals(&x_trial, &mut r_trial)?;
                evals += 1;

                let trial_cost = sum_squares(&r_trial);
                if trial_cost.is_finite() && trial_cost < cost {
                    let step_norm = x_trial
                        .iter()
                        .zip(&x)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f64>()
                        .sqrt();
                    accepted = Some((step_norm, cost - trial_cost));
                    std::mem::swap(&mut x, &mut x_trial);
                    std::mem::swap(&mut r, &mut r_trial);
                    cost = trial_cost;
                    damping = (damping * self.config.damping_down).max(MIN_DAMPING);
                    break;
                }
                damping *= self.config.damping_up;
            }

            let Some((step_norm, decrease)) = accepted else {
                log::debug!("LM: no acceptable step at iteration {iterations}, resnorm {cost:.6e}");
                exit = ExitStatus::NoProgress;
                damping = damping.min(self.config.damping_max);
                break;
            };

            log::trace!(
                "LM iteration {iterations}: resnorm {cost:.6e}, step {step_norm:.3e}, \
                 damping {damping:.1e}"
            );

            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step_norm <= self.config.step_tol * (self.config.step_tol + x_norm) {
                exit = ExitStatus::StepTolerance;
                break;
            }
            if cost == 0.0 || decrease <= self.config.function_tol * (cost + decrease) {
                exit = ExitStatus::FunctionTolerance;
                break;
            }
        }

        Ok(SolveReport {
            params: x,
            resnorm: cost,
            residual: r,
            exit,
            info: SolveInfo {
                iterations,
                function_evaluations: evals,
                damping,
            },
        })
    }
}

#[inline]
fn sum_squares(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solves `A x = b` in place for symmetric positive definite `A` (row-major,
/// `n × n`). `A` is overwritten by its Cholesky factor, `b` by `x`.
///
/// Returns `false` if `A` is not numerically positive definite.
fn cholesky_solve(a: &mut [f64], n: usize, b: &mut [f64]) -> bool {
    for j in 0..n {
        let mut d = a[j * n + j];
        for k in 0..j {
            d -= a[j * n + k] * a[j * n + k];
        }
        if !(d > 0.0 && d.is_finite()) {
            return false;
        }
        let d = d.sqrt();
        a[j * n + j] = d;
        for i in j + 1..n {
            let mut s = a[i * n + j];
            for k in 0..j {
                s -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = s / d;
        }
    }

    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= a[i * n + k] * b[k];
        }
        b[i] = s / a[i * n + i];
    }
    for i in (0..n).rev() {
        let mut s = b[i];
        for k in i + 1..n {
            s -= a[k * n + i] * b[k];
        }
        b[i] = s / a[i * n + i];
    }
    true
}
