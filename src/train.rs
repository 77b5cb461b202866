//! Fitting networks with a least-squares solver.
//!
//! Three entry points, all built on [`LeastSquaresSolver`]:
//!
//! - [`fit_static`]: plain regression, residual `forward(params) - targets`.
//! - [`fit_sensitivities`]: outputs and their input derivatives matched
//!   together, residual `[forward, adjoint] - targets`.
//! - [`RecurrentTrainer`] / [`train_recurrent`]: output-feedback models,
//!   trained one epoch at a time with lags taken from the previous epoch.
//!
//! # Recurrent Training
//!
//! ```text
//! Init ──step──▶ Stepping ──step──▶ … ──▶ Converged
//!                                    └──▶ MaxEpochsReached
//! ```
//!
//! Each epoch hands the solver the regressor `[lags, exogenous]` built from
//! the *previous* epoch's outputs, lets it run `solver_iterations`
//! iterations, then regenerates the lags with the fitted weights. Hitting
//! the epoch ceiling is a reported state, not an error.
//!
//! ```rust
//! use adjnet::{train_recurrent, LevenbergMarquardt, Matrix, NetworkConfig, TrainConfig};
//!
//! let exo: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
//! let target: Vec<f64> = exo.iter().map(|x| 0.3 * x).collect();
//!
//! let config = NetworkConfig::builder()
//!     .input_dim(2) // one lag + one exogenous input
//!     .hidden_dims(vec![3])
//!     .output_dim(1)
//!     .seed(5)
//!     .build()
//!     .unwrap();
//! let x0 = adjnet::init_params(&config.shape().unwrap(), config.init_seed);
//!
//! let report = train_recurrent(
//!     &config,
//!     &x0,
//!     1,
//!     &Matrix::column_vector(&exo),
//!     &Matrix::column_vector(&target),
//!     &LevenbergMarquardt::default(),
//!     &TrainConfig::new(1e-3, 50),
//! )
//! .unwrap();
//! assert!(report.state.is_terminal());
//! assert_eq!(report.trace.len(), report.epochs());
//! ```

use crate::adjoint::OutputMask;
use crate::config::{NetworkConfig, TrainConfig};
use crate::error::{AdjnetError, AdjnetResult};
use crate::layer::{pack, WeightLayers};
use crate::matrix::Matrix;
use crate::network::Mlp;
use crate::recurrent::{lagged_inputs, recur, RecurrentOutput};
use crate::solver::{Bounds, ExitStatus, LeastSquaresSolver, Objective, SolveOptions, SolveReport};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// OBJECTIVES
// =============================================================================

fn check_inputs(config: &NetworkConfig, inputs: &Matrix) -> AdjnetResult<()> {
    if inputs.cols() != config.input_dim {
        return Err(AdjnetError::shape_mismatch(
            &[inputs.rows(), config.input_dim],
            &[inputs.rows(), inputs.cols()],
        ));
    }
    Ok(())
}

fn check_targets(targets: &Matrix, rows: usize, cols: usize) -> AdjnetResult<()> {
    if targets.shape() != (rows, cols) {
        return Err(AdjnetError::shape_mismatch(
            &[rows, cols],
            &[targets.rows(), targets.cols()],
        ));
    }
    Ok(())
}

#[inline]
fn write_residuals(predicted: &Matrix, targets: &Matrix, out: &mut [f64]) {
    for ((o, p), t) in out.iter_mut().zip(predicted.as_slice()).zip(targets.as_slice()) {
        *o = p - t;
    }
}

/// Residual `forward(unpack(params)) - targets`, row-major.
#[derive(Debug, Clone)]
pub struct StaticObjective<'a> {
    config: NetworkConfig,
    num_params: usize,
    inputs: &'a Matrix,
    targets: &'a Matrix,
}

impl<'a> StaticObjective<'a> {
    /// # Errors
    ///
    /// Invalid `config`, or `inputs`/`targets` not matching its widths.
    pub fn new(
        config: &NetworkConfig,
        inputs: &'a Matrix,
        targets: &'a Matrix,
    ) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        check_inputs(config, inputs)?;
        check_targets(targets, inputs.rows(), config.output_dim)?;
        Ok(Self {
            config: config.clone(),
            num_params: shape.param_count(),
            inputs,
            targets,
        })
    }
}

impl Objective for StaticObjective<'_> {
    fn num_params(&self) -> usize {
        self.num_params
    }

    fn num_residuals(&self) -> usize {
        self.targets.rows() * self.targets.cols()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) -> AdjnetResult<()> {
        let mlp = Mlp::new(self.config.clone(), params)?;
        let predicted = mlp.predict(self.inputs)?;
        write_residuals(&predicted, self.targets, out);
        Ok(())
    }
}

/// Residual `[forward, adjoint(probes, mask)] - targets`, row-major.
///
/// Targets are `(samples, output_dim * (1 + num_probes))`: outputs first,
/// then one block of `output_dim` derivative columns per probe. Masked-out
/// derivative columns are zero in the prediction, so the matching target
/// columns should be zero too.
#[derive(Debug, Clone)]
pub struct SensitivityObjective<'a> {
    config: NetworkConfig,
    num_params: usize,
    inputs: &'a Matrix,
    probes: &'a Matrix,
    mask: &'a OutputMask,
    targets: &'a Matrix,
}

impl<'a> SensitivityObjective<'a> {
    /// # Errors
    ///
    /// Invalid `config`, probe width or mask size, or shape mismatches in
    /// `inputs`/`targets`.
    pub fn new(
        config: &NetworkConfig,
        inputs: &'a Matrix,
        probes: &'a Matrix,
        mask: &'a OutputMask,
        targets: &'a Matrix,
    ) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        check_inputs(config, inputs)?;
        if probes.cols() != config.input_dim {
            return Err(crate::config::ConfigError::ProbeLength {
                expected: config.input_dim,
                got: probes.cols(),
            }
            .into());
        }
        mask.validate(probes.rows(), config.output_dim)?;
        check_targets(
            targets,
            inputs.rows(),
            config.output_dim * (1 + probes.rows()),
        )?;
        Ok(Self {
            config: config.clone(),
            num_params: shape.param_count(),
            inputs,
            probes,
            mask,
            targets,
        })
    }
}

impl Objective for SensitivityObjective<'_> {
    fn num_params(&self) -> usize {
        self.num_params
    }

    fn num_residuals(&self) -> usize {
        self.targets.rows() * self.targets.cols()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) -> AdjnetResult<()> {
        let mlp = Mlp::new(self.config.clone(), params)?;
        let predicted = mlp.evaluate_with_sensitivities(self.inputs, self.probes, self.mask)?;
        write_residuals(&predicted, self.targets, out);
        Ok(())
    }
}

// =============================================================================
// ONE-SHOT FITTING
// =============================================================================

/// Fitted network plus the raw solver report.
#[derive(Debug, Clone)]
pub struct FitReport {
    pub mlp: Mlp,
    pub solve: SolveReport,
}

impl FitReport {
    #[inline]
    pub fn resnorm(&self) -> f64 {
        self.solve.resnorm
    }
}

fn finish_fit<S: LeastSquaresSolver + ?Sized>(
    config: &NetworkConfig,
    objective: &dyn Objective,
    x0: &[f64],
    solver: &S,
    bounds: Option<&Bounds>,
    options: &SolveOptions,
) -> AdjnetResult<FitReport> {
    let solve = solver.solve(objective, x0, bounds, options)?;
    log::debug!(
        "fit finished: resnorm {:.6e} after {} iterations ({:?})",
        solve.resnorm,
        solve.info.iterations,
        solve.exit
    );
    let mlp = Mlp::new(config.clone(), &solve.params)?;
    Ok(FitReport { mlp, solve })
}

/// Fits a feed-forward network to `targets`.
///
/// # Errors
///
/// Configuration or shape errors, `x0` of the wrong length, or any error
/// raised by the solver.
pub fn fit_static<S: LeastSquaresSolver + ?Sized>(
    config: &NetworkConfig,
    x0: &[f64],
    inputs: &Matrix,
    targets: &Matrix,
    solver: &S,
    bounds: Option<&Bounds>,
    options: &SolveOptions,
) -> AdjnetResult<FitReport> {
    let objective = StaticObjective::new(config, inputs, targets)?;
    finish_fit(config, &objective, x0, solver, bounds, options)
}

/// Fits outputs and input sensitivities at once.
///
/// See [`SensitivityObjective`] for the target layout.
#[allow(clippy::too_many_arguments)]
pub fn fit_sensitivities<S: LeastSquaresSolver + ?Sized>(
    config: &NetworkConfig,
    x0: &[f64],
    inputs: &Matrix,
    probes: &Matrix,
    mask: &OutputMask,
    targets: &Matrix,
    solver: &S,
    bounds: Option<&Bounds>,
    options: &SolveOptions,
) -> AdjnetResult<FitReport> {
    let objective = SensitivityObjective::new(config, inputs, probes, mask, targets)?;
    finish_fit(config, &objective, x0, solver, bounds, options)
}

// =============================================================================
// RECURRENT TRAINING
// =============================================================================

/// Upper bound on the epoch records reserved up front.
const TRACE_PREALLOC_LIMIT: usize = 4096;

/// Lifecycle of a [`RecurrentTrainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrainState {
    /// Weights and lags initialized, no epoch run yet.
    Init,
    /// At least one epoch run, not finished.
    Stepping,
    /// Residual norm reached the target.
    Converged,
    /// Epoch ceiling reached without convergence.
    MaxEpochsReached,
}

impl TrainState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainState::Converged | TrainState::MaxEpochsReached)
    }
}

/// What one epoch produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EpochRecord {
    /// 1-based epoch index.
    pub epoch: usize,
    /// Weights after the epoch's solver call.
    pub weights: WeightLayers,
    /// Solver resnorm (against the previous epoch's lags).
    pub resnorm: f64,
    pub exit: ExitStatus,
}

impl EpochRecord {
    /// Weights as a packed parameter vector.
    pub fn params(&self) -> Vec<f64> {
        pack(&self.weights)
    }
}

/// Append-only history of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EpochTrace {
    records: Vec<EpochRecord>,
}

impl EpochTrace {
    pub fn with_capacity(epochs: usize) -> Self {
        Self {
            records: Vec::with_capacity(epochs),
        }
    }

    pub(crate) fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpochRecord> + '_ {
        self.records.iter()
    }

    pub fn get(&self, i: usize) -> Option<&EpochRecord> {
        self.records.get(i)
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Lowest-resnorm epoch; the earliest one on ties.
    pub fn best(&self) -> Option<&EpochRecord> {
        self.records.iter().fold(None, |best: Option<&EpochRecord>, r| match best {
            Some(b) if b.resnorm <= r.resnorm => Some(b),
            _ => Some(r),
        })
    }

    pub fn resnorms(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.resnorm).collect()
    }
}

/// Result of a recurrent training run.
#[derive(Debug, Clone)]
pub struct RecurrentTrainReport {
    /// Terminal state (or the current one for an unfinished trainer).
    pub state: TrainState,
    /// Network after the last epoch.
    pub mlp: Mlp,
    /// Outputs and lags regenerated with the final weights.
    pub run: RecurrentOutput,
    pub trace: EpochTrace,
}

impl RecurrentTrainReport {
    #[inline]
    pub fn epochs(&self) -> usize {
        self.trace.len()
    }

    #[inline]
    pub fn converged(&self) -> bool {
        self.state == TrainState::Converged
    }

    pub fn final_resnorm(&self) -> Option<f64> {
        self.trace.last().map(|r| r.resnorm)
    }

    /// Network from the lowest-resnorm epoch.
    pub fn best_mlp(&self) -> AdjnetResult<Option<Mlp>> {
        self.trace
            .best()
            .map(|r| Mlp::from_weights(self.mlp.config().clone(), r.weights.clone()))
            .transpose()
    }
}

/// Epoch-by-epoch trainer for output-feedback models.
///
/// The network's input layout is `[lag row, exogenous row]` as produced by
/// [`recur`].
#[derive(Debug, Clone)]
pub struct RecurrentTrainer<'a> {
    train: TrainConfig,
    ny: usize,
    exogenous: &'a Matrix,
    targets: &'a Matrix,
    mlp: Mlp,
    run: RecurrentOutput,
    state: TrainState,
    trace: EpochTrace,
}

impl<'a> RecurrentTrainer<'a> {
    /// Builds the initial weights from `x0` and runs the first recurrent
    /// pass to seed the lag matrix.
    ///
    /// # Errors
    ///
    /// Invalid configurations, `x0` of the wrong length, or `exogenous` /
    /// `targets` not matching the network widths.
    pub fn new(
        network: &NetworkConfig,
        train: &TrainConfig,
        x0: &[f64],
        ny: usize,
        exogenous: &'a Matrix,
        targets: &'a Matrix,
    ) -> AdjnetResult<Self> {
        let shape = network.shape()?;
        train.validate(shape.param_count())?;
        check_targets(targets, exogenous.rows(), network.output_dim)?;

        let mlp = Mlp::new(network.clone(), x0)?;
        let run = recur(&mlp, ny, exogenous, network.output_dim)?;

        Ok(Self {
            train: train.clone(),
            ny,
            exogenous,
            targets,
            mlp,
            run,
            state: TrainState::Init,
            trace: EpochTrace::with_capacity(train.epoch_max.min(TRACE_PREALLOC_LIMIT)),
        })
    }

    #[inline]
    pub fn state(&self) -> TrainState {
        self.state
    }

    /// Epochs run so far.
    #[inline]
    pub fn epoch(&self) -> usize {
        self.trace.len()
    }

    #[inline]
    pub fn mlp(&self) -> &Mlp {
        &self.mlp
    }

    /// Current outputs and lag matrix.
    #[inline]
    pub fn run_output(&self) -> &RecurrentOutput {
        &self.run
    }

    #[inline]
    pub fn trace(&self) -> &EpochTrace {
        &self.trace
    }

    /// Runs one epoch. A no-op once the state is terminal.
    pub fn step<S: LeastSquaresSolver + ?Sized>(&mut self, solver: &S) -> AdjnetResult<TrainState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.state = TrainState::Stepping;
        let epoch = self.trace.len() + 1;

        let inputs = lagged_inputs(&self.run.lags, self.exogenous)?;
        let objective = StaticObjective::new(self.mlp.config(), &inputs, self.targets)?;
        let options = SolveOptions::with_max_iterations(self.train.solver_iterations);
        let report = solver.solve(
            &objective,
            &self.mlp.params(),
            self.train.bounds.as_ref(),
            &options,
        )?;

        let config = self.mlp.config().clone();
        let output_dim = config.output_dim;
        self.mlp = Mlp::new(config, &report.params)?;
        self.run = recur(&self.mlp, self.ny, self.exogenous, output_dim)?;
        self.trace.push(EpochRecord {
            epoch,
            weights: self.mlp.weights().clone(),
            resnorm: report.resnorm,
            exit: report.exit,
        });

        log::debug!("epoch {epoch}: resnorm {:.6e} ({:?})", report.resnorm, report.exit);

        if report.resnorm <= self.train.resnorm_target {
            self.state = TrainState::Converged;
            log::info!(
                "recurrent training converged after {epoch} epochs (resnorm {:.6e})",
                report.resnorm
            );
        } else if epoch >= self.train.epoch_max {
            self.state = TrainState::MaxEpochsReached;
            log::warn!(
                "recurrent training stopped at epoch ceiling {} (resnorm {:.6e}, target {:.6e})",
                self.train.epoch_max,
                report.resnorm,
                self.train.resnorm_target
            );
        }
        Ok(self.state)
    }

    /// Steps until a terminal state, then returns the report.
    pub fn run<S: LeastSquaresSolver + ?Sized>(
        mut self,
        solver: &S,
    ) -> AdjnetResult<RecurrentTrainReport> {
        while !self.state.is_terminal() {
            self.step(solver)?;
        }
        Ok(self.into_report())
    }

    pub fn into_report(self) -> RecurrentTrainReport {
        RecurrentTrainReport {
            state: self.state,
            mlp: self.mlp,
            run: self.run,
            trace: self.trace,
        }
    }
}

/// Trains a recurrent model to completion.
///
/// `exogenous` is `(samples, exo_dim)`, `targets` is
/// `(samples, network.output_dim)`, and `network.input_dim` must be
/// `ny * output_dim + exo_dim`.
pub fn train_recurrent<S: LeastSquaresSolver + ?Sized>(
    network: &NetworkConfig,
    x0: &[f64],
    ny: usize,
    exogenous: &Matrix,
    targets: &Matrix,
    solver: &S,
    train: &TrainConfig,
) -> AdjnetResult<RecurrentTrainReport> {
    RecurrentTrainer::new(network, train, x0, ny, exogenous, targets)?.run(solver)
}
