//! Autoregressive evaluation with output feedback.
//!
//! A recurrent model is a plain [`Mlp`] whose inputs are
//! `[lag row, exogenous row]`. The lag row holds each output channel's own
//! previous `ny` values, zero before time 0. Evaluation is a strict
//! sequential scan: step `n` needs the output of step `n - 1`.
//!
//! # Lag Layout
//!
//! Channel-major, most recent first: column `c * ny + d` of lag row `n`
//! holds `output_c[n - 1 - d]`.
//!
//! ```rust
//! use adjnet::{recur, Matrix, Mlp, NetworkConfig};
//!
//! // 2 lags of 1 output + 1 exogenous input
//! let config = NetworkConfig::builder()
//!     .input_dim(3)
//!     .hidden_dims(vec![4])
//!     .output_dim(1)
//!     .seed(1)
//!     .build()
//!     .unwrap();
//! let mlp = Mlp::random(config).unwrap();
//! let exo = Matrix::column_vector(&[0.0, 0.5, 1.0, 0.5]);
//!
//! let run = recur(&mlp, 2, &exo, 1).unwrap();
//! assert_eq!(run.outputs.shape(), (4, 1));
//! assert_eq!(run.lags.row(0), &[0.0, 0.0]);
//! assert_eq!(run.lags[(2, 0)], run.outputs[(1, 0)]);
//! assert_eq!(run.lags[(2, 1)], run.outputs[(0, 0)]);
//! ```

use crate::error::{AdjnetError, AdjnetResult};
use crate::matrix::Matrix;
use crate::network::Mlp;

/// Rolling window of the last `ny` values of each output channel.
#[derive(Debug, Clone)]
pub struct LagBuffer {
    ny: usize,
    channels: usize,
    row: Vec<f64>,
}

impl LagBuffer {
    /// Zero-filled buffer (the state before time 0).
    pub fn new(ny: usize, channels: usize) -> Self {
        Self {
            ny,
            channels,
            row: vec![0.0; ny * channels],
        }
    }

    /// Current lag row, `ny * channels` wide.
    #[inline]
    pub fn row(&self) -> &[f64] {
        &self.row
    }

    /// Shifts one step of outputs in, dropping the oldest value per channel.
    pub fn push(&mut self, outputs: &[f64]) {
        debug_assert_eq!(outputs.len(), self.channels);
        if self.ny == 0 {
            return;
        }
        for (c, &y) in outputs.iter().enumerate() {
            let window = &mut self.row[c * self.ny..(c + 1) * self.ny];
            window.copy_within(..self.ny - 1, 1);
            window[0] = y;
        }
    }

    /// Back to all zeros.
    pub fn reset(&mut self) {
        self.row.fill(0.0);
    }
}

/// Output sequence and the lag matrix that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentOutput {
    /// `(num_samples, num_outputs)`.
    pub outputs: Matrix,
    /// `(num_samples, ny * num_outputs)`; row `n` built from `outputs[..n]`.
    pub lags: Matrix,
}

/// Input width of a recurrent model with `ny` lags.
#[inline]
pub fn recurrent_input_dim(ny: usize, num_outputs: usize, exogenous_dim: usize) -> usize {
    ny * num_outputs + exogenous_dim
}

/// Runs the network over time, feeding its outputs back as lagged inputs.
///
/// # Errors
///
/// [`AdjnetError::ShapeMismatch`] if the network's output width is not
/// `num_outputs` or its input width is not
/// `ny * num_outputs + exogenous.cols()`.
pub fn recur(
    mlp: &Mlp,
    ny: usize,
    exogenous: &Matrix,
    num_outputs: usize,
) -> AdjnetResult<RecurrentOutput> {
    let n = exogenous.rows();
    if mlp.output_dim() != num_outputs {
        return Err(AdjnetError::shape_mismatch(
            &[n, mlp.output_dim()],
            &[n, num_outputs],
        ));
    }
    let input_dim = recurrent_input_dim(ny, num_outputs, exogenous.cols());
    if mlp.input_dim() != input_dim {
        return Err(AdjnetError::shape_mismatch(
            &[n, mlp.input_dim()],
            &[n, input_dim],
        ));
    }

    let lag_width = ny * num_outputs;
    if lag_width == 0 {
        // no feedback: every step is independent
        return Ok(RecurrentOutput {
            outputs: mlp.predict(exogenous)?,
            lags: Matrix::zeros(n, 0),
        });
    }

    let mut outputs = Matrix::zeros(n, num_outputs);
    let mut lags = Matrix::zeros(n, lag_width);
    let mut buffer = LagBuffer::new(ny, num_outputs);
    let mut workspace = mlp.create_workspace();
    let mut input = vec![0.0; input_dim];

    for step in 0..n {
        lags.row_mut(step).copy_from_slice(buffer.row());
        input[..lag_width].copy_from_slice(buffer.row());
        input[lag_width..].copy_from_slice(exogenous.row(step));

        let y = outputs.row_mut(step);
        mlp.forward_single(&input, y, &mut workspace);
        buffer.push(y);
    }

    Ok(RecurrentOutput { outputs, lags })
}

/// Regressor matrix `[lags, exogenous]` fed to the network during training.
pub fn lagged_inputs(lags: &Matrix, exogenous: &Matrix) -> AdjnetResult<Matrix> {
    Matrix::hstack(&[lags, exogenous])
}
