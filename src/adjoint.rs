//! Adjoint network: exact output derivatives with respect to inputs.
//!
//! # Mathematical Foundation
//!
//! For a probe direction `v` in input space, the derivative of the outputs
//! along `v` follows the chain rule through every hidden layer:
//!
//! ```text
//! a_1   = (v · W_1ᵀ) ⊙ f'(gamma_1)
//! a_h   = (a_{h-1} · W_hᵀ) ⊙ f'(gamma_h)        h = 2..H
//! dy/dv =  a_H · W_{H+1}ᵀ
//! ```
//!
//! where `W_i` is weight layer `i` with its bias column removed and
//! `gamma_h` comes from the forward pass's [`LayerCache`]. The adjoint
//! layers are stored in reverse (output-side first), mirroring the chain
//! rule's traversal.
//!
//! # Cache Coupling
//!
//! The result is only meaningful for a cache produced by the same weights on
//! the same batch. Every cache carries the weights' version token and
//! [`AdjointNetwork::evaluate`] rejects mismatches with
//! [`AdjnetError::StaleCache`].
//!
//! ```rust
//! use adjnet::{unit_probes, Matrix, Mlp, NetworkConfig, OutputMask};
//!
//! let config = NetworkConfig::builder()
//!     .input_dim(2)
//!     .hidden_dims(vec![5])
//!     .output_dim(1)
//!     .seed(9)
//!     .build()
//!     .unwrap();
//! let mlp = Mlp::random(config).unwrap();
//! let inputs = Matrix::from_rows(&[vec![0.3, -0.1]]).unwrap();
//!
//! let pass = mlp.forward(&inputs).unwrap();
//! let probes = unit_probes(2, &[0, 1]).unwrap();
//! let d = mlp.adjoint(&pass.cache, &probes, &OutputMask::All).unwrap();
//! // one column per (probe, output) pair
//! assert_eq!(d.shape(), (1, 2));
//! ```

use rayon::prelude::*;

use crate::activation::ActivationFn;
use crate::config::ConfigError;
use crate::error::{AdjnetError, AdjnetResult};
use crate::layer::WeightLayers;
use crate::matrix::{dot, Matrix};
use crate::network::LayerCache;

/// Post-hoc selection of output columns in the adjoint result.
///
/// Masked columns are still computed, then multiplied by 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMask {
    /// Keep every output for every probe.
    #[default]
    All,
    /// One flag per output, shared by all probes.
    Shared(Vec<bool>),
    /// One flag vector per probe.
    PerProbe(Vec<Vec<bool>>),
}

impl OutputMask {
    /// Builds a shared mask from 0/1 values (any nonzero keeps the column).
    pub fn from_binary(flags: &[f64]) -> Self {
        OutputMask::Shared(flags.iter().map(|&f| f != 0.0).collect())
    }

    /// Checks the mask against `num_probes` probes and `output_dim` outputs.
    pub fn validate(&self, num_probes: usize, output_dim: usize) -> Result<(), ConfigError> {
        match self {
            OutputMask::All => Ok(()),
            OutputMask::Shared(flags) => check_len(flags.len(), output_dim),
            OutputMask::PerProbe(per_probe) => {
                check_len(per_probe.len(), num_probes)?;
                per_probe
                    .iter()
                    .try_for_each(|flags| check_len(flags.len(), output_dim))
            }
        }
    }

    /// Whether output `k` of probe `p` is kept.
    #[inline]
    pub fn keeps(&self, p: usize, k: usize) -> bool {
        match self {
            OutputMask::All => true,
            OutputMask::Shared(flags) => flags[k],
            OutputMask::PerProbe(per_probe) => per_probe[p][k],
        }
    }

    /// `1.0` for a kept column, `0.0` for a masked one. Applied by
    /// multiplication, so a non-finite derivative stays non-finite.
    #[inline]
    pub fn factor(&self, p: usize, k: usize) -> f64 {
        if self.keeps(p, k) {
            1.0
        } else {
            0.0
        }
    }
}

fn check_len(got: usize, expected: usize) -> Result<(), ConfigError> {
    if got != expected {
        return Err(ConfigError::MaskLength { expected, got });
    }
    Ok(())
}

/// One-hot probe rows, one per entry of `inputs`.
///
/// # Errors
///
/// [`ConfigError::InvalidDimension`] if an index is `>= input_dim`.
pub fn unit_probes(input_dim: usize, inputs: &[usize]) -> Result<Matrix, ConfigError> {
    let mut probes = Matrix::zeros(inputs.len(), input_dim);
    for (p, &j) in inputs.iter().enumerate() {
        if j >= input_dim {
            return Err(ConfigError::InvalidDimension(
                "probe input index out of range",
            ));
        }
        probes[(p, j)] = 1.0;
    }
    Ok(probes)
}

/// Concatenates forward outputs and adjoint columns: `[y, dy/dv_1, …]`.
pub fn combine_outputs(outputs: &Matrix, derivatives: &Matrix) -> AdjnetResult<Matrix> {
    Matrix::hstack(&[outputs, derivatives])
}

/// Bias-stripped, order-reversed weight layers.
#[derive(Debug, Clone)]
pub struct AdjointNetwork {
    weights_version: u64,
    /// Output-side layer first; each `(out_dim, in_dim)`.
    layers: Vec<Matrix>,
}

impl AdjointNetwork {
    /// Builds the adjoint layers once for a set of weights.
    pub fn new(weights: &WeightLayers) -> Self {
        let layers = weights
            .layers()
            .iter()
            .rev()
            .map(|layer| {
                let mut m = Matrix::zeros(layer.out_dim(), layer.in_dim());
                for o in 0..layer.out_dim() {
                    m.row_mut(o).copy_from_slice(layer.weights_row(o));
                }
                m
            })
            .collect();

        Self {
            weights_version: weights.version(),
            layers,
        }
    }

    #[inline]
    pub fn weights_version(&self) -> u64 {
        self.weights_version
    }

    /// Number of adjoint layers (same as weight layers).
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Adjoint layer `i`, output side first.
    #[inline]
    pub fn layer(&self, i: usize) -> &Matrix {
        &self.layers[i]
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].cols()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[0].rows()
    }

    /// Derivatives of every output along every probe row.
    ///
    /// Returns `(num_samples, num_probes * output_dim)`; probe `p`, output `k`
    /// lands in column `p * output_dim + k`.
    ///
    /// # Errors
    ///
    /// - [`AdjnetError::StaleCache`] if `cache` came from other weights
    /// - [`AdjnetError::ShapeMismatch`] if the cache depth differs
    /// - [`ConfigError::ProbeLength`] / [`ConfigError::MaskLength`] on bad
    ///   probe or mask sizes
    pub fn evaluate<A: ActivationFn + ?Sized>(
        &self,
        activation: &A,
        cache: &LayerCache,
        probes: &Matrix,
        mask: &OutputMask,
        parallel: bool,
    ) -> AdjnetResult<Matrix> {
        if cache.weights_version() != self.weights_version {
            return Err(AdjnetError::stale_cache(
                cache.weights_version(),
                self.weights_version,
            ));
        }
        let hidden = self.layers.len() - 1;
        if cache.num_hidden() != hidden {
            return Err(AdjnetError::shape_mismatch(&[hidden], &[cache.num_hidden()]));
        }
        if probes.cols() != self.input_dim() {
            return Err(ConfigError::ProbeLength {
                expected: self.input_dim(),
                got: probes.cols(),
            }
            .into());
        }
        mask.validate(probes.rows(), self.output_dim())?;

        // v · W_1ᵀ does not depend on the sample
        let first = &self.layers[hidden];
        let mut seeds = Matrix::zeros(probes.rows(), first.rows());
        for p in 0..probes.rows() {
            let probe = probes.row(p);
            for (j, slot) in seeds.row_mut(p).iter_mut().enumerate() {
                *slot = dot(probe, first.row(j));
            }
        }

        let output_dim = self.output_dim();
        let width = probes.rows() * output_dim;
        let mut out = Matrix::zeros(cache.num_samples(), width);
        if width == 0 {
            return Ok(out);
        }

        let max_dim = self.layers.iter().map(Matrix::rows).max().unwrap_or(1);
        let new_scratch = || (vec![0.0; max_dim], vec![0.0; max_dim]);
        let row_kernel = |scratch: &mut (Vec<f64>, Vec<f64>), (s, row): (usize, &mut [f64])| {
            self.sample_into(activation, cache, &seeds, mask, s, row, scratch);
        };

        if parallel {
            out.as_mut_slice()
                .par_chunks_mut(width)
                .enumerate()
                .for_each_init(new_scratch, row_kernel);
        } else {
            let mut scratch = new_scratch();
            out.as_mut_slice()
                .chunks_mut(width)
                .enumerate()
                .for_each(|item| row_kernel(&mut scratch, item));
        }
        Ok(out)
    }

    /// Fills one output row (all probes) for sample `s`.
    #[allow(clippy::too_many_arguments)]
    fn sample_into<A: ActivationFn + ?Sized>(
        &self,
        activation: &A,
        cache: &LayerCache,
        seeds: &Matrix,
        mask: &OutputMask,
        s: usize,
        row: &mut [f64],
        scratch: &mut (Vec<f64>, Vec<f64>),
    ) {
        let hidden = self.layers.len() - 1;
        let output_dim = self.output_dim();
        let (a, alpha) = scratch;

        for p in 0..seeds.rows() {
            let gamma = cache.gamma(0).row(s);
            let mut width = gamma.len();
            for (j, seed) in seeds.row(p).iter().enumerate() {
                a[j] = seed * activation.derivative(gamma[j]);
            }

            for h in 1..hidden {
                let w = &self.layers[hidden - h];
                let gamma = cache.gamma(h).row(s);
                for j in 0..w.rows() {
                    alpha[j] = dot(&a[..width], w.row(j)) * activation.derivative(gamma[j]);
                }
                std::mem::swap(a, alpha);
                width = w.rows();
            }

            let w_out = &self.layers[0];
            let dst = &mut row[p * output_dim..(p + 1) * output_dim];
            for (k, slot) in dst.iter_mut().enumerate() {
                *slot = dot(&a[..width], w_out.row(k)) * mask.factor(p, k);
            }
        }
    }
}

/// Builds the adjoint layers for `weights` and evaluates them sequentially.
///
/// See [`AdjointNetwork::evaluate`].
pub fn adjoint<A: ActivationFn + ?Sized>(
    weights: &WeightLayers,
    activation: &A,
    cache: &LayerCache,
    probes: &Matrix,
    mask: &OutputMask,
) -> AdjnetResult<Matrix> {
    AdjointNetwork::new(weights).evaluate(activation, cache, probes, mask, false)
}
