//! Forward evaluation of a multi-layer perceptron.
//!
//! Layers are visited input side to output side. At hidden layer `h` the
//! engine forms `gamma_h = [z_{h-1}, 1] · W_hᵀ` and `z_h = f(gamma_h)`; the
//! output layer stays linear. Every `(gamma_h, z_h)` pair is kept in a
//! [`LayerCache`], indexed by hidden-layer number, for the adjoint pass.
//!
//! ```rust
//! use adjnet::{Matrix, Mlp, NetworkConfig};
//!
//! let config = NetworkConfig::builder()
//!     .input_dim(2)
//!     .hidden_dims(vec![5])
//!     .output_dim(1)
//!     .seed(3)
//!     .build()
//!     .unwrap();
//! let mlp = Mlp::random(config).unwrap();
//!
//! let inputs = Matrix::from_rows(&[vec![0.1, 0.2], vec![-0.4, 0.9]]).unwrap();
//! let pass = mlp.forward(&inputs).unwrap();
//! assert_eq!(pass.output.shape(), (2, 1));
//! assert_eq!(pass.cache.num_hidden(), 1);
//! ```

use rayon::prelude::*;

use crate::activation::{Activation, ActivationFn};
use crate::adjoint::{AdjointNetwork, OutputMask};
use crate::config::NetworkConfig;
use crate::error::{AdjnetError, AdjnetResult};
use crate::layer::{init_params, pack, unpack, WeightLayer, WeightLayers};
use crate::matrix::{dot, Matrix};
use crate::shape::NetworkShape;

/// Per-hidden-layer pre-activations and activations from one forward pass.
///
/// Tagged with the version of the weights that produced it; the adjoint
/// pass refuses a cache whose tag does not match its weights.
#[derive(Debug, Clone)]
pub struct LayerCache {
    weights_version: u64,
    num_samples: usize,
    gammas: Vec<Matrix>,
    activations: Vec<Matrix>,
}

impl LayerCache {
    /// Version token of the weights this cache was computed with.
    #[inline]
    pub fn weights_version(&self) -> u64 {
        self.weights_version
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of cached hidden layers.
    #[inline]
    pub fn num_hidden(&self) -> usize {
        self.gammas.len()
    }

    /// Pre-activation of hidden layer `h` (0 = first hidden layer),
    /// shape `(num_samples, neurons_h)`.
    #[inline]
    pub fn gamma(&self, h: usize) -> &Matrix {
        &self.gammas[h]
    }

    /// Activation of hidden layer `h`, same shape as [`gamma`](Self::gamma).
    #[inline]
    pub fn activation(&self, h: usize) -> &Matrix {
        &self.activations[h]
    }
}

/// Result of [`forward`]: outputs plus the cache the adjoint pass needs.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `(num_samples, output_dim)`.
    pub output: Matrix,
    /// One `(gamma, z)` entry per hidden layer, input side first.
    pub cache: LayerCache,
}

/// Evaluates the network on a batch, one sample per input row.
///
/// # Errors
///
/// [`AdjnetError::ShapeMismatch`] if `inputs.cols()` differs from the
/// network's input width.
pub fn forward<A: ActivationFn + ?Sized>(
    weights: &WeightLayers,
    activation: &A,
    inputs: &Matrix,
) -> AdjnetResult<ForwardPass> {
    forward_impl(weights, activation, inputs, false)
}

/// Same as [`forward`], with samples split across rayon worker threads.
///
/// Results are bit-identical to the sequential version.
pub fn forward_parallel<A: ActivationFn + ?Sized>(
    weights: &WeightLayers,
    activation: &A,
    inputs: &Matrix,
) -> AdjnetResult<ForwardPass> {
    forward_impl(weights, activation, inputs, true)
}

fn forward_impl<A: ActivationFn + ?Sized>(
    weights: &WeightLayers,
    activation: &A,
    inputs: &Matrix,
    parallel: bool,
) -> AdjnetResult<ForwardPass> {
    if inputs.cols() != weights.input_dim() {
        return Err(AdjnetError::shape_mismatch(
            &[inputs.rows(), weights.input_dim()],
            &[inputs.rows(), inputs.cols()],
        ));
    }

    let hidden = weights.num_hidden();
    let mut gammas: Vec<Matrix> = Vec::with_capacity(hidden);
    let mut activations: Vec<Matrix> = Vec::with_capacity(hidden);

    for layer in &weights.layers()[..hidden] {
        let prev = activations.last().unwrap_or(inputs);
        let gamma = affine(prev, layer, parallel);
        let z = activate(&gamma, activation, parallel);
        gammas.push(gamma);
        activations.push(z);
    }

    let last = activations.last().unwrap_or(inputs);
    let output = affine(last, weights.output_layer(), parallel);

    Ok(ForwardPass {
        output,
        cache: LayerCache {
            weights_version: weights.version(),
            num_samples: inputs.rows(),
            gammas,
            activations,
        },
    })
}

/// `[input, 1] · Wᵀ` for every row of `input`.
fn affine(input: &Matrix, layer: &WeightLayer, parallel: bool) -> Matrix {
    let mut out = Matrix::zeros(input.rows(), layer.out_dim());
    let in_cols = input.cols();
    let out_cols = layer.out_dim();

    let kernel = |x: &[f64], y: &mut [f64]| {
        for (o, slot) in y.iter_mut().enumerate() {
            *slot = dot(x, layer.weights_row(o)) + layer.bias(o);
        }
    };

    if parallel {
        out.as_mut_slice()
            .par_chunks_mut(out_cols)
            .zip(input.as_slice().par_chunks(in_cols))
            .for_each(|(y, x)| kernel(x, y));
    } else {
        out.as_mut_slice()
            .chunks_mut(out_cols)
            .zip(input.as_slice().chunks(in_cols))
            .for_each(|(y, x)| kernel(x, y));
    }
    out
}

fn activate<A: ActivationFn + ?Sized>(gamma: &Matrix, activation: &A, parallel: bool) -> Matrix {
    let mut z = gamma.clone();
    if parallel {
        z.as_mut_slice()
            .par_iter_mut()
            .for_each(|v| *v = activation.eval(*v));
    } else {
        z.as_mut_slice()
            .iter_mut()
            .for_each(|v| *v = activation.eval(*v));
    }
    z
}

/// Ping-pong buffers for allocation-free single-sample evaluation.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    current: Vec<f64>,
    next: Vec<f64>,
}

impl Workspace {
    /// Workspace able to hold any layer up to `max_dim` neurons.
    pub fn new(max_dim: usize) -> Self {
        Self {
            current: vec![0.0; max_dim],
            next: vec![0.0; max_dim],
        }
    }

    /// Grows the buffers to at least `max_dim`. Never shrinks.
    pub fn reserve(&mut self, max_dim: usize) {
        if self.current.len() < max_dim {
            self.current.resize(max_dim, 0.0);
            self.next.resize(max_dim, 0.0);
        }
    }
}

/// A network configuration bundled with one set of unpacked weights.
#[derive(Debug, Clone)]
pub struct Mlp {
    config: NetworkConfig,
    shape: NetworkShape,
    weights: WeightLayers,
}

impl Mlp {
    /// Unpacks `params` for the architecture in `config`.
    pub fn new(config: NetworkConfig, params: &[f64]) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        let weights = unpack(params, &shape)?;
        Ok(Self {
            config,
            shape,
            weights,
        })
    }

    /// Wraps already unpacked weights.
    ///
    /// # Errors
    ///
    /// [`AdjnetError::ShapeMismatch`] if the weights' neuron counts differ
    /// from `config.layer_dims()`.
    pub fn from_weights(config: NetworkConfig, weights: WeightLayers) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        let dims = weights.dims();
        if dims != shape.dims() {
            return Err(AdjnetError::shape_mismatch(shape.dims(), &dims));
        }
        Ok(Self {
            config,
            shape,
            weights,
        })
    }

    /// Xavier-initialized network, reproducible when `config.init_seed` is set.
    pub fn random(config: NetworkConfig) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        let params = init_params(&shape, config.init_seed);
        Self::new(config, &params)
    }

    /// Network with every weight and bias zero.
    pub fn zeros(config: NetworkConfig) -> AdjnetResult<Self> {
        let shape = config.shape()?;
        let params = vec![0.0; shape.param_count()];
        Self::new(config, &params)
    }

    #[inline]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[inline]
    pub fn shape(&self) -> &NetworkShape {
        &self.shape
    }

    #[inline]
    pub fn weights(&self) -> &WeightLayers {
        &self.weights
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.config.activation
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.shape.input_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.shape.output_dim()
    }

    /// Returns total number of trainable parameters.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.shape.param_count()
    }

    /// Flat parameter vector in the packed order.
    pub fn params(&self) -> Vec<f64> {
        pack(&self.weights)
    }

    /// Forward pass over a batch; parallel once the batch reaches the
    /// configured threshold.
    pub fn forward(&self, inputs: &Matrix) -> AdjnetResult<ForwardPass> {
        let parallel = inputs.rows() >= self.config.multithreading_threshold;
        forward_impl(&self.weights, &self.config.activation, inputs, parallel)
    }

    /// Outputs only.
    pub fn predict(&self, inputs: &Matrix) -> AdjnetResult<Matrix> {
        self.forward(inputs).map(|pass| pass.output)
    }

    /// Exact derivatives of the outputs along each probe direction, reusing
    /// `cache` from [`forward`](Self::forward) on these weights.
    ///
    /// Returns `(num_samples, num_probes * output_dim)`.
    pub fn adjoint(
        &self,
        cache: &LayerCache,
        probes: &Matrix,
        mask: &OutputMask,
    ) -> AdjnetResult<Matrix> {
        let parallel = cache.num_samples() >= self.config.multithreading_threshold;
        AdjointNetwork::new(&self.weights).evaluate(
            &self.config.activation,
            cache,
            probes,
            mask,
            parallel,
        )
    }

    /// Forward outputs followed by the adjoint columns, in one matrix.
    pub fn evaluate_with_sensitivities(
        &self,
        inputs: &Matrix,
        probes: &Matrix,
        mask: &OutputMask,
    ) -> AdjnetResult<Matrix> {
        let pass = self.forward(inputs)?;
        let derivatives = self.adjoint(&pass.cache, probes, mask)?;
        Matrix::hstack(&[&pass.output, &derivatives])
    }

    /// Creates a workspace sized for this network.
    pub fn create_workspace(&self) -> Workspace {
        let max_dim = self.shape.dims().iter().copied().max().unwrap_or(1);
        Workspace::new(max_dim)
    }

    /// Forward pass for a single sample, without allocation.
    ///
    /// Same arithmetic as the batch path. Shapes are only debug-asserted:
    /// `input.len() == input_dim`, `output.len() == output_dim`.
    pub fn forward_single(&self, input: &[f64], output: &mut [f64], workspace: &mut Workspace) {
        debug_assert_eq!(input.len(), self.input_dim());
        debug_assert_eq!(output.len(), self.output_dim());

        let max_dim = self.shape.dims().iter().copied().max().unwrap_or(1);
        workspace.reserve(max_dim);
        let Workspace { current, next } = workspace;

        current[..input.len()].copy_from_slice(input);
        let mut width = input.len();
        let last = self.weights.len() - 1;

        for (i, layer) in self.weights.layers().iter().enumerate() {
            for o in 0..layer.out_dim() {
                let gamma = dot(&current[..width], layer.weights_row(o)) + layer.bias(o);
                next[o] = if i == last {
                    gamma
                } else {
                    self.config.activation.eval(gamma)
                };
            }
            std::mem::swap(current, next);
            width = layer.out_dim();
        }

        output.copy_from_slice(&current[..width]);
    }
}
