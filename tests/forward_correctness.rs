//! Tests for forward pass shape fidelity and numerical behavior.
//!
//! These tests verify:
//! - Output and cache shapes for 1 to 5 hidden layers
//! - Determinism across repeated calls
//! - Zero-weight baseline (output equals the output bias)
//! - Sequential vs parallel vs single-sample parity
//! - A hand-computed reference value

use adjnet::{
    forward, forward_parallel, unpack, Activation, Matrix, Mlp, NetworkConfig, NetworkShape,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_matrix(rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut rng = SmallRng::seed_from_u64(seed);
    let data = (0..rows * cols).map(|_| rng.gen_range(-1.5..1.5)).collect();
    Matrix::from_vec(rows, cols, data).unwrap()
}

fn random_params(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

// =============================================================================
// Shape Fidelity
// =============================================================================

#[test]
fn test_shapes_one_to_five_hidden_layers() {
    let hidden_sets: [&[usize]; 5] = [&[4], &[4, 3], &[5, 2, 6], &[3, 3, 3, 3], &[2, 7, 1, 4, 5]];
    for (seed, hidden) in hidden_sets.iter().enumerate() {
        for activation in Activation::ALL {
            let config = NetworkConfig::builder()
                .input_dim(3)
                .hidden_dims(hidden.to_vec())
                .output_dim(2)
                .activation(activation)
                .seed(seed as u64)
                .build()
                .unwrap();
            let mlp = Mlp::random(config).unwrap();
            let inputs = random_matrix(9, 3, seed as u64);

            let pass = mlp.forward(&inputs).unwrap();
            assert_eq!(pass.output.shape(), (9, 2));
            assert_eq!(pass.cache.num_samples(), 9);
            assert_eq!(pass.cache.num_hidden(), hidden.len());
            assert_eq!(pass.cache.weights_version(), mlp.weights().version());
            for (h, &width) in hidden.iter().enumerate() {
                assert_eq!(pass.cache.gamma(h).shape(), (9, width));
                assert_eq!(pass.cache.activation(h).shape(), (9, width));
            }
        }
    }
}

#[test]
fn test_input_width_mismatch() {
    let config = NetworkConfig::new(3, vec![4], 1, Activation::Tanh);
    let mlp = Mlp::zeros(config).unwrap();
    let err = mlp.forward(&Matrix::zeros(5, 2)).unwrap_err();
    assert!(err.is_shape_error());
}

#[test]
fn test_empty_batch() {
    let config = NetworkConfig::new(2, vec![3], 1, Activation::Sigmoid);
    let mlp = Mlp::zeros(config).unwrap();
    let pass = mlp.forward(&Matrix::zeros(0, 2)).unwrap();
    assert_eq!(pass.output.shape(), (0, 1));
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_forward_is_deterministic() {
    let shape = NetworkShape::new(4, &[6, 5], 3).unwrap();
    let params = random_params(shape.param_count(), 3);
    let weights = unpack(&params, &shape).unwrap();
    let inputs = random_matrix(32, 4, 4);

    let first = forward(&weights, &Activation::Tanh, &inputs).unwrap();
    let second = forward(&weights, &Activation::Tanh, &inputs).unwrap();
    assert_eq!(first.output, second.output);
    assert_eq!(first.cache.gamma(1), second.cache.gamma(1));
}

#[test]
fn test_parallel_matches_sequential() {
    let shape = NetworkShape::new(3, &[8, 8], 2).unwrap();
    let weights = unpack(&random_params(shape.param_count(), 5), &shape).unwrap();
    let inputs = random_matrix(300, 3, 6);

    let seq = forward(&weights, &Activation::Sigmoid, &inputs).unwrap();
    let par = forward_parallel(&weights, &Activation::Sigmoid, &inputs).unwrap();
    assert_eq!(seq.output, par.output);
    for h in 0..2 {
        assert_eq!(seq.cache.gamma(h), par.cache.gamma(h));
        assert_eq!(seq.cache.activation(h), par.cache.activation(h));
    }
}

#[test]
fn test_single_sample_matches_batch() {
    let config = NetworkConfig::builder()
        .input_dim(5)
        .hidden_dims(vec![7, 3])
        .output_dim(2)
        .seed(12)
        .build()
        .unwrap();
    let mlp = Mlp::random(config).unwrap();
    let inputs = random_matrix(10, 5, 7);
    let batch = mlp.predict(&inputs).unwrap();

    let mut workspace = mlp.create_workspace();
    let mut out = [0.0; 2];
    for r in 0..inputs.rows() {
        mlp.forward_single(inputs.row(r), &mut out, &mut workspace);
        assert_eq!(&out, batch.row(r), "row {} differs", r);
    }
}

// =============================================================================
// Numerical Values
// =============================================================================

#[test]
fn test_zero_weight_baseline() {
    let shape = NetworkShape::new(2, &[10, 10], 1).unwrap();
    let mut params = vec![0.0; shape.param_count()];
    // output layer is first: 10 weights then its bias
    params[10] = 0.75;
    // nonzero hidden biases do not leak through zero output weights
    let mut rng = SmallRng::seed_from_u64(8);
    for layer_start in [11, 11 + 110] {
        let (rows, cols) = if layer_start == 11 { (10, 11) } else { (10, 3) };
        for r in 0..rows {
            params[layer_start + r * cols + cols - 1] = rng.gen_range(-1.0..1.0);
        }
    }
    let weights = unpack(&params, &shape).unwrap();
    let inputs = random_matrix(16, 2, 9);

    for activation in Activation::ALL {
        let pass = forward(&weights, &activation, &inputs).unwrap();
        assert!(pass.output.as_slice().iter().all(|&y| y == 0.75));
    }

    let all_zero = unpack(&vec![0.0; 151], &shape).unwrap();
    let pass = forward(&all_zero, &Activation::Tanh, &inputs).unwrap();
    assert!(pass.output.as_slice().iter().all(|&y| y == 0.0));
}

#[test]
fn test_hand_computed_value() {
    // [1, 2, 1]: output [1, -2 | 0.5], hidden [0.5 | 0], [-1 | 1]
    let shape = NetworkShape::new(1, &[2], 1).unwrap();
    let params = vec![1.0, -2.0, 0.5, 0.5, 0.0, -1.0, 1.0];
    let weights = unpack(&params, &shape).unwrap();
    let x = 0.3;
    let pass = forward(&weights, &Activation::Tanh, &Matrix::column_vector(&[x])).unwrap();

    let expected = (0.5 * x).tanh() - 2.0 * (1.0 - x).tanh() + 0.5;
    assert!((pass.output[(0, 0)] - expected).abs() < 1e-14);
    assert!((pass.cache.gamma(0)[(0, 1)] - (1.0 - x)).abs() < 1e-15);
}
