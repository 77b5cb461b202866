//! Causality and lag-layout tests for output-feedback evaluation.

use adjnet::{
    lagged_inputs, recur, recurrent_input_dim, Activation, Matrix, Mlp, NetworkConfig,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const NY: usize = 2;
const STEPS: usize = 12;

fn model(num_outputs: usize, exo_dim: usize, activation: Activation) -> Mlp {
    let config = NetworkConfig::builder()
        .input_dim(recurrent_input_dim(NY, num_outputs, exo_dim))
        .hidden_dims(vec![6])
        .output_dim(num_outputs)
        .activation(activation)
        .seed(31)
        .build()
        .unwrap();
    Mlp::random(config).unwrap()
}

fn exogenous(rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut rng = SmallRng::seed_from_u64(seed);
    let data = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Matrix::from_vec(rows, cols, data).unwrap()
}

// =============================================================================
// Causality
// =============================================================================

#[test]
fn test_future_perturbation_leaves_past_unchanged() {
    for activation in Activation::ALL {
        let mlp = model(1, 2, activation);
        let exo = exogenous(STEPS, 2, 1);
        let base = recur(&mlp, NY, &exo, 1).unwrap();

        for n in 6..STEPS {
            let mut perturbed = exo.clone();
            perturbed[(n, 0)] += 0.5;
            perturbed[(n, 1)] -= 0.25;
            let run = recur(&mlp, NY, &perturbed, 1).unwrap();

            for k in 0..n {
                assert_eq!(
                    run.outputs.row(k),
                    base.outputs.row(k),
                    "output {} changed after perturbing step {}",
                    k,
                    n
                );
            }
            // lag row n only sees outputs before n
            for k in 0..=n {
                assert_eq!(run.lags.row(k), base.lags.row(k));
            }
            assert_ne!(run.outputs.row(n), base.outputs.row(n));
        }
    }
}

#[test]
fn test_perturbation_propagates_forward() {
    let mlp = model(1, 1, Activation::Tanh);
    let exo = exogenous(STEPS, 1, 2);
    let base = recur(&mlp, NY, &exo, 1).unwrap();

    let mut perturbed = exo.clone();
    perturbed[(6, 0)] += 1.0;
    let run = recur(&mlp, NY, &perturbed, 1).unwrap();

    // step 7 and 8 see the changed output through their lags
    assert_ne!(run.lags.row(7), base.lags.row(7));
    assert_ne!(run.lags.row(8), base.lags.row(8));
}

// =============================================================================
// Lag Layout
// =============================================================================

#[test]
fn test_lag_columns_multi_output() {
    let mlp = model(3, 1, Activation::Sigmoid);
    let exo = exogenous(STEPS, 1, 3);
    let run = recur(&mlp, NY, &exo, 3).unwrap();

    assert_eq!(run.outputs.shape(), (STEPS, 3));
    assert_eq!(run.lags.shape(), (STEPS, NY * 3));
    for n in 0..STEPS {
        for c in 0..3 {
            for d in 0..NY {
                let expected = if n > d { run.outputs[(n - 1 - d, c)] } else { 0.0 };
                assert_eq!(run.lags[(n, c * NY + d)], expected);
            }
        }
    }
}

#[test]
fn test_replay_with_recorded_lags() {
    let mlp = model(2, 3, Activation::Tanh);
    let exo = exogenous(STEPS, 3, 4);
    let run = recur(&mlp, NY, &exo, 2).unwrap();

    let regressors = lagged_inputs(&run.lags, &exo).unwrap();
    assert_eq!(regressors.shape(), (STEPS, mlp.input_dim()));
    assert_eq!(mlp.predict(&regressors).unwrap(), run.outputs);
}
