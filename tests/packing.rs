//! Parameter packing tests.
//!
//! These tests verify:
//! - `pack(unpack(x)) == x` for assorted architectures
//! - Exact parameter-count validation
//! - The documented packed order (output layer first, bias last per row)

use adjnet::{init_params, pack, unpack, AdjnetError, NetworkShape};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_params(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-2.0..2.0)).collect()
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_round_trip_assorted_shapes() {
    let shapes: &[&[usize]] = &[
        &[1, 1, 1],
        &[2, 10, 10, 1],
        &[3, 7, 2],
        &[4, 3, 5, 2, 6, 3],
        &[5, 1, 1, 1, 1, 1, 5],
    ];
    for (seed, dims) in shapes.iter().enumerate() {
        let shape = NetworkShape::from_dims(dims).unwrap();
        let params = random_params(shape.param_count(), seed as u64);
        let layers = unpack(&params, &shape).unwrap();
        assert_eq!(layers.dims(), dims.to_vec());
        assert_eq!(pack(&layers), params, "round trip failed for {:?}", dims);
    }
}

#[test]
fn test_round_trip_initial_params() {
    let shape = NetworkShape::new(3, &[6, 4], 2).unwrap();
    let params = init_params(&shape, Some(9));
    assert_eq!(pack(&unpack(&params, &shape).unwrap()), params);
}

// =============================================================================
// Parameter Count
// =============================================================================

#[test]
fn test_two_ten_ten_one_needs_151() {
    let shape = NetworkShape::new(2, &[10, 10], 1).unwrap();
    assert_eq!(shape.param_count(), 151);

    assert!(unpack(&vec![0.0; 151], &shape).is_ok());
    for wrong in [150, 152] {
        let err = unpack(&vec![0.0; wrong], &shape).unwrap_err();
        assert!(
            matches!(err, AdjnetError::ParamLength { expected: 151, got } if got == wrong),
            "unexpected error for {}: {:?}",
            wrong,
            err
        );
    }
}

#[test]
fn test_empty_vector_rejected() {
    let shape = NetworkShape::new(1, &[1], 1).unwrap();
    assert!(unpack(&[], &shape).unwrap_err().is_shape_error());
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_output_layer_comes_first() {
    // [2, 3, 1]: output layer is 1 x (3 + 1), hidden layer is 3 x (2 + 1)
    let shape = NetworkShape::new(2, &[3], 1).unwrap();
    let params: Vec<f64> = (0..shape.param_count()).map(|i| i as f64).collect();
    let layers = unpack(&params, &shape).unwrap();

    let out = layers.output_layer();
    assert_eq!(out.weights_row(0), &[0.0, 1.0, 2.0]);
    assert_eq!(out.bias(0), 3.0);

    let hidden = layers.get(0);
    assert_eq!(hidden.in_dim(), 2);
    assert_eq!(hidden.row(0), &[4.0, 5.0, 6.0]);
    assert_eq!(hidden.bias(2), 12.0);
}
