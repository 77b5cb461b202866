//! Forward pass benchmarks.
//!
//! # Methodology
//!
//! **Fixed weights per batch size**: every batch size uses the same seeded
//! network, so timings differ only in the number of samples.
//!
//! **Threshold crossing**: batches of 256 and above go through the rayon
//! path with the default configuration; `forward` vs `forward_parallel`
//! compares both paths at every size.
//!
//! **Throughput metric**: `Elements` = `batch_size * input_dim`.

use adjnet::{forward, forward_parallel, Matrix, Mlp, NetworkConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn make_inputs(rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Matrix::from_vec(rows, cols, data).unwrap()
}

fn network() -> Mlp {
    let config = NetworkConfig::builder()
        .input_dim(8)
        .hidden_dims(vec![32, 32])
        .output_dim(2)
        .seed(42)
        .build()
        .unwrap();
    Mlp::random(config).unwrap()
}

fn bench_forward(c: &mut Criterion) {
    let mlp = network();
    let batch_sizes = [1_usize, 16, 64, 256, 1024];
    let mut group = c.benchmark_group("forward_batch");

    for &batch in &batch_sizes {
        let inputs = make_inputs(batch, mlp.input_dim(), 7);
        group.throughput(Throughput::Elements((batch * mlp.input_dim()) as u64));

        group.bench_with_input(BenchmarkId::new("sequential", batch), &batch, |b, _| {
            b.iter(|| forward(mlp.weights(), &mlp.activation(), black_box(&inputs)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("parallel", batch), &batch, |b, _| {
            b.iter(|| {
                forward_parallel(mlp.weights(), &mlp.activation(), black_box(&inputs)).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_forward_single(c: &mut Criterion) {
    let mlp = network();
    let inputs = make_inputs(1, mlp.input_dim(), 11);
    let mut output = vec![0.0; mlp.output_dim()];
    // reused across iterations, no allocation after the first call
    let mut workspace = mlp.create_workspace();

    c.bench_function("forward_single", |b| {
        b.iter(|| {
            mlp.forward_single(black_box(inputs.row(0)), black_box(&mut output), &mut workspace);
        });
    });
}

criterion_group!(benches, bench_forward, bench_forward_single);
criterion_main!(benches);
