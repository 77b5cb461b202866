//! Recurrent evaluation and training-epoch benchmarks.
//!
//! `recur` is a strict sequential scan, so it is measured per sequence
//! length. `train_epoch` times one trainer step (one solver iteration plus
//! lag regeneration) from a fixed starting point.

use adjnet::{
    init_params, recur, recurrent_input_dim, LevenbergMarquardt, Matrix, Mlp, NetworkConfig,
    RecurrentTrainer, TrainConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const NY: usize = 2;

fn config() -> NetworkConfig {
    NetworkConfig::builder()
        .input_dim(recurrent_input_dim(NY, 1, 1))
        .hidden_dims(vec![10])
        .output_dim(1)
        .seed(42)
        .build()
        .unwrap()
}

fn signal(n: usize) -> Matrix {
    let xs: Vec<f64> = (0..n).map(|i| (i as f64 * 0.05).sin()).collect();
    Matrix::column_vector(&xs)
}

fn bench_recur(c: &mut Criterion) {
    let mlp = Mlp::random(config()).unwrap();
    let mut group = c.benchmark_group("recur");

    for &steps in &[100_usize, 1000, 10_000] {
        let exo = signal(steps);
        group.throughput(Throughput::Elements(steps as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
            b.iter(|| recur(&mlp, NY, black_box(&exo), 1).unwrap());
        });
    }

    group.finish();
}

fn bench_train_epoch(c: &mut Criterion) {
    let cfg = config();
    let x0 = init_params(&cfg.shape().unwrap(), cfg.init_seed);
    let solver = LevenbergMarquardt::default();
    let train = TrainConfig::new(0.0, 1000);
    let mut group = c.benchmark_group("train_epoch");

    for &steps in &[50_usize, 200] {
        let exo = signal(steps);
        let targets = signal(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
            b.iter(|| {
                let mut trainer =
                    RecurrentTrainer::new(&cfg, &train, &x0, NY, &exo, &targets).unwrap();
                trainer.step(&solver).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_recur, bench_train_epoch);
criterion_main!(benches);
