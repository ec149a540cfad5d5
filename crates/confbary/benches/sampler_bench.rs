//! Criterion microbenches for the sampling hot path.
//!
//! - shift kernel: one Möbius transport of n sphere points.
//! - optimize: full Newton solve from a fresh random start.
//! - weights: both Jacobian determinants on a converged sample.
//!
//! Results live under `target/criterion`.

use confbary::mobius::shift_sphere_points;
use confbary::sampler::{Sampler, SamplerSettings};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use nalgebra::Vector3;

fn prepared_sampler(n: usize, seed: u64) -> Sampler<3> {
    let mut sampler = Sampler::<3>::new(n, SamplerSettings::default()).unwrap();
    sampler.seed(seed);
    sampler.randomize_initial_edge_coordinates();
    sampler.compute_shift_vector();
    sampler
}

fn bench_shift(c: &mut Criterion) {
    let mut group = c.benchmark_group("shift");
    for n in [16_usize, 64, 256] {
        let sampler = {
            let mut s = prepared_sampler(n, 1);
            s.optimize();
            s
        };
        let x: Vec<Vector3<f64>> = sampler.initial_edge_coordinates().to_vec();
        let w = *sampler.shift_vector();
        group.bench_function(BenchmarkId::new("sphere_points", n), |b| {
            b.iter_batched(
                || vec![Vector3::zeros(); n],
                |mut y| shift_sphere_points(&x, &w, &mut y),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    for n in [16_usize, 64, 256] {
        let mut seed = 0_u64;
        group.bench_function(BenchmarkId::new("newton", n), |b| {
            b.iter_batched(
                || {
                    seed = seed.wrapping_add(1);
                    prepared_sampler(n, seed)
                },
                |mut sampler| sampler.optimize(),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_weights(c: &mut Criterion) {
    let mut group = c.benchmark_group("weights");
    for n in [16_usize, 64, 256] {
        let sampler = {
            let mut s = prepared_sampler(n, 7);
            s.optimize();
            s
        };
        group.bench_function(BenchmarkId::new("edge_and_quotient", n), |b| {
            b.iter_batched(
                || sampler.clone(),
                |mut s| {
                    s.compute_edge_space_sampling_weight();
                    s.compute_edge_quotient_space_sampling_correction();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_shift, bench_optimize, bench_weights);
criterion_main!(benches);
