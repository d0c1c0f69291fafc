use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dval_core::{FnUtility, RngHandle, ValuationResult};
use dval_stop::{Criterion as StopCriterion, MaxUpdates};
use dval_value::{
    permutation_montecarlo_shapley, permutation_unit, LowMarginalTruncation, NoTruncation,
    SeedPolicy, TruncationPolicy, ValuationConfig, PERMUTATION_ALGORITHM,
};

fn saturating(n: usize) -> FnUtility {
    FnUtility::new((0..n).collect(), move |subset| {
        let k = subset.len() as f64;
        k / (1.0 + k / n as f64)
    })
}

fn bench_units(c: &mut Criterion) {
    dval_core::logging::init("warn");
    let u = saturating(64);
    let truncation = LowMarginalTruncation::from_utility(&u, None).expect("policy");
    let indices: Vec<usize> = (0..64).collect();
    let mut acc =
        ValuationResult::zeros(PERMUTATION_ALGORITHM, &indices, None).expect("accumulator");
    let mut rng = RngHandle::from_seed(1);

    c.bench_function("permutation_unit_64", |b| {
        b.iter(|| {
            permutation_unit(&u, &NoTruncation, &mut acc, &mut rng).expect("unit");
        });
    });
    c.bench_function("permutation_unit_64_truncated", |b| {
        b.iter(|| {
            permutation_unit(&u, &truncation, &mut acc, &mut rng).expect("unit");
        });
    });
}

fn bench_sampler(c: &mut Criterion) {
    let u = Arc::new(saturating(16));
    let config = ValuationConfig {
        seeds: SeedPolicy::fixed(3),
        ..ValuationConfig::default()
    };
    let truncation: Arc<dyn TruncationPolicy> = Arc::new(NoTruncation);

    c.bench_function("permutation_montecarlo_16x100", |b| {
        b.iter(|| {
            let done = StopCriterion::new(MaxUpdates::new(Some(100)).expect("criterion"));
            let result = permutation_montecarlo_shapley(
                Arc::clone(&u),
                done,
                Arc::clone(&truncation),
                &config,
            )
            .expect("run");
            black_box(result);
        });
    });
}

criterion_group!(benches, bench_units, bench_sampler);
criterion_main!(benches);
