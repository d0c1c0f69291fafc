use dval_core::ValuationResult;
use proptest::prelude::*;

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

fn accumulate(indices: &[usize], observations: &[(usize, f64)]) -> ValuationResult {
    let mut result = ValuationResult::zeros("props", indices, None).unwrap();
    for (index, value) in observations {
        result.update(*index, *value).unwrap();
    }
    result
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-7 * (1.0 + a.abs().max(b.abs()))
}

proptest! {
    #[test]
    fn updates_track_mean_and_population_variance(
        values in prop::collection::vec(-100.0f64..100.0, 1..60),
        seed in any::<u64>(),
    ) {
        let (mean, variance) = mean_and_variance(&values);
        let mut shuffled = values.clone();
        let mut rng = dval_core::RngHandle::from_seed(seed);
        rand::seq::SliceRandom::shuffle(shuffled.as_mut_slice(), &mut rng);

        for sequence in [&values, &shuffled] {
            let observations: Vec<_> = sequence.iter().map(|v| (0usize, *v)).collect();
            let result = accumulate(&[0], &observations);
            prop_assert_eq!(result.raw_counts()[0], values.len() as u64);
            prop_assert!(close(result.raw_values()[0], mean));
            prop_assert!(close(result.raw_variances()[0], variance));
        }
    }

    #[test]
    fn merging_partitions_matches_single_pass(
        observations in prop::collection::vec((0usize..4, -50.0f64..50.0), 1..80),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let indices = [0, 1, 2, 3];
        let single = accumulate(&indices, &observations);

        let mut bounds: Vec<usize> = cuts.iter().map(|cut| cut.index(observations.len() + 1)).collect();
        bounds.push(0);
        bounds.push(observations.len());
        bounds.sort_unstable();
        let parts: Vec<ValuationResult> = bounds
            .windows(2)
            .map(|w| accumulate(&indices, &observations[w[0]..w[1]]))
            .collect();

        let forward = parts.iter().cloned().fold(ValuationResult::empty(), |acc, part| acc + part);
        let backward = parts.iter().rev().cloned().fold(ValuationResult::empty(), |acc, part| acc + part);

        for merged in [forward, backward] {
            prop_assert_eq!(merged.raw_counts(), single.raw_counts());
            for pos in 0..indices.len() {
                prop_assert!(close(merged.raw_values()[pos], single.raw_values()[pos]));
                prop_assert!((merged.raw_variances()[pos] - single.raw_variances()[pos]).abs() < 1e-6);
            }
        }
    }
}
