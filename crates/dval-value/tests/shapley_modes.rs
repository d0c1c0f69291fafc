use std::sync::Arc;

use dval_core::{DvalError, FnUtility, Status};
use dval_parallel::ActorConfig;
use dval_stop::{Criterion, MaxUpdates, MinUpdates};
use dval_value::{
    compute_shapley_values, OwenMethod, OwenSettings, SeedPolicy, ShapleyMode, ValuationConfig,
    COMBINATORIAL_ALGORITHM, PERMUTATION_ALGORITHM, TRUNCATED_ALGORITHM,
};

const EXACT: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

fn additive() -> Arc<FnUtility> {
    Arc::new(FnUtility::new((0..4).collect(), |subset| {
        subset.iter().map(|&idx| idx as f64 + 1.0).sum()
    }))
}

fn config() -> ValuationConfig {
    ValuationConfig {
        actors: ActorConfig::with_periods(0.01, 0.002),
        seeds: SeedPolicy::fixed(17),
        n_jobs: Some(1),
        owen: OwenSettings {
            n_samples: Some(4),
            max_q: Some(6),
        },
        ..ValuationConfig::default()
    }
}

fn done_for(mode: ShapleyMode) -> Criterion {
    match mode {
        ShapleyMode::CombinatorialMontecarlo => {
            Criterion::new(MinUpdates::new(Some(2000)).expect("criterion"))
        }
        _ => Criterion::new(MaxUpdates::new(Some(40)).expect("criterion")),
    }
}

#[test]
fn every_mode_recovers_additive_values() {
    for mode in ShapleyMode::ALL {
        let result =
            compute_shapley_values(additive(), done_for(mode), mode, &config()).expect("run");
        let expected_algorithm = match mode {
            ShapleyMode::PermutationMontecarlo => PERMUTATION_ALGORITHM,
            ShapleyMode::TruncatedMontecarlo => TRUNCATED_ALGORITHM,
            ShapleyMode::CombinatorialMontecarlo => COMBINATORIAL_ALGORITHM,
            ShapleyMode::Owen => OwenMethod::Standard.algorithm(),
            ShapleyMode::OwenAntithetic => OwenMethod::Antithetic.algorithm(),
        };
        assert_eq!(result.algorithm(), expected_algorithm, "{mode}");
        assert_eq!(result.status(), Status::Converged, "{mode}");
        let tolerance = if mode == ShapleyMode::CombinatorialMontecarlo {
            0.5
        } else {
            1e-9
        };
        for (idx, expected) in EXACT.iter().enumerate() {
            let value = result.get(idx).expect("index present").value;
            assert!(
                (value - expected).abs() <= tolerance,
                "{mode} index {idx}: {value} vs {expected}"
            );
        }
    }
}

#[test]
fn owen_modes_need_a_sample_budget() {
    let config = ValuationConfig {
        owen: OwenSettings {
            n_samples: Some(4),
            max_q: None,
        },
        ..config()
    };
    for mode in [ShapleyMode::Owen, ShapleyMode::OwenAntithetic] {
        let err = compute_shapley_values(additive(), done_for(mode), mode, &config)
            .expect_err("max_q missing");
        assert!(matches!(err, DvalError::Config(_)));
        assert_eq!(err.info().code, "missing-owen-parameter");
        assert_eq!(err.info().context.get("mode").map(String::as_str), Some(mode.as_str()));
    }
}

#[test]
fn mode_and_owen_budget_read_from_yaml() {
    let config = ValuationConfig::from_yaml_str("owen:\n  n_samples: 10\n  max_q: 5\n")
        .expect("parse");
    assert_eq!(
        config.owen,
        OwenSettings {
            n_samples: Some(10),
            max_q: Some(5),
        }
    );
    let mode: ShapleyMode = serde_yaml::from_str("owen_antithetic").expect("mode");
    assert_eq!(mode, ShapleyMode::OwenAntithetic);
    assert_eq!(ShapleyMode::default(), ShapleyMode::TruncatedMontecarlo);
    for mode in ShapleyMode::ALL {
        let text = serde_yaml::to_string(&mode).expect("serialize");
        assert_eq!(text.trim(), mode.as_str());
    }
}
