//! Single entry point over the Monte Carlo Shapley samplers.

use std::fmt;
use std::sync::Arc;

use dval_core::{DvalError, ErrorInfo, Utility, ValuationResult};
use dval_stop::Criterion;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actors::truncated_montecarlo_shapley;
use crate::combinatorial::combinatorial_montecarlo_shapley;
use crate::config::ValuationConfig;
use crate::owen::{owen_sampling_shapley, OwenMethod};
use crate::permutation::permutation_montecarlo_shapley;

/// Sampler selected by [`compute_shapley_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapleyMode {
    /// [`permutation_montecarlo_shapley`].
    PermutationMontecarlo,
    /// [`truncated_montecarlo_shapley`].
    #[default]
    TruncatedMontecarlo,
    /// [`combinatorial_montecarlo_shapley`].
    CombinatorialMontecarlo,
    /// [`owen_sampling_shapley`] with [`OwenMethod::Standard`].
    Owen,
    /// [`owen_sampling_shapley`] with [`OwenMethod::Antithetic`].
    OwenAntithetic,
}

impl ShapleyMode {
    /// Every mode, in declaration order.
    pub const ALL: [ShapleyMode; 5] = [
        ShapleyMode::PermutationMontecarlo,
        ShapleyMode::TruncatedMontecarlo,
        ShapleyMode::CombinatorialMontecarlo,
        ShapleyMode::Owen,
        ShapleyMode::OwenAntithetic,
    ];

    /// The snake-case name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            ShapleyMode::PermutationMontecarlo => "permutation_montecarlo",
            ShapleyMode::TruncatedMontecarlo => "truncated_montecarlo",
            ShapleyMode::CombinatorialMontecarlo => "combinatorial_montecarlo",
            ShapleyMode::Owen => "owen",
            ShapleyMode::OwenAntithetic => "owen_antithetic",
        }
    }
}

impl fmt::Display for ShapleyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes Shapley values of `u` with the sampler chosen by `mode`.
///
/// Permutation samplers use the truncation policy in `config.truncation`.
/// Owen modes run a fixed sample budget taken from `config.owen` and ignore
/// `done`; both `n_samples` and `max_q` must be set for them.
pub fn compute_shapley_values<U>(
    u: Arc<U>,
    done: Criterion,
    mode: ShapleyMode,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    info!(%mode, n_indices = u.indices().len(), "computing Shapley values");
    match mode {
        ShapleyMode::PermutationMontecarlo => {
            let truncation = config.truncation.build(u.as_ref())?;
            permutation_montecarlo_shapley(u, done, truncation, config)
        }
        ShapleyMode::TruncatedMontecarlo => {
            let truncation = config.truncation.build(u.as_ref())?;
            truncated_montecarlo_shapley(u, done, truncation, config)
        }
        ShapleyMode::CombinatorialMontecarlo => combinatorial_montecarlo_shapley(u, done, config),
        ShapleyMode::Owen => owen(u, OwenMethod::Standard, mode, config),
        ShapleyMode::OwenAntithetic => owen(u, OwenMethod::Antithetic, mode, config),
    }
}

fn owen<U>(
    u: Arc<U>,
    method: OwenMethod,
    mode: ShapleyMode,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    let n_samples = required(config.owen.n_samples, "n_samples", mode)?;
    let max_q = required(config.owen.max_q, "max_q", mode)?;
    owen_sampling_shapley(u, n_samples, max_q, method, config)
}

fn required(value: Option<usize>, field: &str, mode: ShapleyMode) -> Result<usize, DvalError> {
    value.ok_or_else(|| {
        DvalError::Config(
            ErrorInfo::new("missing-owen-parameter", format!("{mode} requires owen.{field}"))
                .with_context("mode", mode)
                .with_hint("set owen.n_samples and owen.max_q in the valuation config"),
        )
    })
}
