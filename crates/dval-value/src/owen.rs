//! Owen sampling: Shapley values as integrals of the multilinear extension.

use std::sync::Arc;

use dval_core::numeric::{linspace, random_subset};
use dval_core::{DvalError, ErrorInfo, Status, Utility, ValuationResult};
use dval_parallel::MapReduceJob;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ValuationConfig;
use crate::sampling::{
    labelled_indices, marginal, merge_all, require_indices, single_run, split_labels,
    Labelled,
};

/// Integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwenMethod {
    /// `q` over `[0, 1]`, one subset per sample.
    #[default]
    Standard,
    /// `q` over `[0, 1/2]`, each subset paired with its complement.
    Antithetic,
}

impl OwenMethod {
    /// Upper end of the `q` grid.
    pub fn q_stop(self) -> f64 {
        match self {
            OwenMethod::Standard => 1.0,
            OwenMethod::Antithetic => 0.5,
        }
    }

    /// Algorithm tag of results produced with this method.
    pub fn algorithm(self) -> &'static str {
        match self {
            OwenMethod::Standard => "owen_sampling_shapley",
            OwenMethod::Antithetic => "owen_antithetic_shapley",
        }
    }
}

/// Trapezoidal rule over equally spaced samples `ys` with spacing `h`.
pub fn trapezoid(ys: &[f64], h: f64) -> f64 {
    ys.windows(2).map(|pair| (pair[0] + pair[1]) * 0.5 * h).sum()
}

/// Mean marginal of `index` at inclusion probability `q`.
fn expected_marginal<U, R>(
    u: &U,
    index: usize,
    others: &[usize],
    q: f64,
    n_samples: usize,
    method: OwenMethod,
    rng: &mut R,
) -> Option<f64>
where
    U: Utility + ?Sized,
    R: Rng + ?Sized,
{
    let mut total = 0.0;
    let mut valid = 0usize;
    for _ in 0..n_samples {
        let subset = random_subset(others, q, rng);
        let mut sample = marginal(u, &subset, index);
        if method == OwenMethod::Antithetic {
            let complement: Vec<usize> = others
                .iter()
                .copied()
                .filter(|idx| !subset.contains(idx))
                .collect();
            sample += marginal(u, &complement, index);
        }
        if sample.is_nan() {
            continue;
        }
        total += sample;
        valid += 1;
    }
    (valid > 0).then(|| total / valid as f64)
}

/// Shapley values by Owen sampling.
///
/// For each index the expected marginal is estimated with `n_samples`
/// subsets at each of `max_q` equally spaced inclusion probabilities and
/// integrated with the trapezoidal rule. The antithetic variant integrates
/// `e(q) + e(1 - q)` over `[0, 1/2]`. Grid points whose samples are all NaN
/// contribute zero. Results carry status [`Status::Converged`], a count of
/// one and zero variance.
pub fn owen_sampling_shapley<U>(
    u: Arc<U>,
    n_samples: usize,
    max_q: usize,
    method: OwenMethod,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    require_indices(u.as_ref())?;
    if n_samples == 0 || max_q < 2 {
        return Err(DvalError::Config(
            ErrorInfo::new(
                "invalid-owen-grid",
                "Owen sampling needs n_samples >= 1 and max_q >= 2",
            )
            .with_context("n_samples", n_samples)
            .with_context("max_q", max_q),
        ));
    }
    let backend = config.backend()?;
    let seeds = config.seeds;
    let q_steps = linspace(0.0, method.q_stop(), max_q);
    let h = method.q_stop() / (max_q - 1) as f64;

    let u_inputs = Arc::clone(&u);

    let map = move |chunk: Labelled, job_id: usize| -> Result<ValuationResult, DvalError> {
        let (indices, names) = split_labels(&chunk);
        let mut rng = seeds.rng(job_id as u64);
        let mut values = Vec::with_capacity(indices.len());
        for &idx in &indices {
            let others: Vec<usize> = u.indices().iter().copied().filter(|&j| j != idx).collect();
            let mut missing = 0usize;
            let curve: Vec<f64> = q_steps
                .iter()
                .map(|&q| {
                    expected_marginal(u.as_ref(), idx, &others, q, n_samples, method, &mut rng)
                        .unwrap_or_else(|| {
                            missing += 1;
                            0.0
                        })
                })
                .collect();
            if missing > 0 {
                warn!(index = idx, missing, "utility returned NaN for every sample at some q");
            }
            values.push(trapezoid(&curve, h));
        }
        debug!(job_id, n_indices = indices.len(), "owen job finished");
        let len = indices.len();
        let mut builder = ValuationResult::builder(values)
            .variances(vec![0.0; len])
            .counts(vec![1; len])
            .indices(indices)
            .algorithm(method.algorithm())
            .status(Status::Converged);
        if let Some(names) = names {
            builder = builder.names(names);
        }
        builder.build()
    };

    let inputs = labelled_indices(u_inputs.as_ref());
    let job = MapReduceJob::new(inputs, map, merge_all, backend, config.n_jobs)?
        .chunkify_inputs(true);
    single_run(job.run(1)?)
}
