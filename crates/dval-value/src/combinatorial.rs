//! Combinatorial Monte Carlo Shapley: uniform subsets, reweighted.

use std::sync::Arc;

use dval_core::numeric::{ln_binomial, random_subset};
use dval_core::{DvalError, Utility, ValuationResult};
use dval_parallel::MapReduceJob;
use dval_stop::Criterion;
use tracing::{debug, warn};

use crate::config::ValuationConfig;
use crate::sampling::{
    labelled_indices, marginal, merge_all, require_indices, single_run, split_labels, Labelled,
};

/// Algorithm tag of [`combinatorial_montecarlo_shapley`].
pub const COMBINATORIAL_ALGORITHM: &str = "combinatorial_montecarlo_shapley";

/// `2^(n-1) / n / C(n-1, k)`, the weight turning a uniformly sampled
/// marginal over subsets of size `k` into an unbiased Shapley term.
///
/// An empty game has no subsets to weight, so `n == 0` gives 0.
pub fn combinatorial_weight(n: usize, k: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n_others = (n - 1) as u64;
    (n_others as f64 * std::f64::consts::LN_2 - (n as f64).ln() - ln_binomial(n_others, k as u64))
        .exp()
}

/// Monte Carlo Shapley values by uniform subset sampling.
///
/// Indices are split across jobs. Each job cycles over its indices, drawing
/// for each one a uniform subset `S` of the other indices and recording the
/// weighted marginal `u(S ∪ {i}) - u(S)`, until its clone of `done` reaches
/// a terminal status on the job's own indices. NaN marginals are skipped.
pub fn combinatorial_montecarlo_shapley<U>(
    u: Arc<U>,
    done: Criterion,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    require_indices(u.as_ref())?;
    let backend = config.backend()?;
    let seeds = config.seeds;
    let n = u.indices().len();

    let u_inputs = Arc::clone(&u);

    let map = move |chunk: Labelled, job_id: usize| -> Result<ValuationResult, DvalError> {
        let (indices, names) = split_labels(&chunk);
        let mut acc = ValuationResult::zeros(COMBINATORIAL_ALGORITHM, &indices, names.as_deref())?;
        let mut done = done.clone();
        let mut rng = seeds.rng(job_id as u64);
        let mut skipped = 0usize;
        while !done.evaluate(&mut acc).is_terminal() {
            for &idx in &indices {
                let others: Vec<usize> = u
                    .indices()
                    .iter()
                    .copied()
                    .filter(|&j| j != idx)
                    .collect();
                let subset = random_subset(&others, 0.5, &mut rng);
                let value = marginal(u.as_ref(), &subset, idx);
                if value.is_nan() {
                    skipped += 1;
                    continue;
                }
                acc.update(idx, combinatorial_weight(n, subset.len()) * value)?;
            }
        }
        if skipped > 0 {
            warn!(job_id, skipped, "utility returned NaN, marginals discarded");
        }
        debug!(job_id, n_indices = indices.len(), "combinatorial job finished");
        Ok(acc)
    };

    let inputs = labelled_indices(u_inputs.as_ref());
    let job = MapReduceJob::new(inputs, map, merge_all, backend, config.n_jobs)?
        .chunkify_inputs(true);
    single_run(job.run(1)?)
}
