//! Permutation sampling of Shapley values, run as a map-reduce job.

use std::sync::Arc;

use dval_core::{DvalError, Utility, ValuationResult};
use dval_parallel::{MapReduceJob, UnitOutcome};
use dval_stop::Criterion;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::ValuationConfig;
use crate::sampling::{merge_all, require_indices, single_run};
use crate::truncation::TruncationPolicy;

/// Algorithm tag of [`permutation_montecarlo_shapley`].
pub const PERMUTATION_ALGORITHM: &str = "permutation_montecarlo_shapley";

/// One unit of work: a full pass over a fresh random permutation.
///
/// Prefixes are scored incrementally starting from `u(∅)` and each index
/// receives its marginal contribution. After `truncation` fires, later
/// positions are not evaluated and receive a zero marginal; their counts
/// still increase. A NaN score discards the whole permutation and leaves
/// `acc` untouched.
pub fn permutation_unit<U, R>(
    u: &U,
    truncation: &dyn TruncationPolicy,
    acc: &mut ValuationResult,
    rng: &mut R,
) -> Result<UnitOutcome, DvalError>
where
    U: Utility + ?Sized,
    R: Rng + ?Sized,
{
    let mut permutation = u.indices().to_vec();
    permutation.shuffle(rng);

    let mut previous = u.evaluate(&[]);
    let mut marginals = Vec::with_capacity(permutation.len());
    let mut truncated_at = None;
    for pos in 0..permutation.len() {
        if truncated_at.is_some() {
            marginals.push(0.0);
            continue;
        }
        let score = u.evaluate(&permutation[..=pos]);
        if score.is_nan() || previous.is_nan() {
            warn!(
                position = pos,
                index = permutation[pos],
                "utility returned NaN, discarding permutation"
            );
            return Ok(UnitOutcome::Discarded);
        }
        let marginal = score - previous;
        previous = score;
        marginals.push(marginal);
        if truncation.should_truncate(marginal) {
            truncated_at = Some(pos);
        }
    }
    if let Some(pos) = truncated_at {
        debug!(position = pos, policy = %truncation.name(), "permutation truncated");
    }

    for (&index, marginal) in permutation.iter().zip(marginals) {
        acc.update(index, marginal)?;
    }
    Ok(UnitOutcome::Absorbed)
}

/// Monte Carlo Shapley values by permutation sampling.
///
/// Every job samples permutations into its own result until its own clone
/// of `done` reaches a terminal status; the job results are then merged.
/// Job `j` draws from seed substream `j`.
pub fn permutation_montecarlo_shapley<U>(
    u: Arc<U>,
    done: Criterion,
    truncation: Arc<dyn TruncationPolicy>,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    require_indices(u.as_ref())?;
    let backend = config.backend()?;
    let seeds = config.seeds;

    let map = move |_inputs: Vec<()>, job_id: usize| -> Result<ValuationResult, DvalError> {
        let mut done = done.clone();
        let mut rng = seeds.rng(job_id as u64);
        let mut acc = ValuationResult::zeros(PERMUTATION_ALGORITHM, u.indices(), u.names())?;
        let mut discarded = 0usize;
        while !done.evaluate(&mut acc).is_terminal() {
            if permutation_unit(u.as_ref(), truncation.as_ref(), &mut acc, &mut rng)?
                == UnitOutcome::Discarded
            {
                discarded += 1;
            }
        }
        debug!(job_id, discarded, status = %acc.status(), "permutation job finished");
        Ok(acc)
    };

    let job = MapReduceJob::new(vec![()], map, merge_all, backend, config.n_jobs)?;
    debug!(n_jobs = job.n_jobs(), "running permutation sampling");
    single_run(job.run(1)?)
}
