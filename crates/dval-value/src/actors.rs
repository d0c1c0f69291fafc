//! Truncated Monte Carlo Shapley on the coordinator/worker protocol.

use std::fmt;
use std::sync::Arc;

use dval_core::{DvalError, RngHandle, Utility, ValuationResult};
use dval_parallel::{
    run_actors, ActorConfig, ActorOutcome, Coordinator, ParallelBackend, RemoteExecutor,
    UnitOutcome, Worker,
};
use dval_stop::Criterion;
use tracing::info;

use crate::config::{SeedPolicy, ValuationConfig};
use crate::permutation::permutation_unit;
use crate::sampling::require_indices;
use crate::truncation::TruncationPolicy;

/// Algorithm tag of [`truncated_montecarlo_shapley`].
pub const TRUNCATED_ALGORITHM: &str = "truncated_montecarlo_shapley";

/// Worker sampling permutations with truncation.
pub struct ShapleyWorker<U: ?Sized> {
    worker_id: usize,
    utility: Arc<U>,
    truncation: Arc<dyn TruncationPolicy>,
    rng: RngHandle,
}

impl<U: Utility + ?Sized> ShapleyWorker<U> {
    /// Creates worker `worker_id` drawing from `rng`.
    pub fn new(
        worker_id: usize,
        utility: Arc<U>,
        truncation: Arc<dyn TruncationPolicy>,
        rng: RngHandle,
    ) -> Self {
        Self {
            worker_id,
            utility,
            truncation,
            rng,
        }
    }
}

impl<U: ?Sized> fmt::Debug for ShapleyWorker<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapleyWorker")
            .field("worker_id", &self.worker_id)
            .field("truncation", &self.truncation)
            .finish_non_exhaustive()
    }
}

impl<U: Utility + ?Sized + 'static> Worker for ShapleyWorker<U> {
    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn accumulator(&self) -> Result<ValuationResult, DvalError> {
        ValuationResult::zeros(
            TRUNCATED_ALGORITHM,
            self.utility.indices(),
            self.utility.names(),
        )
    }

    fn run_unit(&mut self, acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError> {
        permutation_unit(
            self.utility.as_ref(),
            self.truncation.as_ref(),
            acc,
            &mut self.rng,
        )
    }
}

/// Runs `n_workers` Shapley workers against an injected coordinator.
///
/// Worker `i` draws from seed substream `i`.
pub fn run_shapley_actors<U>(
    backend: &ParallelBackend,
    coordinator: Coordinator,
    u: Arc<U>,
    truncation: Arc<dyn TruncationPolicy>,
    n_workers: usize,
    actors: &ActorConfig,
    seeds: &SeedPolicy,
) -> Result<ActorOutcome, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    require_indices(u.as_ref())?;
    let workers: Vec<ShapleyWorker<U>> = (0..n_workers)
        .map(|worker_id| {
            ShapleyWorker::new(
                worker_id,
                Arc::clone(&u),
                Arc::clone(&truncation),
                seeds.rng(worker_id as u64),
            )
        })
        .collect();
    let outcome = run_actors(backend, coordinator, workers, actors)?;
    info!(
        status = %outcome.result.status(),
        n_workers = outcome.workers.len(),
        units = outcome.workers.iter().map(|w| w.units_flushed).sum::<usize>(),
        "truncated Monte Carlo finished"
    );
    Ok(outcome)
}

/// Truncated Monte Carlo Shapley values.
///
/// Builds the backend and a coordinator around `done` from `config` and
/// runs one worker per resolved job.
pub fn truncated_montecarlo_shapley<U>(
    u: Arc<U>,
    done: Criterion,
    truncation: Arc<dyn TruncationPolicy>,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
{
    let backend = config.backend()?;
    let n_workers = backend.effective_n_jobs(config.n_jobs)?;
    let outcome = run_shapley_actors(
        &backend,
        Coordinator::new(done),
        u,
        truncation,
        n_workers,
        &config.actors,
        &config.seeds,
    )?;
    Ok(outcome.result)
}
