//! Coordinator/worker protocol.
//!
//! Workers repeatedly run units of work into a private accumulator and, once
//! per update period, hand the accumulator to the coordinator over a channel.
//! The coordinator folds the partial results, evaluates the stopping
//! criterion and, on a terminal status, raises the [`CancellationToken`].
//! Workers observe the token only between units. Partial results sent before
//! the token was raised are still merged; a worker that sees the token drops
//! its unflushed accumulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dval_core::{DvalError, Status, ValuationResult};
use dval_stop::Criterion;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{ObjectRef, ParallelBackend, RemoteExecutor};
use crate::config::ActorConfig;

/// Shared stop signal raised by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the token was raised.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What happened to one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Observations were added to the accumulator.
    Absorbed,
    /// The unit was thrown away (for instance a NaN utility).
    Discarded,
}

/// A producer of partial results.
pub trait Worker: Send + 'static {
    /// Identifier used in logs and summaries.
    fn worker_id(&self) -> usize;

    /// A fresh, empty accumulator for one flush period.
    fn accumulator(&self) -> Result<ValuationResult, DvalError>;

    /// Runs one indivisible unit of work into `acc`.
    fn run_unit(&mut self, acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError>;
}

/// Per-worker bookkeeping returned once the worker stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    /// Worker identifier.
    pub worker_id: usize,
    /// Absorbed units that reached the coordinator.
    pub units_flushed: usize,
    /// Absorbed units dropped after cancellation.
    pub units_dropped: usize,
    /// Units discarded by the worker itself.
    pub units_discarded: usize,
    /// Number of partial results sent.
    pub flushes: usize,
}

struct PeriodOutput {
    partial: ValuationResult,
    absorbed: usize,
}

struct WorkerRunner<W> {
    worker: W,
    summary: WorkerSummary,
}

impl<W: Worker> WorkerRunner<W> {
    fn new(worker: W) -> Self {
        let summary = WorkerSummary {
            worker_id: worker.worker_id(),
            ..WorkerSummary::default()
        };
        Self { worker, summary }
    }

    /// Runs units until `period` elapsed (at least one unit). Returns `None`
    /// when the token was raised, dropping whatever was accumulated.
    fn work_period(
        &mut self,
        token: &CancellationToken,
        period: Duration,
    ) -> Result<Option<PeriodOutput>, DvalError> {
        if token.is_cancelled() {
            return Ok(None);
        }
        let started = Instant::now();
        let mut partial = self.worker.accumulator()?;
        let mut absorbed = 0;
        loop {
            match self.worker.run_unit(&mut partial)? {
                UnitOutcome::Absorbed => absorbed += 1,
                UnitOutcome::Discarded => self.summary.units_discarded += 1,
            }
            if token.is_cancelled() {
                self.summary.units_dropped += absorbed;
                return Ok(None);
            }
            if started.elapsed() >= period {
                return Ok(Some(PeriodOutput { partial, absorbed }));
            }
        }
    }

    fn record_flush(&mut self, absorbed: usize) {
        self.summary.units_flushed += absorbed;
        self.summary.flushes += 1;
    }

    fn finish(self) -> WorkerSummary {
        debug!(
            worker_id = self.summary.worker_id,
            flushes = self.summary.flushes,
            units_flushed = self.summary.units_flushed,
            units_dropped = self.summary.units_dropped,
            units_discarded = self.summary.units_discarded,
            "worker stopped"
        );
        self.summary
    }
}

/// Loop run by each worker thread of the distributed backend.
fn worker_loop<W: Worker>(
    worker: W,
    results: Sender<ValuationResult>,
    token: CancellationToken,
    period: Duration,
) -> Result<WorkerSummary, DvalError> {
    let mut runner = WorkerRunner::new(worker);
    while let Some(output) = runner.work_period(&token, period)? {
        if results.send(output.partial).is_err() {
            runner.summary.units_dropped += output.absorbed;
            break;
        }
        runner.record_flush(output.absorbed);
    }
    Ok(runner.finish())
}

/// Aggregates partial results and decides when to stop.
#[derive(Debug)]
pub struct Coordinator {
    buffer: Vec<ValuationResult>,
    criterion: Criterion,
    status: Status,
    token: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator; the criterion always writes its status into
    /// the accumulated result.
    pub fn new(criterion: Criterion) -> Self {
        Self {
            buffer: Vec::new(),
            criterion: criterion.with_modify_result(true),
            status: Status::Pending,
            token: CancellationToken::new(),
        }
    }

    /// The stop signal handed to workers.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether a terminal status was reached.
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress of the stopping criterion.
    pub fn completion(&self) -> f64 {
        self.criterion.completion()
    }

    /// Buffers a partial result from a worker.
    ///
    /// Once a terminal status is reached new partials are dropped.
    pub fn add_results(&mut self, partial: ValuationResult) {
        if self.is_done() {
            debug!(
                status = %self.status,
                n_indices = partial.len(),
                "dropping partial result after termination"
            );
            return;
        }
        self.buffer.push(partial);
    }

    /// Buffers partials that workers sent before they observed the stop
    /// signal, regardless of status.
    pub fn drain_in_flight<I>(&mut self, partials: I) -> usize
    where
        I: IntoIterator<Item = ValuationResult>,
    {
        let before = self.buffer.len();
        self.buffer.extend(partials);
        let drained = self.buffer.len() - before;
        if drained > 0 {
            debug!(n = drained, "merging in-flight partial results");
        }
        drained
    }

    /// Folds the buffered results into one, replacing the buffer with it.
    pub fn accumulate(&mut self) -> Result<ValuationResult, DvalError> {
        let folded = self
            .buffer
            .drain(..)
            .try_fold(ValuationResult::empty(), |acc, partial| {
                acc.try_merge(&partial)
            })?;
        self.buffer.push(folded.clone());
        Ok(folded)
    }

    /// Evaluates the stopping criterion on the accumulated result.
    ///
    /// Once done this returns the terminal status without checking again.
    pub fn check_convergence(&mut self) -> Result<Status, DvalError> {
        if self.is_done() {
            return Ok(self.status);
        }
        self.accumulate()?;
        if let Some(acc) = self.buffer.first_mut() {
            self.status = self.criterion.evaluate(acc);
        }
        if self.is_done() {
            info!(
                status = %self.status,
                criterion = %self.criterion.name(),
                "stopping criterion reached"
            );
            self.token.cancel();
        }
        Ok(self.status)
    }

    /// Final accumulated result, carrying the coordinator's status.
    pub fn finish(mut self) -> Result<ValuationResult, DvalError> {
        let mut result = self.accumulate()?;
        result.set_status(self.status);
        Ok(result)
    }
}

/// Raises the token when dropped, so no early return leaves workers running.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Final result plus per-worker summaries.
#[derive(Debug, Clone)]
pub struct ActorOutcome {
    /// Merged result.
    pub result: ValuationResult,
    /// One summary per worker, in worker order.
    pub workers: Vec<WorkerSummary>,
}

/// Runs `workers` against `coordinator` until it reaches a terminal status.
///
/// On the sequential backend workers take turns, one flush period each,
/// with a convergence check after every round. On the distributed backend
/// each worker runs on a pool thread while the coordinator checks once per
/// `coordinator_update_period_secs`; after termination workers are joined
/// (bounded by `join_timeout_secs`) and in-flight partial results drained.
///
/// # Errors
///
/// Worker errors and panics propagate. A join that exceeds its bound is a
/// retryable [`DvalError::Timeout`].
pub fn run_actors<W: Worker>(
    backend: &ParallelBackend,
    coordinator: Coordinator,
    workers: Vec<W>,
    config: &ActorConfig,
) -> Result<ActorOutcome, DvalError> {
    if workers.is_empty() {
        return Err(DvalError::config("no-workers", "at least one worker is needed"));
    }
    match backend {
        ParallelBackend::Sequential(_) => run_cooperative(coordinator, workers, config),
        ParallelBackend::Distributed(_) => run_threaded(backend, coordinator, workers, config),
    }
}

fn run_cooperative<W: Worker>(
    mut coordinator: Coordinator,
    workers: Vec<W>,
    config: &ActorConfig,
) -> Result<ActorOutcome, DvalError> {
    let period = config.worker_period()?;
    let token = coordinator.token();
    let mut runners: Vec<WorkerRunner<W>> = workers.into_iter().map(WorkerRunner::new).collect();
    while !coordinator.is_done() {
        for runner in runners.iter_mut() {
            if let Some(output) = runner.work_period(&token, period)? {
                coordinator.add_results(output.partial);
                runner.record_flush(output.absorbed);
            }
        }
        coordinator.check_convergence()?;
    }
    let workers = runners.into_iter().map(WorkerRunner::finish).collect();
    Ok(ActorOutcome {
        result: coordinator.finish()?,
        workers,
    })
}

/// Buffers every partial result arriving before `deadline`. Returns `true`
/// when all senders are gone.
fn collect_until(
    rx: &Receiver<ValuationResult>,
    deadline: Instant,
    coordinator: &mut Coordinator,
) -> bool {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(partial) => coordinator.add_results(partial),
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

/// Surfaces the error of any worker that already stopped on its own.
fn poll_failures(handles: &[ObjectRef<Result<WorkerSummary, DvalError>>]) -> Result<(), DvalError> {
    for handle in handles {
        match handle.wait(Some(Duration::ZERO)) {
            Ok(Err(err)) => return Err(err),
            Err(err) if !err.is_retryable() => return Err(err),
            _ => {}
        }
    }
    Ok(())
}

fn run_threaded<W: Worker>(
    backend: &ParallelBackend,
    mut coordinator: Coordinator,
    workers: Vec<W>,
    config: &ActorConfig,
) -> Result<ActorOutcome, DvalError> {
    let worker_period = config.worker_period()?;
    let coordinator_period = config.coordinator_period()?;
    let join_timeout = config.join_timeout()?;
    let token = coordinator.token();
    let _stop_workers = CancelOnDrop(token.clone());

    let (tx, rx) = mpsc::channel();
    let handles: Vec<ObjectRef<Result<WorkerSummary, DvalError>>> = workers
        .into_iter()
        .map(|worker| {
            let tx = tx.clone();
            let token = token.clone();
            backend.spawn(move || worker_loop(worker, tx, token, worker_period))
        })
        .collect();
    drop(tx);
    info!(n_workers = handles.len(), "workers started");

    loop {
        let deadline = Instant::now() + coordinator_period;
        let disconnected = collect_until(&rx, deadline, &mut coordinator);
        coordinator.check_convergence()?;
        if coordinator.is_done() || disconnected {
            break;
        }
        poll_failures(&handles)?;
    }
    token.cancel();

    let mut summaries = Vec::with_capacity(handles.len());
    for handle in &handles {
        summaries.push(handle.wait(Some(join_timeout))??);
    }
    coordinator.drain_in_flight(rx.try_iter());
    Ok(ActorOutcome {
        result: coordinator.finish()?,
        workers: summaries,
    })
}
