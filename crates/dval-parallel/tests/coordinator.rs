use std::thread::sleep;
use std::time::{Duration, Instant};

use dval_core::{DvalError, Status, ValuationResult};
use dval_parallel::{
    run_actors, ActorConfig, CancellationToken, Coordinator, ParallelBackend, UnitOutcome, Worker,
};
use dval_stop::{make_criterion, Criterion, MaxChecks, MaxUpdates};

/// Adds one observation of `value` to index 0 per unit.
struct Counter {
    id: usize,
    value: f64,
    pause: Duration,
}

impl Worker for Counter {
    fn worker_id(&self) -> usize {
        self.id
    }

    fn accumulator(&self) -> Result<ValuationResult, DvalError> {
        ValuationResult::zeros("counter", &[0], None)
    }

    fn run_unit(&mut self, acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError> {
        sleep(self.pause);
        acc.update(0, self.value)?;
        Ok(UnitOutcome::Absorbed)
    }
}

/// Adds one observation per unit, but only after the coordinator stopped.
struct Straggler {
    id: usize,
    token: CancellationToken,
}

impl Worker for Straggler {
    fn worker_id(&self) -> usize {
        self.id
    }

    fn accumulator(&self) -> Result<ValuationResult, DvalError> {
        ValuationResult::zeros("counter", &[0], None)
    }

    fn run_unit(&mut self, acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.token.is_cancelled() && Instant::now() < deadline {
            sleep(Duration::from_millis(1));
        }
        acc.update(0, 1000.0)?;
        Ok(UnitOutcome::Absorbed)
    }
}

/// Either a fast counter or a straggler, so both can share one run.
enum Mixed {
    Fast(Counter),
    Slow(Straggler),
}

impl Worker for Mixed {
    fn worker_id(&self) -> usize {
        match self {
            Mixed::Fast(w) => w.worker_id(),
            Mixed::Slow(w) => w.worker_id(),
        }
    }

    fn accumulator(&self) -> Result<ValuationResult, DvalError> {
        match self {
            Mixed::Fast(w) => w.accumulator(),
            Mixed::Slow(w) => w.accumulator(),
        }
    }

    fn run_unit(&mut self, acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError> {
        match self {
            Mixed::Fast(w) => w.run_unit(acc),
            Mixed::Slow(w) => w.run_unit(acc),
        }
    }
}

struct Failing;

impl Worker for Failing {
    fn worker_id(&self) -> usize {
        99
    }

    fn accumulator(&self) -> Result<ValuationResult, DvalError> {
        ValuationResult::zeros("counter", &[0], None)
    }

    fn run_unit(&mut self, _acc: &mut ValuationResult) -> Result<UnitOutcome, DvalError> {
        Err(DvalError::backend("utility-crashed", "model fit failed"))
    }
}

fn counters(n: usize, pause_ms: u64) -> Vec<Counter> {
    (0..n)
        .map(|id| Counter {
            id,
            value: id as f64,
            pause: Duration::from_millis(pause_ms),
        })
        .collect()
}

fn partial(count: u64) -> ValuationResult {
    ValuationResult::builder(vec![1.0])
        .counts(vec![count])
        .algorithm("counter")
        .build()
        .unwrap()
}

#[test]
fn accumulate_folds_buffer_into_one() {
    let mut coordinator = Coordinator::new(Criterion::new(MaxUpdates::new(Some(100)).unwrap()));
    coordinator.add_results(partial(2));
    coordinator.add_results(partial(3));
    let first = coordinator.accumulate().unwrap();
    assert_eq!(first.raw_counts(), &[5]);
    let again = coordinator.accumulate().unwrap();
    assert_eq!(again, first);
}

#[test]
fn check_convergence_short_circuits_once_done() {
    let mut coordinator = Coordinator::new(Criterion::new(MaxUpdates::new(Some(4)).unwrap()));
    let token = coordinator.token();
    coordinator.add_results(partial(2));
    assert_eq!(coordinator.check_convergence().unwrap(), Status::Pending);
    assert!(!token.is_cancelled());
    coordinator.add_results(partial(2));
    assert_eq!(coordinator.check_convergence().unwrap(), Status::Converged);
    assert!(token.is_cancelled());

    coordinator.add_results(partial(1000));
    assert_eq!(coordinator.check_convergence().unwrap(), Status::Converged);
    let result = coordinator.finish().unwrap();
    assert_eq!(result.status(), Status::Converged);
    assert_eq!(result.raw_counts(), &[4]);
}

#[test]
fn partials_sent_before_termination_can_still_be_drained() {
    let mut coordinator = Coordinator::new(Criterion::new(MaxUpdates::new(Some(4)).unwrap()));
    coordinator.add_results(partial(4));
    assert_eq!(coordinator.check_convergence().unwrap(), Status::Converged);
    coordinator.add_results(partial(7));
    assert_eq!(coordinator.drain_in_flight(vec![partial(1), partial(2)]), 2);
    assert_eq!(coordinator.drain_in_flight(Vec::new()), 0);
    let result = coordinator.finish().unwrap();
    assert_eq!(result.status(), Status::Converged);
    assert_eq!(result.raw_counts(), &[7]);
}

#[test]
fn failed_criterion_stops_the_run() {
    let criterion = make_criterion("always failed", |_: &ValuationResult| Status::Failed, None);
    let outcome = run_actors(
        &ParallelBackend::sequential(),
        Coordinator::new(criterion),
        counters(2, 0),
        &ActorConfig::with_periods(0.0, 0.0),
    )
    .unwrap();
    assert_eq!(outcome.result.status(), Status::Failed);
    assert_eq!(outcome.result.raw_counts(), &[2]);
}

#[test]
fn cooperative_run_takes_turns() {
    let outcome = run_actors(
        &ParallelBackend::sequential(),
        Coordinator::new(Criterion::new(MaxChecks::new(Some(2)).unwrap())),
        counters(3, 0),
        &ActorConfig::with_periods(0.0, 0.0),
    )
    .unwrap();
    assert_eq!(outcome.result.status(), Status::Converged);
    assert_eq!(outcome.result.raw_counts(), &[9]);
    assert!((outcome.result.raw_values()[0] - 1.0).abs() < 1e-12);
    for summary in &outcome.workers {
        assert_eq!(summary.flushes, 3);
        assert_eq!(summary.units_flushed, 3);
        assert_eq!(summary.units_dropped, 0);
    }
}

#[test]
fn in_flight_results_are_merged_and_nothing_after_termination() {
    for _ in 0..3 {
        let outcome = run_actors(
            &ParallelBackend::distributed(Some(4)).unwrap(),
            Coordinator::new(Criterion::new(MaxUpdates::new(Some(40)).unwrap())),
            counters(4, 1),
            &ActorConfig::with_periods(0.02, 0.005),
        )
        .unwrap();
        let flushed: usize = outcome.workers.iter().map(|w| w.units_flushed).sum();
        assert_eq!(outcome.result.status(), Status::Converged);
        assert!(outcome.result.raw_counts()[0] >= 40);
        assert_eq!(outcome.result.raw_counts()[0], flushed as u64);
        assert_eq!(outcome.workers.len(), 4);
    }
}

#[test]
fn units_finished_after_cancellation_are_left_out() {
    let coordinator = Coordinator::new(Criterion::new(MaxUpdates::new(Some(5)).unwrap()));
    let workers = vec![
        Mixed::Fast(Counter {
            id: 0,
            value: 1.0,
            pause: Duration::from_millis(1),
        }),
        Mixed::Slow(Straggler {
            id: 1,
            token: coordinator.token(),
        }),
    ];
    let outcome = run_actors(
        &ParallelBackend::distributed(Some(2)).unwrap(),
        coordinator,
        workers,
        &ActorConfig::with_periods(0.01, 0.002),
    )
    .unwrap();

    assert_eq!(outcome.result.status(), Status::Converged);
    let straggler = &outcome.workers[1];
    assert_eq!(straggler.units_flushed, 0);
    assert_eq!(straggler.units_dropped, 1);

    let flushed: usize = outcome.workers.iter().map(|w| w.units_flushed).sum();
    let dropped: usize = outcome.workers.iter().map(|w| w.units_dropped).sum();
    assert!(dropped > 0);
    assert_eq!(outcome.result.raw_counts()[0], flushed as u64);
    assert!(outcome.result.raw_counts()[0] < (flushed + dropped) as u64);
    assert!((outcome.result.raw_values()[0] - 1.0).abs() < 1e-12);
}

#[test]
fn worker_errors_propagate() {
    let err = run_actors(
        &ParallelBackend::sequential(),
        Coordinator::new(Criterion::new(MaxUpdates::new(Some(10)).unwrap())),
        vec![Failing],
        &ActorConfig::with_periods(0.0, 0.0),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "utility-crashed");

    let err = run_actors(
        &ParallelBackend::distributed(Some(2)).unwrap(),
        Coordinator::new(Criterion::new(MaxUpdates::new(Some(10)).unwrap())),
        vec![Failing, Failing],
        &ActorConfig::with_periods(0.01, 0.01),
    )
    .unwrap_err();
    assert_eq!(err.info().code, "utility-crashed");
}

#[test]
fn running_without_workers_is_a_config_error() {
    let err = run_actors::<Counter>(
        &ParallelBackend::sequential(),
        Coordinator::new(Criterion::new(MaxUpdates::new(Some(1)).unwrap())),
        Vec::new(),
        &ActorConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DvalError::Config(_)));
}

#[test]
fn actor_config_defaults_and_validation() {
    let config = ActorConfig::default();
    assert_eq!(config.coordinator_update_period_secs, 10.0);
    assert_eq!(config.worker_update_period_secs, 5.0);
    assert_eq!(config.join_timeout_secs, 300.0);
    let bad = ActorConfig::with_periods(-1.0, 1.0);
    assert!(bad.coordinator_period().is_err());
}
