//! Parallel execution and actor timing configuration.

use std::time::Duration;

use dval_core::{DvalError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Execution backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Single in-process pass on the calling thread.
    #[default]
    Sequential,
    /// Thread pool with message passing between tasks.
    Distributed,
}

/// Backend selection and sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Which backend to construct.
    #[serde(default)]
    pub backend: BackendKind,
    /// Pool size for the distributed backend; defaults to available parallelism.
    #[serde(default)]
    pub n_workers: Option<usize>,
    /// Bound on waits for remote values; `None` waits indefinitely.
    #[serde(default = "default_get_timeout_secs")]
    pub get_timeout_secs: Option<f64>,
}

fn default_get_timeout_secs() -> Option<f64> {
    Some(300.0)
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            n_workers: None,
            get_timeout_secs: default_get_timeout_secs(),
        }
    }
}

impl ParallelConfig {
    /// Configuration for the sequential backend.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Configuration for a distributed backend with `n_workers` threads.
    pub fn distributed(n_workers: Option<usize>) -> Self {
        Self {
            backend: BackendKind::Distributed,
            n_workers,
            ..Self::default()
        }
    }

    /// Parsed remote-value timeout.
    pub fn get_timeout(&self) -> Result<Option<Duration>, DvalError> {
        self.get_timeout_secs
            .map(|secs| seconds("get_timeout_secs", secs))
            .transpose()
    }
}

/// Timing of the coordinator/worker protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Interval between the coordinator's convergence checks.
    #[serde(default = "default_coordinator_update_period_secs")]
    pub coordinator_update_period_secs: f64,
    /// Minimum time a worker accumulates before flushing its partial result.
    #[serde(default = "default_worker_update_period_secs")]
    pub worker_update_period_secs: f64,
    /// Bound on joining each worker after termination.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: f64,
}

fn default_coordinator_update_period_secs() -> f64 {
    10.0
}

fn default_worker_update_period_secs() -> f64 {
    5.0
}

fn default_join_timeout_secs() -> f64 {
    300.0
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            coordinator_update_period_secs: default_coordinator_update_period_secs(),
            worker_update_period_secs: default_worker_update_period_secs(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

impl ActorConfig {
    /// Uniform short periods, convenient for tests and small problems.
    pub fn with_periods(coordinator_secs: f64, worker_secs: f64) -> Self {
        Self {
            coordinator_update_period_secs: coordinator_secs,
            worker_update_period_secs: worker_secs,
            ..Self::default()
        }
    }

    /// Coordinator check interval.
    pub fn coordinator_period(&self) -> Result<Duration, DvalError> {
        seconds(
            "coordinator_update_period_secs",
            self.coordinator_update_period_secs,
        )
    }

    /// Worker flush interval.
    pub fn worker_period(&self) -> Result<Duration, DvalError> {
        seconds("worker_update_period_secs", self.worker_update_period_secs)
    }

    /// Join bound per worker.
    pub fn join_timeout(&self) -> Result<Duration, DvalError> {
        seconds("join_timeout_secs", self.join_timeout_secs)
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, DvalError> {
    if secs.is_finite() && secs >= 0.0 {
        Ok(Duration::from_secs_f64(secs))
    } else {
        Err(DvalError::Config(
            ErrorInfo::new(
                "invalid-duration",
                format!("{field} must be a finite, non-negative number of seconds"),
            )
            .with_context(field, secs),
        ))
    }
}
