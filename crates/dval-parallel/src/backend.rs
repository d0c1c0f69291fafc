//! Remote-executor contract and its two implementations.
//!
//! Tasks never share mutable state: a task's output travels back to the
//! caller over a channel and is exposed through an [`ObjectRef`] handle.
//! The sequential backend runs tasks inline on the calling thread; the
//! distributed backend runs them on a dedicated `rayon` pool.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use dval_core::{DvalError, ErrorInfo};
use tracing::warn;

use crate::config::{BackendKind, ParallelConfig};

type TaskOutput<T> = thread::Result<T>;

struct RefState<T> {
    resolved: OnceLock<Result<T, DvalError>>,
    pending: Mutex<Option<Receiver<TaskOutput<T>>>>,
}

/// Handle to a value that lives in, or is being produced by, a backend.
///
/// Clones share the same slot: once any clone resolves the value, all of
/// them observe it.
pub struct ObjectRef<T> {
    state: Arc<RefState<T>>,
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("resolved", &self.state.resolved.get().is_some())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn settle<T>(output: TaskOutput<T>) -> Result<T, DvalError> {
    output.map_err(|payload| {
        DvalError::Backend(
            ErrorInfo::new("remote-panic", "remote task panicked")
                .with_context("panic", panic_message(payload)),
        )
    })
}

impl<T: Clone> ObjectRef<T> {
    fn from_state(resolved: Option<Result<T, DvalError>>, rx: Option<Receiver<TaskOutput<T>>>) -> Self {
        let cell = OnceLock::new();
        if let Some(resolved) = resolved {
            let _ = cell.set(resolved);
        }
        Self {
            state: Arc::new(RefState {
                resolved: cell,
                pending: Mutex::new(rx),
            }),
        }
    }

    /// A handle to an already available value.
    pub fn ready(value: T) -> Self {
        Self::from_state(Some(Ok(value)), None)
    }

    /// A handle to a task that ran to completion (or panicked) already.
    pub(crate) fn completed(output: TaskOutput<T>) -> Self {
        Self::from_state(Some(settle(output)), None)
    }

    /// A handle whose value will arrive on `rx`.
    pub(crate) fn pending(rx: Receiver<TaskOutput<T>>) -> Self {
        Self::from_state(None, Some(rx))
    }

    /// Whether the value (or its failure) is known without waiting.
    pub fn is_ready(&self) -> bool {
        self.state.resolved.get().is_some()
    }

    /// Waits at most `timeout` (forever when `None`) for the value.
    ///
    /// # Errors
    ///
    /// A retryable [`DvalError::Timeout`] when the bound expires; the handle
    /// stays valid and may be waited on again. [`DvalError::Backend`] when the
    /// task panicked or its channel disconnected.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<T, DvalError> {
        if let Some(resolved) = self.state.resolved.get() {
            return resolved.clone();
        }
        let mut pending = self
            .state
            .pending
            .lock()
            .map_err(|_| DvalError::backend("poisoned-handle", "object handle lock poisoned"))?;
        if let Some(resolved) = self.state.resolved.get() {
            return resolved.clone();
        }
        let Some(rx) = pending.as_ref() else {
            return Err(DvalError::backend(
                "unresolvable-handle",
                "object handle has neither a value nor a producer",
            ));
        };
        let outcome = match timeout {
            Some(bound) => match rx.recv_timeout(bound) {
                Ok(output) => settle(output),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DvalError::Timeout(
                        ErrorInfo::new("get-timeout", "timed out waiting for a remote value")
                            .with_context("timeout_secs", bound.as_secs_f64())
                            .with_hint("retry the call or raise the timeout"),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
            },
            None => rx.recv().map_err(|_| disconnected()).and_then(settle),
        };
        *pending = None;
        let _ = self.state.resolved.set(outcome.clone());
        outcome
    }
}

fn disconnected() -> DvalError {
    DvalError::backend(
        "channel-disconnected",
        "remote task ended without producing a value",
    )
}

/// A callable bound to an executor: every call becomes a remote task.
pub struct RemoteFn<A, R, E> {
    func: Arc<dyn Fn(A) -> R + Send + Sync>,
    executor: E,
}

impl<A, R, E: Clone> Clone for RemoteFn<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            executor: self.executor.clone(),
        }
    }
}

impl<A, R, E> RemoteFn<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
    E: RemoteExecutor,
{
    /// Submits `args` as a task and returns the handle to its output.
    pub fn call(&self, args: A) -> ObjectRef<R> {
        let func = Arc::clone(&self.func);
        self.executor.spawn(move || func(args))
    }
}

/// Minimal contract shared by every execution backend.
pub trait RemoteExecutor: Clone + Send + Sync + 'static {
    /// Stores `value` and returns a handle to it.
    fn put<T: Clone + Send + 'static>(&self, value: T) -> ObjectRef<T> {
        ObjectRef::ready(value)
    }

    /// Resolves a handle using the backend's timeout.
    fn get<T: Clone + Send + 'static>(&self, handle: &ObjectRef<T>) -> Result<T, DvalError>;

    /// Resolves every handle, in order.
    fn get_all<T: Clone + Send + 'static>(
        &self,
        handles: &[ObjectRef<T>],
    ) -> Result<Vec<T>, DvalError> {
        handles.iter().map(|handle| self.get(handle)).collect()
    }

    /// Runs `task` as a remote task.
    fn spawn<R, F>(&self, task: F) -> ObjectRef<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static;

    /// Binds `func` to this executor.
    fn wrap<A, R, F>(&self, func: F) -> RemoteFn<A, R, Self>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        RemoteFn {
            func: Arc::new(func),
            executor: self.clone(),
        }
    }

    /// Resolves a requested job count: `None` or negative means all
    /// available parallelism, zero is rejected.
    fn effective_n_jobs(&self, requested: Option<isize>) -> Result<usize, DvalError>;
}

fn reject_zero_jobs(requested: Option<isize>) -> Result<(), DvalError> {
    if requested == Some(0) {
        return Err(DvalError::Config(
            ErrorInfo::new("zero-jobs", "n_jobs must not be zero")
                .with_hint("use a positive count, or a negative one for all available slots"),
        ));
    }
    Ok(())
}

/// Runs every task inline, in submission order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBackend;

impl RemoteExecutor for SequentialBackend {
    fn get<T: Clone + Send + 'static>(&self, handle: &ObjectRef<T>) -> Result<T, DvalError> {
        handle.wait(None)
    }

    fn spawn<R, F>(&self, task: F) -> ObjectRef<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        ObjectRef::completed(catch_unwind(AssertUnwindSafe(task)))
    }

    fn effective_n_jobs(&self, requested: Option<isize>) -> Result<usize, DvalError> {
        reject_zero_jobs(requested)?;
        Ok(match requested {
            Some(n) if n > 0 => n as usize,
            _ => 1,
        })
    }
}

/// Runs tasks on a dedicated thread pool.
#[derive(Clone)]
pub struct DistributedBackend {
    pool: Arc<rayon::ThreadPool>,
    get_timeout: Option<Duration>,
}

impl fmt::Debug for DistributedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedBackend")
            .field("n_threads", &self.pool.current_num_threads())
            .field("get_timeout", &self.get_timeout)
            .finish()
    }
}

impl DistributedBackend {
    /// Builds a pool of `n_threads` threads (available parallelism when `None`).
    pub fn new(n_threads: Option<usize>, get_timeout: Option<Duration>) -> Result<Self, DvalError> {
        let n_threads = match n_threads {
            Some(0) => {
                return Err(DvalError::config(
                    "zero-workers",
                    "a distributed backend needs at least one thread",
                ))
            }
            Some(n) => n,
            None => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|index| format!("dval-worker-{index}"))
            .build()
            .map_err(|err| DvalError::backend("thread_pool", err.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
            get_timeout,
        })
    }

    /// Number of threads in the pool.
    pub fn n_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Timeout applied by [`RemoteExecutor::get`].
    pub fn get_timeout(&self) -> Option<Duration> {
        self.get_timeout
    }
}

impl RemoteExecutor for DistributedBackend {
    fn get<T: Clone + Send + 'static>(&self, handle: &ObjectRef<T>) -> Result<T, DvalError> {
        handle.wait(self.get_timeout)
    }

    fn spawn<R, F>(&self, task: F) -> ObjectRef<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.pool.spawn(move || {
            let _ = tx.send(catch_unwind(AssertUnwindSafe(task)));
        });
        ObjectRef::pending(rx)
    }

    fn effective_n_jobs(&self, requested: Option<isize>) -> Result<usize, DvalError> {
        reject_zero_jobs(requested)?;
        let available = self.n_threads();
        Ok(match requested {
            Some(n) if n > 0 => {
                let n = n as usize;
                if n > available {
                    warn!(
                        requested = n,
                        available, "more jobs requested than pool threads, clamping"
                    );
                }
                n.min(available)
            }
            _ => available,
        })
    }
}

/// Closed set of execution backends.
#[derive(Debug, Clone)]
pub enum ParallelBackend {
    /// In-process, deterministic.
    Sequential(SequentialBackend),
    /// Thread-pool based.
    Distributed(DistributedBackend),
}

impl Default for ParallelBackend {
    fn default() -> Self {
        ParallelBackend::Sequential(SequentialBackend)
    }
}

impl ParallelBackend {
    /// The sequential backend.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// A distributed backend with `n_threads` threads.
    pub fn distributed(n_threads: Option<usize>) -> Result<Self, DvalError> {
        let timeout = ParallelConfig::default().get_timeout()?;
        Ok(ParallelBackend::Distributed(DistributedBackend::new(
            n_threads, timeout,
        )?))
    }

    /// Builds the backend described by `config`.
    pub fn from_config(config: &ParallelConfig) -> Result<Self, DvalError> {
        match config.backend {
            BackendKind::Sequential => Ok(Self::sequential()),
            BackendKind::Distributed => Ok(ParallelBackend::Distributed(DistributedBackend::new(
                config.n_workers,
                config.get_timeout()?,
            )?)),
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            ParallelBackend::Sequential(_) => BackendKind::Sequential,
            ParallelBackend::Distributed(_) => BackendKind::Distributed,
        }
    }
}

impl RemoteExecutor for ParallelBackend {
    fn put<T: Clone + Send + 'static>(&self, value: T) -> ObjectRef<T> {
        match self {
            ParallelBackend::Sequential(backend) => backend.put(value),
            ParallelBackend::Distributed(backend) => backend.put(value),
        }
    }

    fn get<T: Clone + Send + 'static>(&self, handle: &ObjectRef<T>) -> Result<T, DvalError> {
        match self {
            ParallelBackend::Sequential(backend) => backend.get(handle),
            ParallelBackend::Distributed(backend) => backend.get(handle),
        }
    }

    fn spawn<R, F>(&self, task: F) -> ObjectRef<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        match self {
            ParallelBackend::Sequential(backend) => backend.spawn(task),
            ParallelBackend::Distributed(backend) => backend.spawn(task),
        }
    }

    fn effective_n_jobs(&self, requested: Option<isize>) -> Result<usize, DvalError> {
        match self {
            ParallelBackend::Sequential(backend) => backend.effective_n_jobs(requested),
            ParallelBackend::Distributed(backend) => backend.effective_n_jobs(requested),
        }
    }
}
