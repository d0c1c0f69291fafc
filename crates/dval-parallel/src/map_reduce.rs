//! Fan-out/fan-in jobs over a [`ParallelBackend`].

use std::fmt;
use std::sync::Arc;

use dval_core::DvalError;
use tracing::debug;

use crate::backend::{ObjectRef, ParallelBackend, RemoteExecutor};

/// Map step: receives its share of the inputs and its job id.
///
/// Job ids are unique across runs: job `j` of run `r` gets `r * n_jobs + j`.
pub type MapFn<I, M> = dyn Fn(Vec<I>, usize) -> Result<M, DvalError> + Send + Sync;

/// Reduce step: folds every map output of one run.
pub type ReduceFn<M, R> = dyn Fn(Vec<M>) -> Result<R, DvalError> + Send + Sync;

/// Splits `inputs` into at most `n_chunks` contiguous chunks whose sizes
/// differ by at most one. Empty input yields a single empty chunk.
pub fn chunkify<I: Clone>(inputs: &[I], n_chunks: usize) -> Vec<Vec<I>> {
    if inputs.is_empty() {
        return vec![Vec::new()];
    }
    let n_chunks = n_chunks.clamp(1, inputs.len());
    let base = inputs.len() / n_chunks;
    let extra = inputs.len() % n_chunks;
    let mut chunks = Vec::with_capacity(n_chunks);
    let mut start = 0;
    for chunk in 0..n_chunks {
        let len = base + usize::from(chunk < extra);
        chunks.push(inputs[start..start + len].to_vec());
        start += len;
    }
    chunks
}

/// A map function, a reduce function and the inputs they run on.
///
/// Each run submits one map task per job and one reduce task over their
/// outputs. With `chunkify_inputs` the inputs are split across jobs;
/// otherwise every job receives all of them (the usual setup for Monte
/// Carlo samplers, where jobs differ only by their seed).
pub struct MapReduceJob<I, M, R> {
    inputs: Vec<I>,
    map: Arc<MapFn<I, M>>,
    reduce: Arc<ReduceFn<M, R>>,
    n_jobs: usize,
    chunkify_inputs: bool,
    backend: ParallelBackend,
}

impl<I, M, R> fmt::Debug for MapReduceJob<I, M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReduceJob")
            .field("n_inputs", &self.inputs.len())
            .field("n_jobs", &self.n_jobs)
            .field("chunkify_inputs", &self.chunkify_inputs)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl<I, M, R> MapReduceJob<I, M, R>
where
    I: Clone + Send + 'static,
    M: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Creates a job; `n_jobs` is resolved through the backend.
    pub fn new<F, G>(
        inputs: Vec<I>,
        map: F,
        reduce: G,
        backend: ParallelBackend,
        n_jobs: Option<isize>,
    ) -> Result<Self, DvalError>
    where
        F: Fn(Vec<I>, usize) -> Result<M, DvalError> + Send + Sync + 'static,
        G: Fn(Vec<M>) -> Result<R, DvalError> + Send + Sync + 'static,
    {
        let n_jobs = backend.effective_n_jobs(n_jobs)?;
        Ok(Self {
            inputs,
            map: Arc::new(map),
            reduce: Arc::new(reduce),
            n_jobs,
            chunkify_inputs: false,
            backend,
        })
    }

    /// Splits inputs across jobs instead of replicating them.
    pub fn chunkify_inputs(mut self, chunkify: bool) -> Self {
        self.chunkify_inputs = chunkify;
        self
    }

    /// Resolved number of jobs per run.
    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    fn job_inputs(&self) -> Vec<Vec<I>> {
        if self.chunkify_inputs {
            chunkify(&self.inputs, self.n_jobs)
        } else {
            vec![self.inputs.clone(); self.n_jobs]
        }
    }

    /// Executes the job `n_runs` times, returning one reduced value per run.
    pub fn run(&self, n_runs: usize) -> Result<Vec<R>, DvalError> {
        let map = Arc::clone(&self.map);
        let remote_map = self
            .backend
            .wrap(move |(chunk, job_id): (Vec<I>, usize)| map(chunk, job_id));
        let reduce = Arc::clone(&self.reduce);
        let remote_reduce = self.backend.wrap(move |outputs: Vec<M>| reduce(outputs));

        let mut results = Vec::with_capacity(n_runs);
        for run in 0..n_runs {
            let handles: Vec<ObjectRef<Result<M, DvalError>>> = self
                .job_inputs()
                .into_iter()
                .enumerate()
                .map(|(job, chunk)| remote_map.call((chunk, run * self.n_jobs + job)))
                .collect();
            debug!(run, n_jobs = handles.len(), "map tasks submitted");
            let outputs = self
                .backend
                .get_all(&handles)?
                .into_iter()
                .collect::<Result<Vec<M>, DvalError>>()?;
            let reduced = self.backend.get(&remote_reduce.call(outputs))??;
            results.push(reduced);
        }
        Ok(results)
    }
}
