#![deny(missing_docs)]
#![doc = "Execution backends for Monte Carlo valuation: the remote-executor contract, map-reduce jobs and the coordinator/worker protocol."]

pub mod actor;
pub mod backend;
pub mod config;
pub mod map_reduce;

pub use actor::{
    run_actors, ActorOutcome, CancellationToken, Coordinator, UnitOutcome, Worker, WorkerSummary,
};
pub use backend::{
    DistributedBackend, ObjectRef, ParallelBackend, RemoteExecutor, RemoteFn, SequentialBackend,
};
pub use config::{ActorConfig, BackendKind, ParallelConfig};
pub use map_reduce::{chunkify, MapFn, MapReduceJob, ReduceFn};
