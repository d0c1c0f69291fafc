#![deny(missing_docs)]
#![doc = "Monte Carlo data valuation: permutation, truncated, combinatorial and Owen sampling of Shapley values, and sampled Least-Core values."]

pub mod actors;
pub mod combinatorial;
pub mod config;
pub mod least_core;
pub mod owen;
pub mod permutation;
mod sampling;
pub mod shapley;
pub mod truncation;

pub use actors::{
    run_shapley_actors, truncated_montecarlo_shapley, ShapleyWorker, TRUNCATED_ALGORITHM,
};
pub use combinatorial::{
    combinatorial_montecarlo_shapley, combinatorial_weight, COMBINATORIAL_ALGORITHM,
};
pub use config::{OwenSettings, SeedPolicy, ValuationConfig};
pub use least_core::{
    least_core_program, montecarlo_least_core, LinearProgram, LinearProgramSolver,
    SampledSubset, LEAST_CORE_ALGORITHM,
};
pub use owen::{owen_sampling_shapley, trapezoid, OwenMethod};
pub use permutation::{permutation_montecarlo_shapley, permutation_unit, PERMUTATION_ALGORITHM};
pub use shapley::{compute_shapley_values, ShapleyMode};
pub use truncation::{LowMarginalTruncation, NoTruncation, TruncationPolicy, TruncationSpec};
