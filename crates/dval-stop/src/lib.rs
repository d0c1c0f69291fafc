#![deny(missing_docs)]
#![doc = "Stopping criteria for Monte Carlo valuation: stateful predicates over a running result, composable with Kleene `&`, `|` and `!`."]

pub mod confidence;
pub mod config;
pub mod counts;
pub mod criterion;
pub mod history;
pub mod stderr;
pub mod time;

pub use confidence::ConfidenceIntervalSeparation;
pub use config::CriterionSpec;
pub use counts::{MaxChecks, MaxUpdates, MinUpdates};
pub use criterion::{make_criterion, mask_fraction, CompletionFn, Criterion, StoppingCriterion};
pub use history::HistoryDeviation;
pub use stderr::{AbsoluteStandardError, DEFAULT_BURN_IN};
pub use time::MaxTime;
