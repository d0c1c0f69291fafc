//! Top-level configuration of a valuation run.

use std::fs;
use std::path::Path;

use dval_core::{DvalError, ErrorInfo, RngHandle};
use dval_parallel::{ActorConfig, ParallelBackend, ParallelConfig};
use dval_stop::{Criterion, CriterionSpec};
use serde::{Deserialize, Serialize};

use crate::truncation::TruncationSpec;

/// How job and worker random streams are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed; `None` seeds every stream from OS entropy.
    #[serde(default)]
    pub master_seed: Option<u64>,
}

impl SeedPolicy {
    /// Reproducible streams derived from `master_seed`.
    pub fn fixed(master_seed: u64) -> Self {
        Self {
            master_seed: Some(master_seed),
        }
    }

    /// The RNG for one job or worker slot.
    pub fn rng(&self, substream: u64) -> RngHandle {
        match self.master_seed {
            Some(seed) => RngHandle::for_substream(seed, substream),
            None => RngHandle::from_entropy(),
        }
    }
}

/// Sample budget of the Owen modes of [`crate::compute_shapley_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwenSettings {
    /// Subsets drawn per point of the `q` grid.
    #[serde(default)]
    pub n_samples: Option<usize>,
    /// Number of points of the `q` grid, at least 2.
    #[serde(default)]
    pub max_q: Option<usize>,
}

/// Everything a sampler needs besides the utility and the stopping rule.
///
/// ```yaml
/// parallel:
///   backend: distributed
///   n_workers: 4
/// actors:
///   coordinator_update_period_secs: 1.0
///   worker_update_period_secs: 0.5
/// seeds:
///   master_seed: 7
/// truncation:
///   type: low_marginal
/// owen:
///   n_samples: 50
///   max_q: 20
/// n_jobs: 4
/// stopping:
///   type: max_updates
///   n_updates: 200
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Backend selection.
    #[serde(default)]
    pub parallel: ParallelConfig,
    /// Coordinator/worker timing.
    #[serde(default)]
    pub actors: ActorConfig,
    /// Seeding of random streams.
    #[serde(default)]
    pub seeds: SeedPolicy,
    /// Truncation used by permutation samplers.
    #[serde(default)]
    pub truncation: TruncationSpec,
    /// Sample budget of the Owen modes.
    #[serde(default)]
    pub owen: OwenSettings,
    /// Requested jobs or workers; resolved through the backend.
    #[serde(default)]
    pub n_jobs: Option<isize>,
    /// Optional stopping criterion.
    #[serde(default)]
    pub stopping: Option<CriterionSpec>,
}

impl ValuationConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, DvalError> {
        serde_yaml::from_str(contents).map_err(|err| {
            DvalError::Serde(ErrorInfo::new("valuation-config-yaml", err.to_string()))
        })
    }

    /// Reads and parses a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DvalError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            DvalError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Constructs the configured backend.
    pub fn backend(&self) -> Result<ParallelBackend, DvalError> {
        ParallelBackend::from_config(&self.parallel)
    }

    /// Builds the configured stopping criterion, if any.
    pub fn stopping_criterion(&self) -> Result<Option<Criterion>, DvalError> {
        self.stopping.as_ref().map(CriterionSpec::build).transpose()
    }
}
