//! YAML-configurable description of a stopping criterion.

use dval_core::{DvalError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceIntervalSeparation;
use crate::counts::{MaxChecks, MaxUpdates, MinUpdates};
use crate::criterion::Criterion;
use crate::history::HistoryDeviation;
use crate::stderr::{AbsoluteStandardError, DEFAULT_BURN_IN};
use crate::time::MaxTime;

/// Serializable criterion tree, built into a [`Criterion`] with [`CriterionSpec::build`].
///
/// ```yaml
/// type: or
/// criteria:
///   - type: max_updates
///     n_updates: 500
///   - type: history_deviation
///     n_steps: 20
///     rtol: 0.01
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriterionSpec {
    /// See [`MaxChecks`].
    MaxChecks {
        /// Number of checks after which the criterion converges.
        n_checks: Option<u64>,
    },
    /// See [`MaxUpdates`].
    MaxUpdates {
        /// Update count any index must reach.
        n_updates: Option<u64>,
    },
    /// See [`MinUpdates`].
    MinUpdates {
        /// Update count every index must reach.
        n_updates: Option<u64>,
    },
    /// See [`MaxTime`].
    MaxTime {
        /// Wall-clock budget in seconds.
        seconds: Option<f64>,
    },
    /// See [`AbsoluteStandardError`].
    AbsoluteStandardError {
        /// Standard error below which an index counts as converged.
        threshold: f64,
        /// Fraction of indices that must converge.
        #[serde(default = "default_fraction")]
        fraction: f64,
        /// Updates required before an index may converge.
        #[serde(default = "default_burn_in")]
        burn_in: u64,
    },
    /// See [`ConfidenceIntervalSeparation`].
    ConfidenceIntervalSeparation {
        /// Overall confidence level of the intervals.
        alpha: f64,
        /// Largest possible difference between two values.
        values_range: f64,
        /// Fraction of indices that must converge.
        #[serde(default = "default_fraction")]
        fraction: f64,
    },
    /// See [`HistoryDeviation`].
    HistoryDeviation {
        /// Window length in checks.
        n_steps: usize,
        /// Relative tolerance on the mean deviation.
        rtol: f64,
        /// Fraction of indices that must converge.
        #[serde(default = "default_fraction")]
        fraction: f64,
        /// Keep indices marked once they converged.
        #[serde(default = "default_pin_converged")]
        pin_converged: bool,
    },
    /// Kleene conjunction of every listed criterion.
    And {
        /// Operands, at least one.
        criteria: Vec<CriterionSpec>,
    },
    /// Kleene disjunction of every listed criterion.
    Or {
        /// Operands, at least one.
        criteria: Vec<CriterionSpec>,
    },
    /// Kleene negation.
    Not {
        /// Operand.
        criterion: Box<CriterionSpec>,
    },
}

fn default_fraction() -> f64 {
    1.0
}

fn default_burn_in() -> u64 {
    DEFAULT_BURN_IN
}

fn default_pin_converged() -> bool {
    true
}

impl CriterionSpec {
    /// Validates parameters and instantiates the criterion tree.
    pub fn build(&self) -> Result<Criterion, DvalError> {
        let criterion = match self {
            CriterionSpec::MaxChecks { n_checks } => MaxChecks::new(*n_checks)?.into(),
            CriterionSpec::MaxUpdates { n_updates } => MaxUpdates::new(*n_updates)?.into(),
            CriterionSpec::MinUpdates { n_updates } => MinUpdates::new(*n_updates)?.into(),
            CriterionSpec::MaxTime { seconds } => MaxTime::new(*seconds)?.into(),
            CriterionSpec::AbsoluteStandardError {
                threshold,
                fraction,
                burn_in,
            } => AbsoluteStandardError::with_burn_in(*threshold, *fraction, *burn_in)?.into(),
            CriterionSpec::ConfidenceIntervalSeparation {
                alpha,
                values_range,
                fraction,
            } => ConfidenceIntervalSeparation::new(*alpha, *values_range, *fraction)?.into(),
            CriterionSpec::HistoryDeviation {
                n_steps,
                rtol,
                fraction,
                pin_converged,
            } => HistoryDeviation::with_options(*n_steps, *rtol, *fraction, *pin_converged)?
                .into(),
            CriterionSpec::And { criteria } => fold(criteria, "and", |a, b| a & b)?,
            CriterionSpec::Or { criteria } => fold(criteria, "or", |a, b| a | b)?,
            CriterionSpec::Not { criterion } => !criterion.build()?,
        };
        Ok(criterion)
    }

    /// Parses a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, DvalError> {
        serde_yaml::from_str(contents).map_err(|err| {
            DvalError::Serde(ErrorInfo::new("criterion-yaml", err.to_string()))
        })
    }
}

fn fold(
    criteria: &[CriterionSpec],
    connective: &str,
    op: fn(Criterion, Criterion) -> Criterion,
) -> Result<Criterion, DvalError> {
    let mut built = criteria.iter().map(CriterionSpec::build);
    let first = built.next().ok_or_else(|| {
        DvalError::Config(
            ErrorInfo::new("empty-composite", "composite criteria need at least one operand")
                .with_context("connective", connective),
        )
    })??;
    built.try_fold(first, |acc, next| Ok(op(acc, next?)))
}
