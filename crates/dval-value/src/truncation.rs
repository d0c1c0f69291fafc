//! Truncation of permutation passes once marginal contributions vanish.

use std::fmt;
use std::sync::Arc;

use dval_core::{DvalError, ErrorInfo, Utility};
use serde::{Deserialize, Serialize};

/// Decides, position by position, whether the rest of a permutation may be
/// skipped. Skipped positions are recorded with a zero marginal.
pub trait TruncationPolicy: Send + Sync + fmt::Debug {
    /// Label used in logs.
    fn name(&self) -> String;

    /// Whether every position after the one that produced `marginal` is skipped.
    fn should_truncate(&self, marginal: f64) -> bool;
}

/// Never truncates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTruncation;

impl TruncationPolicy for NoTruncation {
    fn name(&self) -> String {
        "NoTruncation".to_string()
    }

    fn should_truncate(&self, _marginal: f64) -> bool {
        false
    }
}

/// Truncates once a marginal contribution falls below `tolerance` in
/// absolute value.
///
/// This biases the estimate towards zero for late positions; it pays off
/// when the utility saturates well before the full set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowMarginalTruncation {
    tolerance: f64,
}

impl LowMarginalTruncation {
    /// Fixed tolerance; must be finite and non-negative.
    pub fn new(tolerance: f64) -> Result<Self, DvalError> {
        if tolerance.is_nan() || tolerance < 0.0 || tolerance.is_infinite() {
            return Err(DvalError::Config(
                ErrorInfo::new("invalid-tolerance", "truncation tolerance must be finite and >= 0")
                    .with_context("tolerance", tolerance),
            ));
        }
        Ok(Self { tolerance })
    }

    /// Uses `tolerance` when given, otherwise `|u(N)| / n / 100`.
    pub fn from_utility<U: Utility + ?Sized>(
        u: &U,
        tolerance: Option<f64>,
    ) -> Result<Self, DvalError> {
        if let Some(tolerance) = tolerance {
            return Self::new(tolerance);
        }
        let n = u.indices().len();
        if n == 0 {
            return Self::new(0.0);
        }
        let total = u.evaluate(u.indices());
        if total.is_nan() {
            return Err(DvalError::Config(
                ErrorInfo::new(
                    "nan-total-utility",
                    "cannot derive a truncation tolerance from a NaN total utility",
                )
                .with_hint("pass an explicit tolerance"),
            ));
        }
        Self::new(total.abs() / n as f64 / 100.0)
    }

    /// The tolerance in use.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl TruncationPolicy for LowMarginalTruncation {
    fn name(&self) -> String {
        format!("LowMarginalTruncation(tolerance={})", self.tolerance)
    }

    fn should_truncate(&self, marginal: f64) -> bool {
        marginal.abs() < self.tolerance
    }
}

/// Serializable truncation choice.
///
/// ```yaml
/// type: low_marginal
/// tolerance: 0.001
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TruncationSpec {
    /// [`NoTruncation`].
    #[default]
    Disabled,
    /// [`LowMarginalTruncation`]; the tolerance is derived from the utility when omitted.
    LowMarginal {
        /// Explicit tolerance.
        #[serde(default)]
        tolerance: Option<f64>,
    },
}

impl TruncationSpec {
    /// Builds the policy for utility `u`.
    pub fn build<U: Utility + ?Sized>(
        &self,
        u: &U,
    ) -> Result<Arc<dyn TruncationPolicy>, DvalError> {
        match self {
            TruncationSpec::Disabled => Ok(Arc::new(NoTruncation)),
            TruncationSpec::LowMarginal { tolerance } => {
                Ok(Arc::new(LowMarginalTruncation::from_utility(u, *tolerance)?))
            }
        }
    }
}
