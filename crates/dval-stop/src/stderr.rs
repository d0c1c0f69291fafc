//! Absolute standard-error threshold.

use dval_core::{DvalError, ErrorInfo, Status, ValuationResult};

use crate::criterion::{mask_fraction, StoppingCriterion};

pub(crate) fn check_fraction(fraction: f64) -> Result<f64, DvalError> {
    if fraction > 0.0 && fraction <= 1.0 {
        Ok(fraction)
    } else {
        Err(DvalError::Config(
            ErrorInfo::new("fraction-out-of-range", "fraction must be in (0, 1]")
                .with_context("fraction", fraction),
        ))
    }
}

/// Default number of updates before an index may count as converged.
pub const DEFAULT_BURN_IN: u64 = 0;

/// Converges once a `fraction` of indices has standard error below `threshold`.
///
/// With a positive `burn_in` an index only qualifies after that many
/// updates, so that a lone observation with zero variance does not read as
/// converged.
#[derive(Debug, Clone)]
pub struct AbsoluteStandardError {
    threshold: f64,
    fraction: f64,
    burn_in: u64,
    converged: Vec<bool>,
}

impl AbsoluteStandardError {
    /// Creates the criterion without burn-in.
    pub fn new(threshold: f64, fraction: f64) -> Result<Self, DvalError> {
        Self::with_burn_in(threshold, fraction, DEFAULT_BURN_IN)
    }

    /// Creates the criterion with an explicit burn-in.
    pub fn with_burn_in(threshold: f64, fraction: f64, burn_in: u64) -> Result<Self, DvalError> {
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(DvalError::Config(
                ErrorInfo::new("non-positive-threshold", "threshold must be positive")
                    .with_context("threshold", threshold),
            ));
        }
        Ok(Self {
            threshold,
            fraction: check_fraction(fraction)?,
            burn_in,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for AbsoluteStandardError {
    fn name(&self) -> String {
        "AbsoluteStandardError".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        self.converged = result
            .raw_stderr()
            .into_iter()
            .zip(result.raw_counts())
            .map(|(stderr, count)| *count >= self.burn_in && stderr < self.threshold)
            .collect();
        if !self.converged.is_empty() && mask_fraction(&self.converged) >= self.fraction {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    fn completion(&self) -> f64 {
        mask_fraction(&self.converged)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}
