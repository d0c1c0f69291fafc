//! Separation of normal confidence intervals around evenly spread values.

use dval_core::{DvalError, ErrorInfo, Status, ValuationResult};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::criterion::{mask_fraction, StoppingCriterion};
use crate::stderr::check_fraction;

/// Converges once the confidence intervals around the values would not
/// overlap if the values were spread evenly over `values_range`.
///
/// With `m = ceil(fraction * n)` indices required, each interval uses the
/// Bonferroni-corrected level `1 - (1 - alpha)^(1/m)`, and an index
/// qualifies when its standard error is below
/// `values_range / (2 (m - 1) z)`, `z` being the matching two-sided
/// standard normal quantile. A single required index is always separated.
#[derive(Debug, Clone)]
pub struct ConfidenceIntervalSeparation {
    alpha: f64,
    values_range: f64,
    fraction: f64,
    normal: Normal,
    converged: Vec<bool>,
}

impl ConfidenceIntervalSeparation {
    /// Creates the criterion. `alpha` must lie in `(0, 1)` and `values_range`
    /// must be positive. Twice the total utility is a reasonable range.
    pub fn new(alpha: f64, values_range: f64, fraction: f64) -> Result<Self, DvalError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(DvalError::Config(
                ErrorInfo::new("alpha-out-of-range", "alpha must be in (0, 1)")
                    .with_context("alpha", alpha),
            ));
        }
        if values_range.is_nan() || values_range <= 0.0 {
            return Err(DvalError::Config(
                ErrorInfo::new("non-positive-range", "values_range must be positive")
                    .with_context("values_range", values_range),
            ));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|err| DvalError::config("standard-normal", err.to_string()))?;
        Ok(Self {
            alpha,
            values_range,
            fraction: check_fraction(fraction)?,
            normal,
            converged: Vec::new(),
        })
    }

    /// Largest standard error an index may have when `required` indices
    /// must be separated.
    pub fn bound(&self, required: usize) -> f64 {
        if required <= 1 {
            return f64::INFINITY;
        }
        let m = required as f64;
        let level = 1.0 - (1.0 - self.alpha).powf(1.0 / m);
        let z = self.normal.inverse_cdf(1.0 - level / 2.0);
        self.values_range / (2.0 * (m - 1.0) * z)
    }
}

impl StoppingCriterion for ConfidenceIntervalSeparation {
    fn name(&self) -> String {
        "ConfidenceIntervalSeparation".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        let required = (self.fraction * result.len() as f64).ceil() as usize;
        let bound = self.bound(required);
        self.converged = result
            .raw_stderr()
            .into_iter()
            .map(|stderr| stderr.abs() < bound)
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
