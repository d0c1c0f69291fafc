//! Relative change of values over a sliding window of checks.

use std::collections::VecDeque;

use dval_core::{DvalError, ErrorInfo, Status, ValuationResult};

use crate::criterion::{mask_fraction, StoppingCriterion};
use crate::stderr::check_fraction;

/// Converges when values stop moving relative to `n_steps` checks ago.
///
/// Each check records the current values. Over the indices updated more than
/// `n_steps` times, the mean of `|v_now - v_then| / |v_now|` (the plain
/// difference where `v_now` is zero) is compared with `rtol`. When it is
/// below, those indices are marked converged, either accumulating with
/// previous marks (`pin_converged`) or replacing them. The criterion
/// converges once at least `fraction` of all indices are marked.
#[derive(Debug, Clone)]
pub struct HistoryDeviation {
    n_steps: usize,
    rtol: f64,
    fraction: f64,
    pin_converged: bool,
    memory: Vec<VecDeque<f64>>,
    converged: Vec<bool>,
}

impl HistoryDeviation {
    /// Creates the criterion with `fraction = 1` and pinning enabled.
    pub fn new(n_steps: usize, rtol: f64) -> Result<Self, DvalError> {
        Self::with_options(n_steps, rtol, 1.0, true)
    }

    /// Creates the criterion with every option explicit.
    pub fn with_options(
        n_steps: usize,
        rtol: f64,
        fraction: f64,
        pin_converged: bool,
    ) -> Result<Self, DvalError> {
        if n_steps < 1 {
            return Err(DvalError::config("invalid-steps", "n_steps must be at least 1"));
        }
        if rtol.is_nan() || rtol <= 0.0 || rtol >= 1.0 {
            return Err(DvalError::Config(
                ErrorInfo::new("rtol-out-of-range", "rtol must be in (0, 1)")
                    .with_context("rtol", rtol),
            ));
        }
        Ok(Self {
            n_steps,
            rtol,
            fraction: check_fraction(fraction)?,
            pin_converged,
            memory: Vec::new(),
            converged: Vec::new(),
        })
    }

    fn reset(&mut self, len: usize) {
        self.memory = vec![VecDeque::from(vec![f64::INFINITY; self.n_steps + 1]); len];
        self.converged = vec![false; len];
    }
}

impl StoppingCriterion for HistoryDeviation {
    fn name(&self) -> String {
        "HistoryDeviation".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        if self.memory.len() != result.len() {
            self.reset(result.len());
        }
        for (window, value) in self.memory.iter_mut().zip(result.raw_values()) {
            window.pop_front();
            window.push_back(*value);
        }

        let eligible: Vec<bool> = result
            .raw_counts()
            .iter()
            .map(|count| *count as usize > self.n_steps)
            .collect();
        let quotients: Vec<f64> = self
            .memory
            .iter()
            .zip(&eligible)
            .filter(|(_, eligible)| **eligible)
            .map(|(window, _)| {
                let current = window.back().copied().unwrap_or(f64::INFINITY);
                let saved = window.front().copied().unwrap_or(f64::INFINITY);
                let diff = (current - saved).abs();
                if current != 0.0 {
                    diff / current.abs()
                } else {
                    diff
                }
            })
            .collect();
        if quotients.is_empty() {
            return Status::Pending;
        }

        let mean = quotients.iter().sum::<f64>() / quotients.len() as f64;
        if mean < self.rtol {
            for (mark, eligible) in self.converged.iter_mut().zip(&eligible) {
                *mark = *eligible || (self.pin_converged && *mark);
            }
            if mask_fraction(&self.converged) >= self.fraction {
                return Status::Converged;
            }
        }
        Status::Pending
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
