//! Wall-clock budget.

use std::time::{Duration, Instant};

use dval_core::{DvalError, ErrorInfo, Status, ValuationResult};

use crate::criterion::StoppingCriterion;

/// Converges once the time elapsed since construction exceeds a budget.
///
/// The clock starts when the criterion is built, not when the first check
/// runs. Clones share the original start instant.
#[derive(Debug, Clone)]
pub struct MaxTime {
    budget: Option<Duration>,
    start: Instant,
    converged: Vec<bool>,
}

impl MaxTime {
    /// Creates the criterion; `None` never converges, non-positive budgets are rejected.
    pub fn new(seconds: Option<f64>) -> Result<Self, DvalError> {
        let budget = match seconds {
            None => None,
            Some(secs) if secs > 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(DvalError::Config(
                    ErrorInfo::new(
                        "non-positive-time",
                        "number of seconds for MaxTime must be positive or None",
                    )
                    .with_context("seconds", secs),
                ))
            }
        };
        Ok(Self {
            budget,
            start: Instant::now(),
            converged: Vec::new(),
        })
    }

    /// Time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl StoppingCriterion for MaxTime {
    fn name(&self) -> String {
        "MaxTime".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        if self.converged.len() != result.len() {
            self.converged = vec![false; result.len()];
        }
        match self.budget {
            Some(budget) if self.start.elapsed() > budget => {
                self.converged.fill(true);
                Status::Converged
            }
            _ => Status::Pending,
        }
    }

    fn completion(&self) -> f64 {
        match self.budget {
            Some(budget) => (self.start.elapsed().as_secs_f64() / budget.as_secs_f64()).min(1.0),
            None => 0.0,
        }
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}
