//! Criteria driven by counters: number of checks and per-index update counts.

use dval_core::{DvalError, ErrorInfo, Status, ValuationResult};

use crate::criterion::StoppingCriterion;

fn positive(name: &str, value: Option<u64>) -> Result<Option<u64>, DvalError> {
    match value {
        Some(0) => Err(DvalError::Config(
            ErrorInfo::new("non-positive-threshold", format!("{name} must be at least 1 or None"))
                .with_context("value", 0),
        )),
        other => Ok(other),
    }
}

fn ratio(numerator: u64, threshold: Option<u64>) -> f64 {
    match threshold {
        Some(n) => (numerator as f64 / n as f64).min(1.0),
        None => 0.0,
    }
}

/// Converges once it has been checked more than `n_checks` times.
///
/// `None` never converges.
#[derive(Debug, Clone)]
pub struct MaxChecks {
    n_checks: Option<u64>,
    count: u64,
    converged: Vec<bool>,
}

impl MaxChecks {
    /// Creates the criterion; `Some(0)` is rejected.
    pub fn new(n_checks: Option<u64>) -> Result<Self, DvalError> {
        Ok(Self {
            n_checks: positive("n_checks", n_checks)?,
            count: 0,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for MaxChecks {
    fn name(&self) -> String {
        "MaxChecks".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        let Some(n_checks) = self.n_checks else {
            return Status::Pending;
        };
        self.count += 1;
        let done = self.count > n_checks;
        self.converged = vec![done; result.len()];
        if done {
            Status::Converged
        } else {
            Status::Pending
        }
    }

    /// Reaches 1 only on the check that converges, `n_checks + 1`.
    fn completion(&self) -> f64 {
        ratio(self.count, self.n_checks.map(|n| n + 1))
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// Converges once any index has been updated at least `n_updates` times.
///
/// For permutation samplers the maximum count is the number of permutations
/// drawn. `None` never converges.
#[derive(Debug, Clone)]
pub struct MaxUpdates {
    n_updates: Option<u64>,
    last_max: u64,
    converged: Vec<bool>,
}

impl MaxUpdates {
    /// Creates the criterion; `Some(0)` is rejected.
    pub fn new(n_updates: Option<u64>) -> Result<Self, DvalError> {
        Ok(Self {
            n_updates: positive("n_updates", n_updates)?,
            last_max: 0,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for MaxUpdates {
    fn name(&self) -> String {
        "MaxUpdates".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        let Some(n_updates) = self.n_updates else {
            return Status::Pending;
        };
        let counts = result.raw_counts();
        self.converged = counts.iter().map(|c| *c >= n_updates).collect();
        match counts.iter().max() {
            Some(max) => {
                self.last_max = *max;
                if *max >= n_updates {
                    Status::Converged
                } else {
                    Status::Pending
                }
            }
            None => Status::Pending,
        }
    }

    fn completion(&self) -> f64 {
        ratio(self.last_max, self.n_updates)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// Converges once every index has been updated at least `n_updates` times.
#[derive(Debug, Clone)]
pub struct MinUpdates {
    n_updates: Option<u64>,
    last_min: u64,
    converged: Vec<bool>,
}

impl MinUpdates {
    /// Creates the criterion; `Some(0)` is rejected.
    pub fn new(n_updates: Option<u64>) -> Result<Self, DvalError> {
        Ok(Self {
            n_updates: positive("n_updates", n_updates)?,
            last_min: 0,
            converged: Vec::new(),
        })
    }
}

impl StoppingCriterion for MinUpdates {
    fn name(&self) -> String {
        "MinUpdates".to_string()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        let Some(n_updates) = self.n_updates else {
            return Status::Pending;
        };
        let counts = result.raw_counts();
        self.converged = counts.iter().map(|c| *c >= n_updates).collect();
        match counts.iter().min() {
            Some(min) => {
                self.last_min = *min;
                if *min >= n_updates {
                    Status::Converged
                } else {
                    Status::Pending
                }
            }
            None => Status::Pending,
        }
    }

    fn completion(&self) -> f64 {
        ratio(self.last_min, self.n_updates)
    }

    fn converged(&self) -> Vec<bool> {
        self.converged.clone()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}
