//! The stopping-criterion contract and its Kleene composition.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use dval_core::{Status, ValuationResult};
use tracing::warn;

/// A stateful convergence predicate over a [`ValuationResult`].
///
/// Implementations keep a per-index mask of converged indices in storage
/// order of the results they are shown. They must be clonable through
/// [`StoppingCriterion::clone_box`] so that independent jobs can each run a
/// private copy.
pub trait StoppingCriterion: Send + Sync + fmt::Debug {
    /// Diagnostic name.
    fn name(&self) -> String;

    /// Evaluates the criterion, updating internal state.
    fn check(&mut self, result: &ValuationResult) -> Status;

    /// Progress estimate in `[0, 1]`.
    fn completion(&self) -> f64;

    /// Per-index convergence mask from the last check.
    fn converged(&self) -> Vec<bool>;

    /// Clones the criterion behind a fresh box.
    fn clone_box(&self) -> Box<dyn StoppingCriterion>;
}

/// Fraction of `true` entries, zero for an empty mask.
pub fn mask_fraction(mask: &[bool]) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|c| **c).count() as f64 / mask.len() as f64
}

/// A boxed criterion plus the opt-in contract of writing its status back
/// into the result it evaluates.
///
/// `&`, `|` and `!` build composite criteria. Both operands of a binary
/// composite are always evaluated, so stateful children (such as
/// [`crate::MaxChecks`]) advance in lockstep.
#[derive(Debug)]
pub struct Criterion {
    inner: Box<dyn StoppingCriterion>,
    modify_result: bool,
}

impl Clone for Criterion {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
            modify_result: self.modify_result,
        }
    }
}

impl Criterion {
    /// Wraps a concrete criterion; results are modified by default.
    pub fn new<C: StoppingCriterion + 'static>(criterion: C) -> Self {
        Self {
            inner: Box::new(criterion),
            modify_result: true,
        }
    }

    /// Sets whether [`Criterion::evaluate`] writes the status into the result.
    pub fn with_modify_result(mut self, modify_result: bool) -> Self {
        self.modify_result = modify_result;
        self
    }

    /// Whether evaluation writes the status into the result.
    pub fn modifies_result(&self) -> bool {
        self.modify_result
    }

    /// Evaluates without touching the result.
    pub fn check(&mut self, result: &ValuationResult) -> Status {
        if result.is_empty() {
            warn!(
                criterion = %self.inner.name(),
                "checked an empty result, the utility may be returning invalid numbers"
            );
        }
        self.inner.check(result)
    }

    /// Evaluates and, if enabled, stores the status into `result`.
    pub fn evaluate(&mut self, result: &mut ValuationResult) -> Status {
        let status = self.check(result);
        if self.modify_result {
            result.set_status(status);
        }
        status
    }

    /// Progress estimate in `[0, 1]`.
    pub fn completion(&self) -> f64 {
        self.inner.completion()
    }

    /// Per-index convergence mask from the last check.
    pub fn converged(&self) -> Vec<bool> {
        self.inner.converged()
    }

    /// Diagnostic name.
    pub fn name(&self) -> String {
        self.inner.name()
    }
}

impl<C: StoppingCriterion + 'static> From<C> for Criterion {
    fn from(criterion: C) -> Self {
        Criterion::new(criterion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Binary {
    connective: Connective,
    left: Criterion,
    right: Criterion,
}

fn combine_masks(left: Vec<bool>, right: Vec<bool>, op: fn(bool, bool) -> bool) -> Vec<bool> {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right,
        (_, true) => left,
        _ => left.into_iter().zip(right).map(|(a, b)| op(a, b)).collect(),
    }
}

impl StoppingCriterion for Binary {
    fn name(&self) -> String {
        let word = match self.connective {
            Connective::And => "AND",
            Connective::Or => "OR",
        };
        format!(
            "Composite StoppingCriterion: {} {word} {}",
            self.left.name(),
            self.right.name()
        )
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        let left = self.left.inner.check(result);
        let right = self.right.inner.check(result);
        match self.connective {
            Connective::And => left & right,
            Connective::Or => left | right,
        }
    }

    fn completion(&self) -> f64 {
        let (left, right) = (self.left.completion(), self.right.completion());
        match self.connective {
            Connective::And => left.min(right),
            Connective::Or => left.max(right),
        }
    }

    fn converged(&self) -> Vec<bool> {
        let op: fn(bool, bool) -> bool = match self.connective {
            Connective::And => |a, b| a && b,
            Connective::Or => |a, b| a || b,
        };
        combine_masks(self.left.converged(), self.right.converged(), op)
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
struct Negation {
    inner: Criterion,
}

impl StoppingCriterion for Negation {
    fn name(&self) -> String {
        format!("Composite StoppingCriterion: NOT {}", self.inner.name())
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        !self.inner.inner.check(result)
    }

    fn completion(&self) -> f64 {
        1.0 - self.inner.completion()
    }

    fn converged(&self) -> Vec<bool> {
        self.inner.converged().into_iter().map(|c| !c).collect()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

fn binary(connective: Connective, left: Criterion, right: Criterion) -> Criterion {
    let modify_result = left.modify_result || right.modify_result;
    Criterion::new(Binary {
        connective,
        left,
        right,
    })
    .with_modify_result(modify_result)
}

impl BitAnd for Criterion {
    type Output = Criterion;

    fn bitand(self, rhs: Criterion) -> Criterion {
        binary(Connective::And, self, rhs)
    }
}

impl BitOr for Criterion {
    type Output = Criterion;

    fn bitor(self, rhs: Criterion) -> Criterion {
        binary(Connective::Or, self, rhs)
    }
}

impl Not for Criterion {
    type Output = Criterion;

    fn not(self) -> Criterion {
        let modify_result = self.modify_result;
        Criterion::new(Negation { inner: self }).with_modify_result(modify_result)
    }
}

type CheckFn = dyn Fn(&ValuationResult) -> Status + Send + Sync;
/// Shared completion closure accepted by [`make_criterion`].
pub type CompletionFn = dyn Fn() -> f64 + Send + Sync;

#[derive(Clone)]
struct FnCriterion {
    name: String,
    check: Arc<CheckFn>,
    completion: Option<Arc<CompletionFn>>,
}

impl fmt::Debug for FnCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCriterion")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl StoppingCriterion for FnCriterion {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn check(&mut self, result: &ValuationResult) -> Status {
        (self.check)(result)
    }

    fn completion(&self) -> f64 {
        self.completion
            .as_ref()
            .map(|completion| completion().clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    fn converged(&self) -> Vec<bool> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn StoppingCriterion> {
        Box::new(self.clone())
    }
}

/// Builds a criterion from a check closure and an optional completion closure.
///
/// Closure-backed criteria do not track a per-index mask; their
/// [`Criterion::converged`] is empty.
pub fn make_criterion<F>(
    name: impl Into<String>,
    check: F,
    completion: Option<Arc<CompletionFn>>,
) -> Criterion
where
    F: Fn(&ValuationResult) -> Status + Send + Sync + 'static,
{
    Criterion::new(FnCriterion {
        name: name.into(),
        check: Arc::new(check),
        completion,
    })
}
