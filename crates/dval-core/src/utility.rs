//! The utility abstraction consumed by every valuation sampler.

use std::fmt;
use std::sync::Arc;

/// A set function `u(S)` over the data indices of a learning problem.
///
/// Implementations are shared between jobs and worker threads, so they must
/// be `Send + Sync`. A utility may return NaN for subsets it cannot score;
/// samplers discard such evaluations.
pub trait Utility: Send + Sync {
    /// The full set of data indices `N`.
    fn indices(&self) -> &[usize];

    /// Optional names for the indices, aligned with [`Utility::indices`].
    fn names(&self) -> Option<&[String]> {
        None
    }

    /// Scores the subset `subset` of [`Utility::indices`].
    fn evaluate(&self, subset: &[usize]) -> f64;
}

impl<U: Utility + ?Sized> Utility for Arc<U> {
    fn indices(&self) -> &[usize] {
        (**self).indices()
    }

    fn names(&self) -> Option<&[String]> {
        (**self).names()
    }

    fn evaluate(&self, subset: &[usize]) -> f64 {
        (**self).evaluate(subset)
    }
}

type ScoreFn = dyn Fn(&[usize]) -> f64 + Send + Sync;

/// A [`Utility`] backed by a closure.
#[derive(Clone)]
pub struct FnUtility {
    indices: Vec<usize>,
    names: Option<Vec<String>>,
    score: Arc<ScoreFn>,
}

impl FnUtility {
    /// Wraps `score` as a utility over `indices`.
    pub fn new<F>(indices: Vec<usize>, score: F) -> Self
    where
        F: Fn(&[usize]) -> f64 + Send + Sync + 'static,
    {
        Self {
            indices,
            names: None,
            score: Arc::new(score),
        }
    }

    /// Attaches names to the indices.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }
}

impl fmt::Debug for FnUtility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUtility")
            .field("indices", &self.indices)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl Utility for FnUtility {
    fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    fn evaluate(&self, subset: &[usize]) -> f64 {
        (self.score)(subset)
    }
}
