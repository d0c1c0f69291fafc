//! Helpers shared by the samplers.

use dval_core::{DvalError, ErrorInfo, Utility, ValuationResult};

/// Rejects utilities without data indices.
pub(crate) fn require_indices<U: Utility + ?Sized>(u: &U) -> Result<(), DvalError> {
    if u.indices().is_empty() {
        return Err(DvalError::Config(
            ErrorInfo::new("empty-utility", "the utility has no data indices to value")
                .with_hint("build the utility over at least one index"),
        ));
    }
    Ok(())
}

/// `(index, name)` pairs, the inputs of chunked map-reduce samplers.
pub(crate) type Labelled = Vec<(usize, Option<String>)>;

/// Labelled indices of the utility.
pub(crate) fn labelled_indices<U: Utility + ?Sized>(u: &U) -> Labelled {
    let names = u.names();
    u.indices()
        .iter()
        .enumerate()
        .map(|(pos, &idx)| (idx, names.and_then(|names| names.get(pos).cloned())))
        .collect()
}

/// Splits labelled indices back into indices and (all-or-nothing) names.
pub(crate) fn split_labels(chunk: &[(usize, Option<String>)]) -> (Vec<usize>, Option<Vec<String>>) {
    let indices = chunk.iter().map(|(idx, _)| *idx).collect();
    let names = chunk.iter().map(|(_, name)| name.clone()).collect();
    (indices, names)
}

/// Folds partial results with the merge operator.
pub(crate) fn merge_all(parts: Vec<ValuationResult>) -> Result<ValuationResult, DvalError> {
    parts
        .iter()
        .try_fold(ValuationResult::empty(), |acc, part| acc.try_merge(part))
}

/// The single reduced value of a one-run map-reduce job.
pub(crate) fn single_run<R>(mut runs: Vec<R>) -> Result<R, DvalError> {
    runs.pop()
        .ok_or_else(|| DvalError::backend("no-runs", "map-reduce job produced no output"))
}

/// `u(S ∪ {i}) - u(S)`.
pub(crate) fn marginal<U: Utility + ?Sized>(u: &U, subset: &[usize], index: usize) -> f64 {
    let without = u.evaluate(subset);
    let mut with = Vec::with_capacity(subset.len() + 1);
    with.extend_from_slice(subset);
    with.push(index);
    u.evaluate(&with) - without
}
