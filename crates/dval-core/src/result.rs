//! Mergeable running estimates of per-index values.
//!
//! [`ValuationResult`] stores, for every data index, the running mean of the
//! observations absorbed so far together with their population variance and
//! count. Results produced independently (by different jobs, workers or
//! periods) merge into a result that is statistically identical to a single
//! pass over all observations.
//!
//! Positional access ([`ValuationResult::item`], [`ValuationResult::values`],
//! iteration, ...) follows the current sort order. Index-keyed access
//! ([`ValuationResult::get`], [`ValuationResult::update`]) ignores it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Bound, RangeBounds};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{DvalError, ErrorInfo};
use crate::numeric::{combine_moments, running_moments};
use crate::status::Status;

/// Field used to order a [`ValuationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Order by estimated value.
    #[default]
    Value,
    /// Order by variance of the estimate.
    Variance,
    /// Order by data index.
    Index,
    /// Order by data name (lexicographic).
    Name,
}

/// Algorithm-specific payload carried next to the common statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultExtension {
    /// No extra payload.
    #[default]
    None,
    /// Least-Core allocations: the minimal subsidy `e` found by the program.
    LeastCore {
        /// Least-Core value (the LP's epsilon variable); NaN when the solve failed.
        subsidy: f64,
    },
}

impl ResultExtension {
    /// Whether the extension carries no payload.
    pub fn is_none(&self) -> bool {
        matches!(self, ResultExtension::None)
    }
}

/// Read view of the estimate for one data index.
///
/// Items compare by [`ValueItem::value`] only, using the IEEE total order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueItem {
    /// Index of the datum in the original dataset.
    pub index: usize,
    /// Name of the datum, the stringified index unless provided.
    pub name: String,
    /// Estimated value.
    pub value: f64,
    /// Variance of the estimate, if any.
    pub variance: Option<f64>,
    /// Number of observations absorbed into the estimate.
    pub count: Option<u64>,
}

impl ValueItem {
    /// Standard error of the value, when variance and count are known.
    pub fn stderr(&self) -> Option<f64> {
        match (self.variance, self.count) {
            (Some(variance), Some(count)) => Some((variance / count.max(1) as f64).sqrt()),
            _ => None,
        }
    }
}

impl PartialEq for ValueItem {
    fn eq(&self, other: &Self) -> bool {
        self.value.total_cmp(&other.value).is_eq()
    }
}

impl Eq for ValueItem {}

impl PartialOrd for ValueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.total_cmp(&other.value)
    }
}

/// Running per-index estimates produced by a valuation algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationResult {
    indices: Vec<usize>,
    values: Vec<f64>,
    variances: Vec<f64>,
    counts: Vec<u64>,
    names: Vec<String>,
    positions: BTreeMap<usize, usize>,
    sort_positions: Vec<usize>,
    sort_order: Option<bool>,
    status: Status,
    algorithm: String,
    extension: ResultExtension,
}

/// Builder validating the arrays of a [`ValuationResult`].
#[derive(Debug, Clone)]
pub struct ValuationResultBuilder {
    values: Vec<f64>,
    variances: Option<Vec<f64>>,
    counts: Option<Vec<u64>>,
    indices: Option<Vec<usize>>,
    names: Option<Vec<String>>,
    algorithm: String,
    status: Status,
    extension: ResultExtension,
    sort: Option<(SortKey, bool)>,
}

impl ValuationResultBuilder {
    /// Sets per-value variances (default zero).
    pub fn variances(mut self, variances: Vec<f64>) -> Self {
        self.variances = Some(variances);
        self
    }

    /// Sets per-value update counts (default one).
    pub fn counts(mut self, counts: Vec<u64>) -> Self {
        self.counts = Some(counts);
        self
    }

    /// Sets the data indices (default `0..n`).
    pub fn indices(mut self, indices: Vec<usize>) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Sets the data names (default stringified indices).
    pub fn names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    /// Sets the algorithm tag.
    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    /// Sets the initial status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Attaches an algorithm-specific payload.
    pub fn extension(mut self, extension: ResultExtension) -> Self {
        self.extension = extension;
        self
    }

    /// Sorts the result once built.
    pub fn sorted(mut self, key: SortKey, reverse: bool) -> Self {
        self.sort = Some((key, reverse));
        self
    }

    /// Validates the arrays and builds the result.
    pub fn build(self) -> Result<ValuationResult, DvalError> {
        let len = self.values.len();
        check_len("variances", self.variances.as_ref().map(Vec::len), len)?;
        check_len("counts", self.counts.as_ref().map(Vec::len), len)?;
        check_len("indices", self.indices.as_ref().map(Vec::len), len)?;
        check_len("names", self.names.as_ref().map(Vec::len), len)?;

        let indices = self.indices.unwrap_or_else(|| (0..len).collect());
        let names = self
            .names
            .unwrap_or_else(|| indices.iter().map(|idx| idx.to_string()).collect());
        let mut result = ValuationResult::from_parts(
            indices,
            self.values,
            self.variances.unwrap_or_else(|| vec![0.0; len]),
            self.counts.unwrap_or_else(|| vec![1; len]),
            names,
            self.status,
            self.algorithm,
            self.extension,
        )?;
        if let Some((key, reverse)) = self.sort {
            result.sort(key, reverse);
        }
        Ok(result)
    }
}

fn check_len(field: &str, actual: Option<usize>, expected: usize) -> Result<(), DvalError> {
    match actual {
        Some(actual) if actual != expected => Err(DvalError::Shape(
            ErrorInfo::new(
                "length-mismatch",
                format!("lengths of values and {field} do not match"),
            )
            .with_context("values", expected)
            .with_context(field, actual),
        )),
        _ => Ok(()),
    }
}

impl ValuationResult {
    /// Starts building a result from raw values.
    pub fn builder(values: Vec<f64>) -> ValuationResultBuilder {
        ValuationResultBuilder {
            values,
            variances: None,
            counts: None,
            indices: None,
            names: None,
            algorithm: String::new(),
            status: Status::Pending,
            extension: ResultExtension::None,
            sort: None,
        }
    }

    /// The additive identity: no indices, no algorithm, pending.
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            variances: Vec::new(),
            counts: Vec::new(),
            names: Vec::new(),
            positions: BTreeMap::new(),
            sort_positions: Vec::new(),
            sort_order: None,
            status: Status::Pending,
            algorithm: String::new(),
            extension: ResultExtension::None,
        }
    }

    /// A pre-sized result with zeroed statistics, ready for [`Self::update`].
    pub fn zeros(
        algorithm: impl Into<String>,
        indices: &[usize],
        names: Option<&[String]>,
    ) -> Result<Self, DvalError> {
        let len = indices.len();
        let mut builder = Self::builder(vec![0.0; len])
            .variances(vec![0.0; len])
            .counts(vec![0; len])
            .indices(indices.to_vec())
            .algorithm(algorithm);
        if let Some(names) = names {
            builder = builder.names(names.to_vec());
        }
        builder.build()
    }

    /// A converged result of uniform random values in `[-1, 1]`.
    pub fn from_random<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Self {
        let values: Vec<f64> = (0..size).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        let indices: Vec<usize> = (0..size).collect();
        let names = indices.iter().map(|idx| idx.to_string()).collect();
        Self::assemble(
            indices,
            values,
            vec![0.0; size],
            vec![1; size],
            names,
            Status::Converged,
            "random".to_string(),
            ResultExtension::None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        indices: Vec<usize>,
        values: Vec<f64>,
        variances: Vec<f64>,
        counts: Vec<u64>,
        names: Vec<String>,
        status: Status,
        algorithm: String,
        extension: ResultExtension,
    ) -> Result<Self, DvalError> {
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = indices.iter().find(|idx| !seen.insert(**idx)) {
            return Err(DvalError::Shape(
                ErrorInfo::new("duplicate-index", "data indices must be unique")
                    .with_context("index", duplicate),
            ));
        }
        Ok(Self::assemble(
            indices, values, variances, counts, names, status, algorithm, extension,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        indices: Vec<usize>,
        values: Vec<f64>,
        variances: Vec<f64>,
        counts: Vec<u64>,
        names: Vec<String>,
        status: Status,
        algorithm: String,
        extension: ResultExtension,
    ) -> Self {
        let positions = indices
            .iter()
            .enumerate()
            .map(|(pos, idx)| (*idx, pos))
            .collect();
        let sort_positions = (0..indices.len()).collect();
        Self {
            indices,
            values,
            variances,
            counts,
            names,
            positions,
            sort_positions,
            sort_order: None,
            status,
            algorithm,
            extension,
        }
    }

    /// Number of data indices held.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the result is the empty identity.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sorts positional access by `key`, ascending unless `reverse`.
    ///
    /// Storage is untouched; only the view permutation changes. A reversed
    /// sort is the exact reverse of the ascending one.
    pub fn sort(&mut self, key: SortKey, reverse: bool) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match key {
            SortKey::Value => order.sort_by(|a, b| self.values[*a].total_cmp(&self.values[*b])),
            SortKey::Variance => {
                order.sort_by(|a, b| self.variances[*a].total_cmp(&self.variances[*b]))
            }
            SortKey::Index => order.sort_by_key(|pos| self.indices[*pos]),
            SortKey::Name => order.sort_by(|a, b| self.names[*a].cmp(&self.names[*b])),
        }
        if reverse {
            order.reverse();
        }
        self.sort_positions = order;
        self.sort_order = Some(reverse);
    }

    /// `None` when unsorted, otherwise whether the last sort was descending.
    pub fn sort_order(&self) -> Option<bool> {
        self.sort_order
    }

    fn sorted<T: Clone>(&self, data: &[T]) -> Vec<T> {
        self.sort_positions
            .iter()
            .map(|pos| data[*pos].clone())
            .collect()
    }

    /// Values in sort order.
    pub fn values(&self) -> Vec<f64> {
        self.sorted(&self.values)
    }

    /// Variances in sort order.
    pub fn variances(&self) -> Vec<f64> {
        self.sorted(&self.variances)
    }

    /// Update counts in sort order.
    pub fn counts(&self) -> Vec<u64> {
        self.sorted(&self.counts)
    }

    /// Data indices in sort order.
    pub fn indices(&self) -> Vec<usize> {
        self.sorted(&self.indices)
    }

    /// Data names in sort order.
    pub fn names(&self) -> Vec<String> {
        self.sorted(&self.names)
    }

    /// Standard errors `sqrt(variance / max(1, count))` in sort order.
    pub fn stderr(&self) -> Vec<f64> {
        self.sort_positions
            .iter()
            .map(|pos| stderr_of(self.variances[*pos], self.counts[*pos]))
            .collect()
    }

    /// Values in storage order.
    pub fn raw_values(&self) -> &[f64] {
        &self.values
    }

    /// Variances in storage order.
    pub fn raw_variances(&self) -> &[f64] {
        &self.variances
    }

    /// Update counts in storage order.
    pub fn raw_counts(&self) -> &[u64] {
        &self.counts
    }

    /// Data indices in storage order.
    pub fn raw_indices(&self) -> &[usize] {
        &self.indices
    }

    /// Standard errors in storage order.
    pub fn raw_stderr(&self) -> Vec<f64> {
        self.variances
            .iter()
            .zip(&self.counts)
            .map(|(variance, count)| stderr_of(*variance, *count))
            .collect()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Overwrites the status.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Algorithm tag.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Algorithm-specific payload.
    pub fn extension(&self) -> &ResultExtension {
        &self.extension
    }

    fn item_at(&self, storage: usize) -> ValueItem {
        ValueItem {
            index: self.indices[storage],
            name: self.names[storage].clone(),
            value: self.values[storage],
            variance: Some(self.variances[storage]),
            count: Some(self.counts[storage]),
        }
    }

    /// Item at sort position `position`; negative positions count from the end.
    pub fn item(&self, position: isize) -> Result<ValueItem, DvalError> {
        let len = self.len() as isize;
        let resolved = if position < 0 { position + len } else { position };
        if resolved < 0 || resolved >= len {
            return Err(DvalError::Index(
                ErrorInfo::new(
                    "position-out-of-range",
                    format!("position {position} out of range (0, {len})"),
                )
                .with_context("position", position)
                .with_context("len", len),
            ));
        }
        Ok(self.item_at(self.sort_positions[resolved as usize]))
    }

    /// Items for a range of sort positions, clipped to the result length.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Vec<ValueItem> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(start) => *start,
            Bound::Excluded(start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(end) => end.saturating_add(1),
            Bound::Excluded(end) => *end,
            Bound::Unbounded => len,
        }
        .min(len);
        (start..end.max(start))
            .map(|pos| self.item_at(self.sort_positions[pos]))
            .collect()
    }

    /// Items for an explicit set of sort positions.
    pub fn select(&self, positions: &[isize]) -> Result<Vec<ValueItem>, DvalError> {
        positions.iter().map(|pos| self.item(*pos)).collect()
    }

    /// Iterates over items in sort order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            result: self,
            cursor: 0,
        }
    }

    fn position_of(&self, index: usize) -> Result<usize, DvalError> {
        self.positions.get(&index).copied().ok_or_else(|| {
            DvalError::Index(
                ErrorInfo::new("unknown-index", format!("index {index} not found in result"))
                    .with_context("index", index),
            )
        })
    }

    /// Item for a data index, regardless of sort order.
    pub fn get(&self, index: usize) -> Result<ValueItem, DvalError> {
        let pos = self.position_of(index)?;
        Ok(self.item_at(pos))
    }

    /// Absorbs one observation for data index `index` into its running moments.
    pub fn update(&mut self, index: usize, new_value: f64) -> Result<&mut Self, DvalError> {
        let pos = self.position_of(index)?;
        let (mean, variance) = running_moments(
            self.values[pos],
            self.variances[pos],
            self.counts[pos],
            new_value,
        );
        self.values[pos] = mean;
        self.variances[pos] = variance;
        self.counts[pos] += 1;
        Ok(self)
    }

    /// Combines two results over the union of their indices.
    ///
    /// Counts add up, means are count-weighted and variances combine through
    /// second moments, so the outcome equals a single pass over the
    /// observations of both operands. Statuses combine with `&`. An empty
    /// operand is the identity.
    ///
    /// # Errors
    ///
    /// [`DvalError::Incompatible`] when the algorithm tags differ or an index
    /// present in both operands carries different names.
    pub fn try_merge(&self, other: &ValuationResult) -> Result<ValuationResult, DvalError> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.algorithm != other.algorithm {
            return Err(DvalError::Incompatible(
                ErrorInfo::new(
                    "algorithm-mismatch",
                    "cannot combine results from different algorithms",
                )
                .with_context("left", &self.algorithm)
                .with_context("right", &other.algorithm),
            ));
        }

        let union: BTreeSet<usize> = self
            .indices
            .iter()
            .chain(other.indices.iter())
            .copied()
            .collect();
        let len = union.len();
        let mut indices = Vec::with_capacity(len);
        let mut values = Vec::with_capacity(len);
        let mut variances = Vec::with_capacity(len);
        let mut counts = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);

        for index in union {
            let left = self.positions.get(&index).copied();
            let right = other.positions.get(&index).copied();
            let name = match (left, right) {
                (Some(l), Some(r)) if self.names[l] != other.names[r] => {
                    return Err(DvalError::Incompatible(
                        ErrorInfo::new("name-mismatch", "mismatching names in results")
                            .with_context("index", index)
                            .with_context("left", &self.names[l])
                            .with_context("right", &other.names[r]),
                    ));
                }
                (Some(l), _) => self.names[l].clone(),
                (None, Some(r)) => other.names[r].clone(),
                (None, None) => unreachable!("index drawn from the union of both operands"),
            };
            let (n, xn, vn) = left
                .map(|p| (self.counts[p], self.values[p], self.variances[p]))
                .unwrap_or((0, 0.0, 0.0));
            let (m, xm, vm) = right
                .map(|p| (other.counts[p], other.values[p], other.variances[p]))
                .unwrap_or((0, 0.0, 0.0));
            let merged = combine_moments(n, xn, vn, m, xm, vm);
            if let Some(raw) = merged.clamped {
                if merged.clamped_beyond_tolerance() {
                    warn!(
                        index,
                        variance = raw,
                        "numerical error in variance computation, negative variance clipped to 0"
                    );
                } else {
                    debug!(index, variance = raw, "clipped tiny negative variance to 0");
                }
            }
            indices.push(index);
            values.push(merged.mean);
            variances.push(merged.variance);
            counts.push(merged.count);
            names.push(name);
        }

        let extension = if self.extension.is_none() {
            other.extension
        } else {
            self.extension
        };
        Ok(Self::assemble(
            indices,
            values,
            variances,
            counts,
            names,
            self.status & other.status,
            self.algorithm.clone(),
            extension,
        ))
    }
}

fn stderr_of(variance: f64, count: u64) -> f64 {
    (variance / count.max(1) as f64).sqrt()
}

/// Iterator over the items of a [`ValuationResult`] in sort order.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    result: &'a ValuationResult,
    cursor: usize,
}

impl Iterator for Iter<'_> {
    type Item = ValueItem;

    fn next(&mut self) -> Option<ValueItem> {
        let storage = *self.result.sort_positions.get(self.cursor)?;
        self.cursor += 1;
        Some(self.result.item_at(storage))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.result.len() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ValuationResult {
    type Item = ValueItem;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Default for ValuationResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Merges two results.
///
/// # Panics
///
/// On the incompatibilities reported by [`ValuationResult::try_merge`].
impl Add for ValuationResult {
    type Output = ValuationResult;

    fn add(self, rhs: ValuationResult) -> ValuationResult {
        if self.is_empty() {
            return rhs;
        }
        if rhs.is_empty() {
            return self;
        }
        self.try_merge(&rhs)
            .unwrap_or_else(|err| panic!("cannot merge valuation results: {err}"))
    }
}

impl AddAssign for ValuationResult {
    fn add_assign(&mut self, rhs: ValuationResult) {
        let lhs = std::mem::take(self);
        *self = lhs + rhs;
    }
}

impl fmt::Display for ValuationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ValuationResult(algorithm='{}', status='{}', values={:?}, indices={:?}, counts={:?}",
            self.algorithm,
            self.status,
            self.values()
                .iter()
                .map(|v| format!("{v:.4}"))
                .collect::<Vec<_>>(),
            self.indices(),
            self.counts(),
        )?;
        if let ResultExtension::LeastCore { subsidy } = self.extension {
            write!(f, ", subsidy={subsidy}")?;
        }
        write!(f, ")")
    }
}
