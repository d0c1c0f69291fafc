//! Numerical helpers: running moments, moment combination and subset sampling.

use rand::Rng;

/// Negative merged variances below this value are reported as numerical bugs.
pub const NEGATIVE_VARIANCE_TOLERANCE: f64 = 1e-6;

/// Absorbs one observation into a running mean and population variance.
///
/// With prior mean `x`, variance `v` and count `n`, the new observation `y`
/// yields `x' = x + (y - x) / (n + 1)` and
/// `v' = (n v + (y - x)(y - x')) / (n + 1)`.
pub fn running_moments(mean: f64, variance: f64, count: u64, new_value: f64) -> (f64, f64) {
    let new_count = (count + 1) as f64;
    let delta = new_value - mean;
    let new_mean = mean + delta / new_count;
    let new_variance = (count as f64 * variance + delta * (new_value - new_mean)) / new_count;
    (new_mean, new_variance)
}

/// Result of combining the moments of two disjoint samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedMoments {
    /// Combined number of observations.
    pub count: u64,
    /// Combined mean.
    pub mean: f64,
    /// Combined population variance, never negative.
    pub variance: f64,
    /// Raw negative variance that was clamped to zero, if any.
    pub clamped: Option<f64>,
}

impl MergedMoments {
    /// Whether clamping hid a negative variance larger than floating-point noise.
    pub fn clamped_beyond_tolerance(&self) -> bool {
        self.clamped
            .map(|raw| raw < -NEGATIVE_VARIANCE_TOLERANCE)
            .unwrap_or(false)
    }
}

/// Combines `(count, mean, variance)` of two samples via their second moments.
///
/// Exact for any partition of the observations. Two empty samples combine to
/// a zero mean and variance.
pub fn combine_moments(
    n: u64,
    mean_n: f64,
    var_n: f64,
    m: u64,
    mean_m: f64,
    var_m: f64,
) -> MergedMoments {
    let count = n + m;
    if count == 0 {
        return MergedMoments {
            count,
            mean: 0.0,
            variance: 0.0,
            clamped: None,
        };
    }
    let (nf, mf, total) = (n as f64, m as f64, count as f64);
    let mean = (nf * mean_n + mf * mean_m) / total;
    let raw = (nf * (var_n + mean_n * mean_n) + mf * (var_m + mean_m * mean_m)) / total
        - mean * mean;
    let (variance, clamped) = if raw < 0.0 { (0.0, Some(raw)) } else { (raw, None) };
    MergedMoments {
        count,
        mean,
        variance,
        clamped,
    }
}

/// Samples a subset of `elements`, including each one independently with probability `q`.
pub fn random_subset<R: Rng + ?Sized>(elements: &[usize], q: f64, rng: &mut R) -> Vec<usize> {
    let q = q.clamp(0.0, 1.0);
    elements
        .iter()
        .copied()
        .filter(|_| rng.gen::<f64>() < q)
        .collect()
}

/// Natural logarithm of the binomial coefficient `C(n, k)`.
pub fn ln_binomial(n: u64, k: u64) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let k = k.min(n - k);
    (0..k)
        .map(|i| ((n - i) as f64).ln() - ((i + 1) as f64).ln())
        .sum()
}

/// `num` evenly spaced points over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|idx| start + idx as f64 * step).collect()
        }
    }
}
