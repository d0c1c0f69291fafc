//! Monte Carlo Least-Core values through an external linear-program solver.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dval_core::numeric::random_subset;
use dval_core::{DvalError, ErrorInfo, ResultExtension, Status, Utility, ValuationResult};
use dval_parallel::{MapReduceJob, RemoteExecutor};
use tracing::{debug, warn};

use crate::config::ValuationConfig;
use crate::sampling::{require_indices, single_run};

/// Algorithm tag of [`montecarlo_least_core`].
pub const LEAST_CORE_ALGORITHM: &str = "montecarlo_least_core";

/// `minimize c·x` subject to `A_eq x = b_eq`, `A_ub x <= b_ub` and per-variable bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
    /// Objective coefficients.
    pub objective: Vec<f64>,
    /// Equality constraint rows.
    pub a_eq: Vec<Vec<f64>>,
    /// Equality right-hand sides.
    pub b_eq: Vec<f64>,
    /// Upper-bound constraint rows.
    pub a_ub: Vec<Vec<f64>>,
    /// Upper-bound right-hand sides.
    pub b_ub: Vec<f64>,
    /// `(lower, upper)` per variable; `None` is unbounded.
    pub bounds: Vec<(Option<f64>, Option<f64>)>,
}

/// Solver seam. Implementations return the optimal point or an error when
/// the program is infeasible or the solver gave up.
pub trait LinearProgramSolver: Send + Sync {
    /// Solves `problem`.
    fn solve(&self, problem: &LinearProgram) -> Result<Vec<f64>, DvalError>;
}

/// One sampled coalition and its utility.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledSubset {
    /// Members of the coalition.
    pub subset: Vec<usize>,
    /// `u(subset)`.
    pub utility: f64,
}

/// Builds the least-core program over `n = indices.len()` payoffs plus the
/// subsidy `e` (last variable):
///
/// minimise `e` subject to `Σ x = u(N)`, `Σ_{i∈S} x_i + e >= u(S) - ε` for
/// every sample and `e >= 0`. Rows with NaN utility are dropped, duplicate
/// coalitions keep their first occurrence.
pub fn least_core_program(
    indices: &[usize],
    samples: &[SampledSubset],
    total_utility: f64,
    epsilon: f64,
) -> LinearProgram {
    let n = indices.len();
    let positions: BTreeMap<usize, usize> =
        indices.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();

    let nan_rows = samples.iter().filter(|s| s.utility.is_nan()).count();
    if nan_rows > 0 {
        warn!(nan_rows, total = samples.len(), "dropping coalitions with NaN utility");
    }

    let mut seen = BTreeSet::new();
    let mut a_ub = Vec::new();
    let mut b_ub = Vec::new();
    for sample in samples.iter().filter(|s| !s.utility.is_nan()) {
        let mut members = vec![false; n];
        for idx in &sample.subset {
            if let Some(&pos) = positions.get(idx) {
                members[pos] = true;
            }
        }
        if !seen.insert(members.clone()) {
            continue;
        }
        let mut row: Vec<f64> = members.iter().map(|&m| if m { -1.0 } else { 0.0 }).collect();
        row.push(-1.0);
        a_ub.push(row);
        b_ub.push(-(sample.utility - epsilon));
    }
    debug!(rows = a_ub.len(), samples = samples.len(), "least-core constraints built");

    let mut objective = vec![0.0; n + 1];
    objective[n] = 1.0;
    let mut eq_row = vec![1.0; n + 1];
    eq_row[n] = 0.0;
    let mut bounds = vec![(None, None); n];
    bounds.push((Some(0.0), None));

    LinearProgram {
        objective,
        a_eq: vec![eq_row],
        b_eq: vec![total_utility],
        a_ub,
        b_ub,
        bounds,
    }
}

/// Approximate Least-Core values from `n_iterations` uniformly sampled coalitions.
///
/// Sampling is split across jobs, the empty coalition is always included
/// and the program is handed to `solver`. A solver failure yields
/// [`Status::Failed`] with NaN values and a NaN subsidy. The subsidy `e`
/// is stored as [`ResultExtension::LeastCore`].
///
/// # Errors
///
/// [`DvalError::Config`] when `n_iterations` is smaller than the number of
/// indices. Requests above `2^n` are clamped with a warning.
pub fn montecarlo_least_core<U, S>(
    u: Arc<U>,
    n_iterations: usize,
    epsilon: f64,
    solver: &S,
    config: &ValuationConfig,
) -> Result<ValuationResult, DvalError>
where
    U: Utility + ?Sized + 'static,
    S: LinearProgramSolver + ?Sized,
{
    require_indices(u.as_ref())?;
    let n = u.indices().len();
    if n_iterations < n {
        return Err(DvalError::Config(
            ErrorInfo::new(
                "too-few-iterations",
                "number of iterations should be at least the number of indices",
            )
            .with_context("n_iterations", n_iterations)
            .with_context("n_indices", n),
        ));
    }
    let mut n_iterations = n_iterations;
    if n < usize::BITS as usize && n_iterations > 1usize << n {
        warn!(n_iterations, n, "more iterations than subsets, clamping to 2^n");
        n_iterations = 1usize << n;
    }

    let backend = config.backend()?;
    let seeds = config.seeds;
    let sampler = Arc::clone(&u);
    let n_jobs = backend.effective_n_jobs(config.n_jobs)?;
    let per_job = (n_iterations / n_jobs).max(1);
    let map = move |_inputs: Vec<()>, job_id: usize| -> Result<Vec<SampledSubset>, DvalError> {
        let mut rng = seeds.rng(job_id as u64);
        Ok((0..per_job)
            .map(|_| {
                let subset = random_subset(sampler.indices(), 0.5, &mut rng);
                let utility = sampler.evaluate(&subset);
                SampledSubset { subset, utility }
            })
            .collect())
    };
    let reduce = |parts: Vec<Vec<SampledSubset>>| -> Result<Vec<SampledSubset>, DvalError> {
        Ok(parts.into_iter().flatten().collect())
    };
    let job = MapReduceJob::new(vec![()], map, reduce, backend, Some(n_jobs as isize))?;

    let mut samples = vec![SampledSubset {
        subset: Vec::new(),
        utility: u.evaluate(&[]),
    }];
    samples.extend(single_run(job.run(1)?)?);
    let problem = least_core_program(u.indices(), &samples, u.evaluate(u.indices()), epsilon);

    let (values, subsidy, status) = match solver.solve(&problem) {
        Ok(solution) if solution.len() == n + 1 => {
            (solution[..n].to_vec(), solution[n], Status::Converged)
        }
        Ok(solution) => {
            warn!(expected = n + 1, got = solution.len(), "solver returned a malformed solution");
            (vec![f64::NAN; n], f64::NAN, Status::Failed)
        }
        Err(err) => {
            warn!(error = %err, "least-core program could not be solved");
            (vec![f64::NAN; n], f64::NAN, Status::Failed)
        }
    };

    let mut builder = ValuationResult::builder(values)
        .variances(vec![0.0; n])
        .counts(vec![1; n])
        .indices(u.indices().to_vec())
        .algorithm(LEAST_CORE_ALGORITHM)
        .status(status)
        .extension(ResultExtension::LeastCore { subsidy });
    if let Some(names) = u.names() {
        builder = builder.names(names.to_vec());
    }
    builder.build()
}
