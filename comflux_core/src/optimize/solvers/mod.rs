//! Solver backends and the dispatch between them
//!
//! Three backends are available: Clarabel (interior point, LP and QP, always compiled in),
//! OSQP (first order QP, behind the `osqp` feature) and a dual simplex (LP and MILP,
//! behind the `minilp` feature). [`solve`] picks among them according to a
//! [`SolverChoice`] and falls back from the fast backend to the robust one when the fast
//! answer can not be trusted.
use std::fmt::{Display, Formatter};

use cfg_if::cfg_if;
use indexmap::IndexMap;
use log::{debug, warn};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::SolverChoice;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::{OptimizationStatus, ProblemSolution};

pub mod clarabel;

cfg_if! {
    if #[cfg(feature = "osqp")] {
        pub mod osqp;
    }
}

cfg_if! {
    if #[cfg(feature = "minilp")] {
        pub mod simplex;
    }
}

// region Backend
/// The concrete solver backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Clarabel interior point solver
    Clarabel,
    /// OSQP operator splitting solver
    Osqp,
    /// Dual simplex with branch and bound
    Simplex,
}

impl Backend {
    /// Whether the backend was compiled into this build
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Clarabel => true,
            Backend::Osqp => cfg!(feature = "osqp"),
            Backend::Simplex => cfg!(feature = "minilp"),
        }
    }

    pub fn supports_quadratic(&self) -> bool {
        !matches!(self, Backend::Simplex)
    }

    pub fn supports_integer(&self) -> bool {
        matches!(self, Backend::Simplex)
    }

    /// Whether the backend returns vertex solutions
    pub fn is_vertex_seeking(&self) -> bool {
        matches!(self, Backend::Simplex)
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Clarabel => write!(f, "clarabel"),
            Backend::Osqp => write!(f, "osqp"),
            Backend::Simplex => write!(f, "simplex"),
        }
    }
}
// endregion Backend

// region Options
/// Options handed to a single backend call
#[derive(Clone, Debug, PartialEq)]
pub struct SolverOptions {
    /// Absolute tolerance
    pub atol: f64,
    /// Relative tolerance
    pub rtol: f64,
    /// Iteration limit
    pub max_iter: u32,
    /// Whether to let the backend presolve the problem
    pub presolve: bool,
    /// Whether to rescale the problem before solving
    pub equilibrate: bool,
    /// Print backend output
    pub verbose: bool,
    /// Starting point for backends that accept one
    pub warm_start: Option<Vec<f64>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            atol: 1e-6,
            rtol: 1e-6,
            max_iter: 10_000,
            presolve: true,
            equilibrate: true,
            verbose: false,
            warm_start: None,
        }
    }
}
// endregion Options

// region Solver trait
/// Uniform interface over the backends
pub trait Solver {
    /// Which backend this is
    fn backend(&self) -> Backend;

    fn quadratic_objective_capable(&self) -> bool {
        self.backend().supports_quadratic()
    }

    fn integer_variable_capable(&self) -> bool {
        self.backend().supports_integer()
    }

    /// Solve the problem
    ///
    /// Infeasible, unbounded and halted solves are reported through the status of the
    /// returned solution. Errors are reserved for problems the backend can not accept.
    fn solve(&self, problem: &Problem, options: &SolverOptions) -> Result<ProblemSolution, SolverError>;
}

/// Create the solver for a backend
pub fn solver_for(backend: Backend) -> Result<Box<dyn Solver>, SolverError> {
    match backend {
        Backend::Clarabel => Ok(Box::new(clarabel::ClarabelSolver::default())),
        Backend::Osqp => osqp_solver(),
        Backend::Simplex => simplex_solver(),
    }
}

cfg_if! {
    if #[cfg(feature = "osqp")] {
        fn osqp_solver() -> Result<Box<dyn Solver>, SolverError> {
            Ok(Box::new(osqp::OsqpSolver::default()))
        }
    } else {
        fn osqp_solver() -> Result<Box<dyn Solver>, SolverError> {
            Err(SolverError::BackendUnavailable(Backend::Osqp))
        }
    }
}

cfg_if! {
    if #[cfg(feature = "minilp")] {
        fn simplex_solver() -> Result<Box<dyn Solver>, SolverError> {
            Ok(Box::new(simplex::SimplexSolver::default()))
        }
    } else {
        fn simplex_solver() -> Result<Box<dyn Solver>, SolverError> {
            Err(SolverError::BackendUnavailable(Backend::Simplex))
        }
    }
}
// endregion Solver trait

// region Dispatch
/// The backend used for the fast attempt of [`SolverChoice::Fast`] and [`SolverChoice::Auto`]
pub fn fast_backend() -> Backend {
    if Backend::Osqp.is_available() {
        Backend::Osqp
    } else {
        Backend::Clarabel
    }
}

/// Whether a backend answer is good enough to skip the fallback
///
/// The point must be feasible within `atol` absolutely and within `rtol` relative to the
/// magnitude of each bound and row.
fn trusted(problem: &Problem, solution: &ProblemSolution, options: &SolverOptions) -> bool {
    if solution.status != OptimizationStatus::Optimal {
        return false;
    }
    let x = solution.values();
    let violation = problem.max_violation(&x);
    if violation > options.atol {
        debug!(
            "{} solution violates constraints by {:.3e}, not trusted",
            solution.backend, violation
        );
        return false;
    }
    let relative = problem.max_relative_violation(&x);
    if relative > options.rtol {
        debug!(
            "{} solution violates constraints by {:.3e} relative to their scale, not trusted",
            solution.backend, relative
        );
        return false;
    }
    true
}

/// Keep the fast answer when it can be trusted, otherwise solve again with the robust backend
fn accept_or_fallback(
    problem: &Problem,
    fast: Result<ProblemSolution, SolverError>,
    options: &SolverOptions,
) -> Result<ProblemSolution, SolverError> {
    let fast_status = match fast {
        Ok(solution) if trusted(problem, &solution, options) => return Ok(solution),
        Ok(solution) => solution.status,
        Err(SolverError::NonConvex) => return Err(SolverError::NonConvex),
        Err(err) => {
            warn!("osqp failed to set up ({}), using clarabel", err);
            OptimizationStatus::NumericalError
        }
    };
    warn!("osqp returned {}, falling back to clarabel", fast_status);
    solve_robust(problem, options).map_err(|err| match err {
        SolverError::Numerical { mut attempts } => {
            attempts.insert(0, (Backend::Osqp, fast_status));
            SolverError::Numerical { attempts }
        }
        other => other,
    })
}

/// Solve with the robust backend, retrying once with scaling and presolve toggled
fn solve_robust(problem: &Problem, options: &SolverOptions) -> Result<ProblemSolution, SolverError> {
    let solver = solver_for(Backend::Clarabel)?;
    let first = solver.solve(problem, options)?;
    if !first.status.is_numerical_failure() {
        return Ok(first);
    }
    warn!(
        "clarabel returned {}, retrying with equilibration {}",
        first.status,
        if options.equilibrate { "off" } else { "on" }
    );
    let retry_options = SolverOptions {
        equilibrate: !options.equilibrate,
        presolve: !options.presolve,
        ..options.clone()
    };
    let second = solver.solve(problem, &retry_options)?;
    if second.status.is_numerical_failure() {
        return Err(SolverError::Numerical {
            attempts: vec![(Backend::Clarabel, first.status), (Backend::Clarabel, second.status)],
        });
    }
    Ok(second)
}

/// Solve a problem according to the backend choice
///
/// - `Fast` uses OSQP (Clarabel when OSQP is not compiled in)
/// - `Robust` uses Clarabel, retried once with toggled scaling
/// - `Simplex` uses the dual simplex
/// - `Auto` uses the simplex for integer problems, otherwise tries the fast backend and
///   falls back to the robust one unless the fast answer is optimal and feasible within
///   `atol` and `rtol`
///
/// Returns [`SolverError::Numerical`] when every attempted backend failed to converge.
pub fn solve(
    problem: &Problem,
    choice: SolverChoice,
    options: &SolverOptions,
) -> Result<ProblemSolution, SolverError> {
    if problem.has_integer_variables() && choice != SolverChoice::Simplex && choice != SolverChoice::Auto {
        return Err(SolverError::Unsupported(format!(
            "integer variables need the simplex backend, got {:?}",
            choice
        )));
    }
    match choice {
        SolverChoice::Robust => solve_robust(problem, options),
        SolverChoice::Fast => {
            let solution = solver_for(fast_backend())?.solve(problem, options)?;
            if solution.status.is_numerical_failure() {
                return Err(SolverError::Numerical {
                    attempts: vec![(solution.backend, solution.status)],
                });
            }
            Ok(solution)
        }
        SolverChoice::Simplex => {
            let solution = solver_for(Backend::Simplex)?.solve(problem, options)?;
            if solution.status.is_numerical_failure() {
                return Err(SolverError::Numerical {
                    attempts: vec![(Backend::Simplex, solution.status)],
                });
            }
            Ok(solution)
        }
        SolverChoice::Auto => {
            if problem.has_integer_variables() {
                return solve(problem, SolverChoice::Simplex, options);
            }
            if !Backend::Osqp.is_available() {
                return solve_robust(problem, options);
            }
            let fast = solver_for(Backend::Osqp)?;
            accept_or_fallback(problem, fast.solve(problem, options), options)
        }
    }
}
// endregion Dispatch

// region Standard form
/// One linear row `lower <= sum(coef * x) <= upper` with merged duplicate terms
#[derive(Clone, Debug)]
pub(crate) struct Row {
    pub terms: Vec<(usize, f64)>,
    pub lower: f64,
    pub upper: f64,
}

impl Row {
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }
}

/// The problem lowered to `minimize 1/2 x'Px + q'x` over linear rows and variable bounds
///
/// Maximization problems are negated, `sign` records the factor.
#[derive(Clone, Debug)]
pub(crate) struct StandardForm {
    pub n: usize,
    pub sign: f64,
    /// Upper triangle of P as (row, column, value) triplets
    pub p_upper: Vec<(usize, usize, f64)>,
    pub q: Vec<f64>,
    pub rows: Vec<Row>,
    pub var_lower: Vec<f64>,
    pub var_upper: Vec<f64>,
    /// A row without terms excludes zero
    pub trivially_infeasible: bool,
}

impl StandardForm {
    pub fn from_problem(problem: &Problem) -> Result<Self, SolverError> {
        let n = problem.num_variables();
        let sign = match problem.objective().sense() {
            ObjectiveSense::Minimize => 1.,
            ObjectiveSense::Maximize => -1.,
        };
        let mut q = vec![0.; n];
        for (i, c) in problem.objective().linear_terms() {
            q[i] += sign * c;
        }
        let mut p_upper = Vec::new();
        for ((i, j), c) in problem.objective().quadratic_terms() {
            if c == 0. {
                continue;
            }
            // x'Px/2 with P_ii = 2c reproduces c*x_i^2, P_ij = P_ji = c reproduces c*x_i*x_j
            let value = if i == j { 2. * sign * c } else { sign * c };
            if i == j && value < 0. {
                return Err(SolverError::NonConvex);
            }
            p_upper.push((i, j, value));
        }
        let mut rows = Vec::with_capacity(problem.num_constraints());
        let mut trivially_infeasible = false;
        for constraint in problem.constraints() {
            let mut merged: IndexMap<usize, f64> = IndexMap::new();
            for term in constraint.terms() {
                *merged.entry(term.variable).or_insert(0.) += term.coefficient;
            }
            merged.retain(|_, c| *c != 0.);
            let (lower, upper) = constraint.bounds();
            if merged.is_empty() {
                if lower > 0. || upper < 0. {
                    trivially_infeasible = true;
                }
                continue;
            }
            rows.push(Row {
                terms: merged.into_iter().collect(),
                lower,
                upper,
            });
        }
        let (var_lower, var_upper) = problem
            .variables()
            .map(|v| (v.lower_bound, v.upper_bound))
            .unzip();
        Ok(Self {
            n,
            sign,
            p_upper,
            q,
            rows,
            var_lower,
            var_upper,
            trivially_infeasible,
        })
    }

    /// Evaluate the variable vector into a [`ProblemSolution`]
    pub fn solution_from_point(
        problem: &Problem,
        status: OptimizationStatus,
        backend: Backend,
        x: &[f64],
    ) -> ProblemSolution {
        let values = problem
            .variables()
            .map(|v| (v.id.clone(), x.get(v.index()).copied().unwrap_or(0.)))
            .collect();
        ProblemSolution {
            status,
            objective_value: Some(problem.objective().evaluate(x)),
            variable_values: Some(values),
            backend,
            message: None,
        }
    }
}

/// Compress (row, column, value) triplets into CSC arrays (column offsets, row indices,
/// values), summing duplicates
pub(crate) fn compress(
    nrows: usize,
    ncols: usize,
    triplets: &[(usize, usize, f64)],
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (i, j, v) in triplets {
        coo.push(*i, *j, *v);
    }
    CscMatrix::from(&coo).disassemble()
}
// endregion Standard form

/// Errors raised by the solver layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// The backend was not compiled in
    #[error("The {0} backend is not available, enable its feature")]
    BackendUnavailable(Backend),
    /// The quadratic objective is not convex
    #[error("The quadratic objective is not convex")]
    NonConvex,
    /// The backend could not be set up
    #[error("Unable to set up the solver: {0}")]
    Setup(String),
    /// Every attempted backend failed to converge
    #[error("Solver failed to converge, attempts: {attempts:?}")]
    Numerical {
        attempts: Vec<(Backend, OptimizationStatus)>,
    },
    /// The problem uses features the backend does not support
    #[error("Unsupported problem: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::variable::VariableType;

    /// max x + y  s.t.  x + 2y <= 4, 3x + y <= 6, x, y in [0, 10]
    /// optimum at (1.6, 1.2) with value 2.8
    pub(crate) fn small_lp() -> Problem {
        let mut problem = Problem::new_maximization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 10.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 10.)
            .unwrap();
        problem
            .add_new_inequality_constraint_by_id("c1", &["x", "y"], &[1., 2.], f64::NEG_INFINITY, 4.)
            .unwrap();
        problem
            .add_new_inequality_constraint_by_id("c2", &["x", "y"], &[3., 1.], f64::NEG_INFINITY, 6.)
            .unwrap();
        problem.add_new_linear_objective_term_by_id("x", 1.).unwrap();
        problem.add_new_linear_objective_term_by_id("y", 1.).unwrap();
        problem
    }

    /// min (x - 1)^2 + (y - 2)^2 s.t. x + y = 2, optimum at (0.5, 1.5)
    pub(crate) fn small_qp() -> Problem {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        problem
            .add_new_equality_constraint_by_id("sum", &["x", "y"], &[1., 1.], 2.)
            .unwrap();
        problem.add_new_quadratic_objective_term_by_id("x", "x", 1.).unwrap();
        problem.add_new_quadratic_objective_term_by_id("y", "y", 1.).unwrap();
        problem.add_new_linear_objective_term_by_id("x", -2.).unwrap();
        problem.add_new_linear_objective_term_by_id("y", -4.).unwrap();
        problem
    }

    #[test]
    fn standard_form_negates_maximization() {
        let form = StandardForm::from_problem(&small_lp()).unwrap();
        assert_eq!(form.sign, -1.);
        assert_eq!(form.q, vec![-1., -1.]);
        assert_eq!(form.rows.len(), 2);
        assert!(form.p_upper.is_empty());
    }

    #[test]
    fn standard_form_quadratic() {
        let form = StandardForm::from_problem(&small_qp()).unwrap();
        assert_eq!(form.p_upper, vec![(0, 0, 2.), (1, 1, 2.)]);
        assert!(form.rows[0].is_equality());
    }

    #[test]
    fn concave_minimization_rejected() {
        let mut problem = small_qp();
        problem.add_new_quadratic_objective_term_by_id("x", "x", -3.).unwrap();
        assert_eq!(
            StandardForm::from_problem(&problem).unwrap_err(),
            SolverError::NonConvex
        );
    }

    #[test]
    fn duplicate_terms_merge() {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .add_new_equality_constraint("c", &[0, 0], &[1., 2.], 3.)
            .unwrap();
        let form = StandardForm::from_problem(&problem).unwrap();
        assert_eq!(form.rows[0].terms, vec![(0, 3.)]);
        let (offsets, rows, values) = compress(1, 1, &[(0, 0, 1.), (0, 0, 2.)]);
        assert_eq!(offsets, vec![0, 1]);
        assert_eq!(rows, vec![0]);
        assert_eq!(values, vec![3.]);
    }

    #[test]
    fn auto_solves_lp() {
        let problem = small_lp();
        let solution = solve(&problem, SolverChoice::Auto, &SolverOptions::default()).unwrap();
        assert!(solution.status.has_solution());
        assert!((solution.objective_value.unwrap() - 2.8).abs() < 1e-4);
    }

    #[test]
    fn loose_fast_answers_fall_back() {
        let problem = small_lp();
        let options = SolverOptions {
            atol: 1e-4,
            rtol: 1e-6,
            ..SolverOptions::default()
        };
        // 3x + y overshoots its bound of 6 by 1.5e-5, inside atol but not inside rtol
        let loose = StandardForm::solution_from_point(
            &problem,
            OptimizationStatus::Optimal,
            Backend::Osqp,
            &[1.6 + 5e-6, 1.2],
        );
        assert!(problem.max_violation(&loose.values()) < options.atol);
        assert!(!trusted(&problem, &loose, &options));
        let solution = accept_or_fallback(&problem, Ok(loose), &options).unwrap();
        assert_eq!(solution.backend, Backend::Clarabel);
        assert!((solution.objective_value.unwrap() - 2.8).abs() < 1e-4);

        let tight = StandardForm::solution_from_point(
            &problem,
            OptimizationStatus::Optimal,
            Backend::Osqp,
            &[1.6, 1.2],
        );
        let solution = accept_or_fallback(&problem, Ok(tight), &options).unwrap();
        assert_eq!(solution.backend, Backend::Osqp);
    }

    #[test]
    fn robust_solves_qp() {
        let solution = solve(&small_qp(), SolverChoice::Robust, &SolverOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.value("x").unwrap() - 0.5).abs() < 1e-5);
        assert!((solution.value("y").unwrap() - 1.5).abs() < 1e-5);
    }

    #[test]
    fn infeasible_is_a_status() {
        let mut problem = small_lp();
        problem
            .add_new_inequality_constraint_by_id("c3", &["x"], &[1.], 5., f64::INFINITY)
            .unwrap();
        let solution = solve(&problem, SolverChoice::Robust, &SolverOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }
}
