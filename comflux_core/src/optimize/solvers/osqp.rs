//! Solver interface for OSQP solver
//!
//! OSQP solves `min 1/2 x'Px + q'x` subject to `l <= Ax <= u`. Variable bounds are
//! appended to the constraint rows as an identity block.
use std::borrow::Cow;

use log::debug;
use ::osqp::{CscMatrix, Problem as OsqpProblem, Settings, Status};

use crate::optimize::problem::Problem;
use crate::optimize::solvers::{compress, Backend, Solver, SolverError, SolverOptions, StandardForm};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Magnitude used in place of infinite bounds, OSQP needs finite values
const INFINITY_BOUND: f64 = 1e30;

#[derive(Clone, Debug, Default)]
pub struct OsqpSolver {}

fn clamp(value: f64) -> f64 {
    value.clamp(-INFINITY_BOUND, INFINITY_BOUND)
}

fn osqp_matrix(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> CscMatrix<'static> {
    let (indptr, indices, data) = compress(nrows, ncols, triplets);
    CscMatrix {
        nrows,
        ncols,
        indptr: Cow::Owned(indptr),
        indices: Cow::Owned(indices),
        data: Cow::Owned(data),
    }
}

impl Solver for OsqpSolver {
    fn backend(&self) -> Backend {
        Backend::Osqp
    }

    fn solve(&self, problem: &Problem, options: &SolverOptions) -> Result<ProblemSolution, SolverError> {
        if problem.has_integer_variables() {
            return Err(SolverError::Unsupported(
                "osqp only supports continuous variables".to_string(),
            ));
        }
        let form = StandardForm::from_problem(problem)?;
        if form.trivially_infeasible {
            return Ok(ProblemSolution::without_point(
                OptimizationStatus::Infeasible,
                Backend::Osqp,
                Some("constraint without terms excludes zero".to_string()),
            ));
        }
        let n = form.n;
        let m = form.rows.len() + n;
        let mut triplets = Vec::new();
        let mut lower = Vec::with_capacity(m);
        let mut upper = Vec::with_capacity(m);
        for (r, row) in form.rows.iter().enumerate() {
            triplets.extend(row.terms.iter().map(|(j, c)| (r, *j, *c)));
            lower.push(clamp(row.lower));
            upper.push(clamp(row.upper));
        }
        let offset = form.rows.len();
        for i in 0..n {
            triplets.push((offset + i, i, 1.));
            lower.push(clamp(form.var_lower[i]));
            upper.push(clamp(form.var_upper[i]));
        }
        let a = osqp_matrix(m, n, &triplets);
        let p = osqp_matrix(n, n, &form.p_upper);

        let settings = Settings::default()
            .verbose(options.verbose)
            .eps_abs(options.atol)
            .eps_rel(options.rtol)
            .max_iter(options.max_iter)
            .scaling(if options.equilibrate { 10 } else { 0 })
            .polish(true)
            .warm_start(options.warm_start.is_some());
        let mut osqp_problem = OsqpProblem::new(p, &form.q, a, &lower, &upper, &settings)
            .map_err(|err| SolverError::Setup(format!("{:?}", err)))?;
        if let Some(x) = &options.warm_start {
            if x.len() == n {
                osqp_problem.warm_start_x(x);
            }
        }

        let (status, x) = match osqp_problem.solve() {
            Status::Solved(solution) => (OptimizationStatus::Optimal, Some(solution.x().to_vec())),
            Status::SolvedInaccurate(solution) => {
                (OptimizationStatus::AlmostOptimal, Some(solution.x().to_vec()))
            }
            Status::MaxIterationsReached(solution) | Status::TimeLimitReached(solution) => {
                (OptimizationStatus::SolverHalted, Some(solution.x().to_vec()))
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                (OptimizationStatus::Infeasible, None)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                (OptimizationStatus::Unbounded, None)
            }
            Status::NonConvex(_) => return Err(SolverError::NonConvex),
            _ => (OptimizationStatus::NumericalError, None),
        };
        debug!("osqp finished with status {}", status);
        Ok(match x {
            Some(x) => StandardForm::solution_from_point(problem, status, Backend::Osqp, &x),
            None => ProblemSolution::without_point(status, Backend::Osqp, None),
        })
    }
}
