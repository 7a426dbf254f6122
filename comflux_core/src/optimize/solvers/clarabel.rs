//! Implements a solver interface for Clarabel
//!
//! Clarabel solves `min 1/2 x'Px + q'x` subject to `Ax + s = b` with `s` in a product of
//! cones. Equality rows and fixed variables go into the zero cone, every finite side of an
//! inequality row or variable bound becomes one row of the non-negative cone.
use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};
use ::clarabel::solver::{NonnegativeConeT, ZeroConeT};
use log::debug;

use crate::optimize::problem::Problem;
use crate::optimize::solvers::{compress, Backend, Solver, SolverError, SolverOptions, StandardForm};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Tolerance the interior point iterations are held to, tighter options are passed through
const IPM_TOLERANCE: f64 = 1e-8;

#[derive(Clone, Debug, Default)]
pub struct ClarabelSolver {}

/// Rows of `Ax + s = b`, split by cone
#[derive(Default)]
struct ConeRows {
    zero: Vec<(Vec<(usize, f64)>, f64)>,
    nonnegative: Vec<(Vec<(usize, f64)>, f64)>,
}

impl ConeRows {
    /// Add `lower <= terms <= upper`
    fn push_range(&mut self, terms: &[(usize, f64)], lower: f64, upper: f64) {
        if lower == upper {
            self.zero.push((terms.to_vec(), upper));
            return;
        }
        if upper.is_finite() {
            self.nonnegative.push((terms.to_vec(), upper));
        }
        if lower.is_finite() {
            let negated = terms.iter().map(|(i, c)| (*i, -c)).collect();
            self.nonnegative.push((negated, -lower));
        }
    }

    fn assemble(self, n: usize) -> (CscMatrix<f64>, Vec<f64>, Vec<SupportedConeT<f64>>) {
        let n_zero = self.zero.len();
        let n_nonnegative = self.nonnegative.len();
        let mut triplets = Vec::new();
        let mut b = Vec::with_capacity(n_zero + n_nonnegative);
        for (row, (terms, rhs)) in self.zero.into_iter().chain(self.nonnegative).enumerate() {
            triplets.extend(terms.into_iter().map(|(j, c)| (row, j, c)));
            b.push(rhs);
        }
        let m = b.len();
        let (colptr, rowval, nzval) = compress(m, n, &triplets);
        let mut cones = Vec::new();
        if n_zero > 0 {
            cones.push(ZeroConeT(n_zero));
        }
        if n_nonnegative > 0 {
            cones.push(NonnegativeConeT(n_nonnegative));
        }
        (CscMatrix::new(m, n, colptr, rowval, nzval), b, cones)
    }
}

impl Solver for ClarabelSolver {
    fn backend(&self) -> Backend {
        Backend::Clarabel
    }

    fn solve(&self, problem: &Problem, options: &SolverOptions) -> Result<ProblemSolution, SolverError> {
        if problem.has_integer_variables() {
            return Err(SolverError::Unsupported(
                "clarabel only supports continuous variables".to_string(),
            ));
        }
        let form = StandardForm::from_problem(problem)?;
        if form.trivially_infeasible {
            return Ok(ProblemSolution::without_point(
                OptimizationStatus::Infeasible,
                Backend::Clarabel,
                Some("constraint without terms excludes zero".to_string()),
            ));
        }
        let n = form.n;
        let mut rows = ConeRows::default();
        for row in &form.rows {
            rows.push_range(&row.terms, row.lower, row.upper);
        }
        for i in 0..n {
            rows.push_range(&[(i, 1.)], form.var_lower[i], form.var_upper[i]);
        }
        let (a, b, cones) = rows.assemble(n);
        let (p_colptr, p_rowval, p_nzval) = compress(n, n, &form.p_upper);
        let p = CscMatrix::new(n, n, p_colptr, p_rowval, p_nzval);

        let settings = DefaultSettingsBuilder::default()
            .verbose(options.verbose)
            .max_iter(options.max_iter)
            .tol_feas(options.atol.min(IPM_TOLERANCE))
            .tol_gap_abs(options.atol.min(IPM_TOLERANCE))
            .tol_gap_rel(options.rtol.min(IPM_TOLERANCE))
            .equilibrate_enable(options.equilibrate)
            .presolve_enable(options.presolve)
            .build()
            .map_err(|err| SolverError::Setup(format!("{:?}", err)))?;
        let mut solver = DefaultSolver::new(&p, &form.q, &a, &b, &cones, settings);
        solver.solve();

        let status = match solver.solution.status {
            SolverStatus::Solved => OptimizationStatus::Optimal,
            SolverStatus::AlmostSolved => OptimizationStatus::AlmostOptimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                OptimizationStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                OptimizationStatus::Unbounded
            }
            SolverStatus::MaxIterations
            | SolverStatus::MaxTime
            | SolverStatus::InsufficientProgress => OptimizationStatus::SolverHalted,
            _ => OptimizationStatus::NumericalError,
        };
        debug!(
            "clarabel finished with {:?} after {} iterations",
            solver.solution.status, solver.solution.iterations
        );
        let message = Some(format!("{:?}", solver.solution.status));
        if !status.has_solution() && status != OptimizationStatus::SolverHalted {
            return Ok(ProblemSolution::without_point(status, Backend::Clarabel, message));
        }
        let mut solution =
            StandardForm::solution_from_point(problem, status, Backend::Clarabel, &solver.solution.x);
        solution.message = message;
        Ok(solution)
    }
}
