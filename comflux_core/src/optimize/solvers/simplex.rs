//! Dual simplex backend built on microlp
//!
//! Only linear objectives are supported. Integer and binary variables are solved by
//! branch and bound. Solutions are vertices of the feasible polytope, which makes this the
//! backend used for crossover.
use log::debug;
use microlp::{ComparisonOp, Error as LpError, LinearExpr, OptimizationDirection};

use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Backend, Solver, SolverError, SolverOptions, StandardForm};
use crate::optimize::variable::VariableType;
use crate::optimize::{OptimizationStatus, ProblemSolution};

#[derive(Clone, Debug, Default)]
pub struct SimplexSolver {}

fn expression(terms: &[(usize, f64)], variables: &[microlp::Variable]) -> LinearExpr {
    let mut expr = LinearExpr::empty();
    for (i, c) in terms {
        expr.add(variables[*i], *c);
    }
    expr
}

/// Integer bounds for microlp, saturating at the i32 range
fn integer_bound(value: f64) -> i32 {
    value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

impl Solver for SimplexSolver {
    fn backend(&self) -> Backend {
        Backend::Simplex
    }

    fn solve(&self, problem: &Problem, _options: &SolverOptions) -> Result<ProblemSolution, SolverError> {
        if problem.has_quadratic_objective_terms() {
            return Err(SolverError::Unsupported(
                "the simplex backend only supports linear objectives".to_string(),
            ));
        }
        let form = StandardForm::from_problem(problem)?;
        if form.trivially_infeasible {
            return Ok(ProblemSolution::without_point(
                OptimizationStatus::Infeasible,
                Backend::Simplex,
                Some("constraint without terms excludes zero".to_string()),
            ));
        }
        let direction = match problem.objective().sense() {
            ObjectiveSense::Minimize => OptimizationDirection::Minimize,
            ObjectiveSense::Maximize => OptimizationDirection::Maximize,
        };
        let mut lp = microlp::Problem::new(direction);
        // form.q carries the sign of the standard form, undo it for microlp's own direction
        let variables: Vec<microlp::Variable> = problem
            .variables()
            .map(|v| {
                let c = form.sign * form.q[v.index()];
                match v.variable_type {
                    VariableType::Continuous => lp.add_var(c, (v.lower_bound, v.upper_bound)),
                    VariableType::Binary => lp.add_binary_var(c),
                    VariableType::Integer => lp.add_integer_var(
                        c,
                        (integer_bound(v.lower_bound), integer_bound(v.upper_bound)),
                    ),
                }
            })
            .collect();
        // binary variables ignore bounds on creation
        for v in problem
            .variables()
            .filter(|v| v.variable_type == VariableType::Binary)
        {
            let var = variables[v.index()];
            if v.lower_bound > 0. {
                lp.add_constraint(&[(var, 1.)], ComparisonOp::Ge, v.lower_bound);
            }
            if v.upper_bound < 1. {
                lp.add_constraint(&[(var, 1.)], ComparisonOp::Le, v.upper_bound);
            }
        }
        for row in &form.rows {
            if row.is_equality() {
                lp.add_constraint(expression(&row.terms, &variables), ComparisonOp::Eq, row.upper);
                continue;
            }
            if row.lower.is_finite() {
                lp.add_constraint(expression(&row.terms, &variables), ComparisonOp::Ge, row.lower);
            }
            if row.upper.is_finite() {
                lp.add_constraint(expression(&row.terms, &variables), ComparisonOp::Le, row.upper);
            }
        }

        match lp.solve() {
            Ok(solution) => {
                let x: Vec<f64> = variables.iter().map(|v| *solution.var_value(*v)).collect();
                debug!("simplex finished with objective {}", solution.objective());
                Ok(StandardForm::solution_from_point(
                    problem,
                    OptimizationStatus::Optimal,
                    Backend::Simplex,
                    &x,
                ))
            }
            Err(LpError::Infeasible) => Ok(ProblemSolution::without_point(
                OptimizationStatus::Infeasible,
                Backend::Simplex,
                None,
            )),
            Err(LpError::Unbounded) => Ok(ProblemSolution::without_point(
                OptimizationStatus::Unbounded,
                Backend::Simplex,
                None,
            )),
            Err(LpError::InternalError(message)) => Ok(ProblemSolution::without_point(
                OptimizationStatus::NumericalError,
                Backend::Simplex,
                Some(message),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::solvers::tests::{small_lp, small_qp};

    #[test]
    fn solves_lp_at_vertex() {
        let solution = SimplexSolver::default()
            .solve(&small_lp(), &SolverOptions::default())
            .unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.value("x").unwrap() - 1.6).abs() < 1e-9);
        assert!((solution.value("y").unwrap() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn rejects_quadratic() {
        let res = SimplexSolver::default().solve(&small_qp(), &SolverOptions::default());
        assert!(matches!(res, Err(SolverError::Unsupported(_))));
    }

    #[test]
    fn binary_knapsack() {
        // max 3a + 2b + 2c with a + b + c <= 2, best is a and one of b, c
        let mut problem = Problem::new_maximization();
        for (id, value) in [("a", 3.), ("b", 2.), ("c", 2.)] {
            problem
                .add_new_variable(id, None, VariableType::Binary, 0., 1.)
                .unwrap();
            problem.add_new_linear_objective_term_by_id(id, value).unwrap();
        }
        problem
            .add_new_inequality_constraint_by_id(
                "capacity",
                &["a", "b", "c"],
                &[1., 1., 1.],
                f64::NEG_INFINITY,
                2.,
            )
            .unwrap();
        let solution = SimplexSolver::default()
            .solve(&problem, &SolverOptions::default())
            .unwrap();
        assert!((solution.objective_value.unwrap() - 5.).abs() < 1e-9);
        assert!((solution.value("a").unwrap() - 1.).abs() < 1e-9);
    }
}
