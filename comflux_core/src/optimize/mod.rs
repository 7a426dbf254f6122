//! Module for constructing and solving optimization problems

pub mod constraint;
pub mod objective;
pub mod problem;
pub mod solvers;
pub mod variable;

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::optimize::solvers::Backend;

/// Struct representing the solution to an optimization problem
#[derive(Clone, Debug)]
pub struct ProblemSolution {
    /// The status of the optimization problem, representing if the optimization was
    /// completed successfully
    pub status: OptimizationStatus,
    /// Optimized value of the objective
    ///
    /// Some(f64) if the solver returned a point, None otherwise
    pub objective_value: Option<f64>,
    /// Values of the variables at the optimum,
    ///
    /// Some(IndexMap), keyed by variable id in problem order, with values corresponding
    /// to variable values at optimum if the problem could be solved, None otherwise
    pub variable_values: Option<IndexMap<String, f64>>,
    /// Backend which produced the solution
    pub backend: Backend,
    /// Additional information from the backend
    pub message: Option<String>,
}

impl ProblemSolution {
    /// A solution without any point, for failed solves
    pub(crate) fn without_point(status: OptimizationStatus, backend: Backend, message: Option<String>) -> Self {
        Self {
            status,
            objective_value: None,
            variable_values: None,
            backend,
            message,
        }
    }

    /// Value of the variable with the given id
    pub fn value(&self, id: &str) -> Option<f64> {
        self.variable_values.as_ref()?.get(id).copied()
    }

    /// Value of the variable at the given index
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.variable_values
            .as_ref()?
            .get_index(index)
            .map(|(_, v)| *v)
    }

    /// The variable values in problem order
    pub fn values(&self) -> Vec<f64> {
        self.variable_values
            .as_ref()
            .map(|v| v.values().copied().collect())
            .unwrap_or_default()
    }
}

/// Status of an optimization problem
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationStatus {
    /// Problem has not yet attempted to be optimized
    Unoptimized,
    /// Problem has been optimized
    Optimal,
    /// Problem can't be optimized because objective value is not bounded
    Unbounded,
    /// Problem can't be solved because it is infeasible (conflicting constraints)
    Infeasible,
    /// An approximate solution has been found
    AlmostOptimal,
    /// A numerical error occurred during solving
    NumericalError,
    /// The solver hit the maximum allowed iterations, or max time, or made insufficient progress
    SolverHalted,
}

impl OptimizationStatus {
    /// Whether the status comes with a usable point
    pub fn has_solution(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal
        )
    }

    /// Whether the status is a solver failure rather than a property of the problem
    pub fn is_numerical_failure(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::NumericalError
                | OptimizationStatus::SolverHalted
                | OptimizationStatus::Unoptimized
        )
    }
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OptimizationStatus::Unoptimized => "unoptimized",
            OptimizationStatus::Optimal => "optimal",
            OptimizationStatus::Unbounded => "unbounded",
            OptimizationStatus::Infeasible => "infeasible",
            OptimizationStatus::AlmostOptimal => "almost optimal",
            OptimizationStatus::NumericalError => "numerical error",
            OptimizationStatus::SolverHalted => "solver halted",
        };
        write!(f, "{}", s)
    }
}
