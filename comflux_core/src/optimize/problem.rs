//! Provides struct representing an optimization problem
use indexmap::IndexMap;
use thiserror::Error;

use crate::optimize::constraint::Constraint;
use crate::optimize::objective::{Objective, ObjectiveSense};
use crate::optimize::problem::ProblemError::{
    NonExistentConstraint, NonExistentVariable, NonExistentVariablesInObjective,
};
use crate::optimize::variable::{Variable, VariableBuilder, VariableType};

/// An optimization problem
///
/// Holds variables, linear constraints and a linear or quadratic objective. Constraints and
/// objective terms refer to variables by index, so bounds and right hand sides can be
/// changed between solves without rebuilding the problem.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Objective to optimize
    objective: Objective,
    /// Variables of the optimization problem
    variables: IndexMap<String, Variable>,
    /// Constraints of the optimization problem
    constraints: IndexMap<String, Constraint>,
    /// Type of problem
    problem_type: ProblemType,
}

impl Problem {
    // region Creation Functions
    /// Create a new optimization problem
    pub fn new(objective_sense: ObjectiveSense) -> Self {
        Self {
            objective: Objective::new(objective_sense),
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            problem_type: ProblemType::LinearContinuous,
        }
    }

    /// Create a new maximization problem
    pub fn new_maximization() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new minimization problem
    pub fn new_minimization() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }
    // endregion Creation Functions

    // region Update Objective Sense
    /// Update the objective sense of the problem
    pub fn update_objective_sense(&mut self, sense: ObjectiveSense) {
        self.objective.set_sense(sense);
    }
    // endregion Update Objective Sense

    // region Adding Variables
    /// Add a variable to the optimization problem, returning its index
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<usize, ProblemError> {
        // Validate that the variable can in fact be added to the problem
        self.validate_variable(&variable)?;
        let index = self.variables.len();
        variable.index = index;
        if variable.variable_type != VariableType::Continuous {
            self.problem_type = match self.problem_type {
                ProblemType::LinearContinuous => ProblemType::LinearMixedInteger,
                ProblemType::QuadraticContinuous => ProblemType::QuadraticMixedInteger,
                other => other,
            };
        }
        self.variables.insert(variable.id.clone(), variable);
        Ok(index)
    }

    /// Create a new variable and add it to the optimization problem, returning its index
    pub fn add_new_variable(
        &mut self,
        id: &str,
        name: Option<&str>,
        variable_type: VariableType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<usize, ProblemError> {
        let mut builder = VariableBuilder::default();
        builder
            .id(id)
            .variable_type(variable_type)
            .lower_bound(lower_bound)
            .upper_bound(upper_bound);
        if let Some(name) = name {
            builder.name(name);
        }
        let new_var = builder
            .build()
            .map_err(|err| ProblemError::InvalidVariable(err.to_string()))?;
        self.add_variable(new_var)
    }
    // endregion Adding Variables

    // region Adding Constraints
    /// Add a constraint to the problem
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ProblemError> {
        self.validate_constraint(&constraint)?;
        self.constraints
            .insert(constraint.get_id().to_string(), constraint);
        Ok(())
    }

    /// Create a new equality constraint and add it to the model
    pub fn add_new_equality_constraint(
        &mut self,
        id: &str,
        variables: &[usize],
        coefficients: &[f64],
        equals: f64,
    ) -> Result<(), ProblemError> {
        Self::check_term_lengths(id, variables.len(), coefficients.len())?;
        self.add_constraint(Constraint::new_equality(id, variables, coefficients, equals))
    }

    /// Create a new equality constraint using variable ids rather than indices, and add it to the model
    pub fn add_new_equality_constraint_by_id(
        &mut self,
        id: &str,
        variables: &[&str],
        coefficients: &[f64],
        equals: f64,
    ) -> Result<(), ProblemError> {
        let variables = self.indices_of(variables)?;
        self.add_new_equality_constraint(id, &variables, coefficients, equals)
    }

    /// Create a new inequality constraint and add it to the model
    pub fn add_new_inequality_constraint(
        &mut self,
        id: &str,
        variables: &[usize],
        coefficients: &[f64],
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        Self::check_term_lengths(id, variables.len(), coefficients.len())?;
        self.add_constraint(Constraint::new_inequality(
            id,
            variables,
            coefficients,
            lower_bound,
            upper_bound,
        ))
    }

    /// Create a new inequality constraint using variable ids rather than indices, and add it to the model
    pub fn add_new_inequality_constraint_by_id(
        &mut self,
        id: &str,
        variables: &[&str],
        coefficients: &[f64],
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        let variables = self.indices_of(variables)?;
        self.add_new_inequality_constraint(id, &variables, coefficients, lower_bound, upper_bound)
    }
    // endregion Adding Constraints

    // region Adding Objective Terms
    /// Add a new linear term to the objective
    pub fn add_new_linear_objective_term(
        &mut self,
        variable: usize,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        if variable >= self.variables.len() {
            return Err(NonExistentVariablesInObjective);
        }
        self.objective.add_linear_term(variable, coefficient);
        Ok(())
    }

    /// Add a new linear term to the objective using the variable id
    pub fn add_new_linear_objective_term_by_id(
        &mut self,
        variable_id: &str,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        let variable = self
            .variable_index(variable_id)
            .ok_or(NonExistentVariablesInObjective)?;
        self.add_new_linear_objective_term(variable, coefficient)
    }

    /// Add a new quadratic term `coefficient * x_1 * x_2` to the objective
    pub fn add_new_quadratic_objective_term(
        &mut self,
        variable1: usize,
        variable2: usize,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        if variable1 >= self.variables.len() || variable2 >= self.variables.len() {
            return Err(NonExistentVariablesInObjective);
        }
        self.objective
            .add_quadratic_term(variable1, variable2, coefficient);
        self.problem_type = match self.problem_type {
            ProblemType::LinearContinuous => ProblemType::QuadraticContinuous,
            ProblemType::LinearMixedInteger => ProblemType::QuadraticMixedInteger,
            other => other,
        };
        Ok(())
    }

    /// Add a new quadratic term to the objective using the variable ids
    pub fn add_new_quadratic_objective_term_by_id(
        &mut self,
        variable1: &str,
        variable2: &str,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        let variable1 = self
            .variable_index(variable1)
            .ok_or(NonExistentVariablesInObjective)?;
        let variable2 = self
            .variable_index(variable2)
            .ok_or(NonExistentVariablesInObjective)?;
        self.add_new_quadratic_objective_term(variable1, variable2, coefficient)
    }
    // endregion Adding Objective Terms

    // region Updates
    /// Update the bounds of a variable
    pub fn update_variable_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds(id.to_string()));
        }
        match self.variables.get_mut(id) {
            Some(var) => {
                var.lower_bound = lower_bound;
                var.upper_bound = upper_bound;
            }
            None => return Err(NonExistentVariable(id.to_string())),
        };
        Ok(())
    }

    /// Update the range of a constraint
    ///
    /// Equality constraints stay equalities when both bounds are equal, otherwise they are
    /// turned into inequalities over the same terms.
    pub fn update_constraint_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidConstraintBounds(id.to_string()));
        }
        let constraint = self
            .constraints
            .get_mut(id)
            .ok_or_else(|| NonExistentConstraint(id.to_string()))?;
        let terms = constraint.terms().to_vec();
        *constraint = if lower_bound == upper_bound {
            Constraint::Equality {
                id: id.to_string(),
                terms,
                equals: lower_bound,
            }
        } else {
            Constraint::Inequality {
                id: id.to_string(),
                terms,
                lower_bound,
                upper_bound,
            }
        };
        Ok(())
    }
    // endregion Updates

    // region Remove Constraints
    /// Remove a constraint (by id) from the model, returning whether it existed
    pub fn remove_constraint(&mut self, constraint_id: &str) -> bool {
        self.constraints.shift_remove(constraint_id).is_some()
    }
    // endregion Remove Constraints

    // region Remove Objective Terms
    /// Remove all terms from the objective
    pub fn remove_all_objective_terms(&mut self) {
        self.objective.remove_all_terms();
        self.fix_problem_type();
    }
    // endregion Remove Objective Terms

    // region Accessors
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.variables.get(id)
    }

    pub fn variable_index(&self, id: &str) -> Option<usize> {
        self.variables.get_index_of(id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    pub fn constraint(&self, id: &str) -> Option<&Constraint> {
        self.constraints.get(id)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }
    // endregion Accessors

    // region Validation Functions
    /// Check that a variable to be added is valid to add to this problem
    fn validate_variable(&self, variable: &Variable) -> Result<(), ProblemError> {
        if self.variables.contains_key(&variable.id) {
            return Err(ProblemError::VariableIdAlreadyExists(variable.id.clone()));
        };
        if variable.lower_bound > variable.upper_bound
            || variable.lower_bound.is_nan()
            || variable.upper_bound.is_nan()
        {
            return Err(ProblemError::InvalidVariableBounds(variable.id.clone()));
        }
        Ok(())
    }

    /// Check that a constraint to be added is valid to add to this Problem
    fn validate_constraint(&self, constraint: &Constraint) -> Result<(), ProblemError> {
        let id = constraint.get_id();
        if self.constraints.contains_key(id) {
            return Err(ProblemError::ConstraintAlreadyExists(id.to_string()));
        }
        let (lb, ub) = constraint.bounds();
        if lb > ub || lb.is_nan() || ub.is_nan() {
            return Err(ProblemError::InvalidConstraintBounds(id.to_string()));
        }
        if constraint
            .terms()
            .iter()
            .any(|t| t.variable >= self.variables.len())
        {
            return Err(ProblemError::NonExistentVariablesInConstraint(id.to_string()));
        }
        Ok(())
    }

    fn check_term_lengths(id: &str, variables: usize, coefficients: usize) -> Result<(), ProblemError> {
        if variables != coefficients {
            return Err(ProblemError::MismatchedTerms(id.to_string()));
        }
        Ok(())
    }

    fn indices_of(&self, ids: &[&str]) -> Result<Vec<usize>, ProblemError> {
        ids.iter()
            .map(|v_id| {
                self.variable_index(v_id)
                    .ok_or_else(|| NonExistentVariable(v_id.to_string()))
            })
            .collect()
    }
    // endregion Validation Functions

    // region Fix Problem Functions
    fn fix_problem_type(&mut self) {
        let integer_variables = self.has_integer_variables();
        let quadratic_objective = self.has_quadratic_objective_terms();
        self.problem_type = match (integer_variables, quadratic_objective) {
            (true, true) => ProblemType::QuadraticMixedInteger,
            (false, true) => ProblemType::QuadraticContinuous,
            (true, false) => ProblemType::LinearMixedInteger,
            (false, false) => ProblemType::LinearContinuous,
        };
    }
    // endregion Fix Problem Functions

    // region Check Problem
    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .values()
            .any(|var| var.variable_type != VariableType::Continuous)
    }

    pub fn has_quadratic_objective_terms(&self) -> bool {
        self.objective.contains_quadratic()
    }

    /// Largest bound or constraint violation of the variable vector `x`
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let bounds = self.variables.values().map(|v| {
            let value = x.get(v.index).copied().unwrap_or(0.);
            (v.lower_bound - value).max(value - v.upper_bound).max(0.)
        });
        let rows = self.constraints.values().map(|c| c.violation(x));
        bounds.chain(rows).fold(0., f64::max)
    }

    /// Largest violation of `x`, each scaled by the magnitude of its bounds and value
    ///
    /// Magnitudes below 1 are treated as 1, so small rows are measured absolutely.
    pub fn max_relative_violation(&self, x: &[f64]) -> f64 {
        let scale = |value: f64, lower: f64, upper: f64| {
            [value, lower, upper]
                .into_iter()
                .filter(|b| b.is_finite())
                .fold(1., |acc: f64, b| acc.max(b.abs()))
        };
        let bounds = self.variables.values().map(|v| {
            let value = x.get(v.index).copied().unwrap_or(0.);
            let violation = (v.lower_bound - value).max(value - v.upper_bound).max(0.);
            violation / scale(value, v.lower_bound, v.upper_bound)
        });
        let rows = self.constraints.values().map(|c| {
            let (lower, upper) = c.bounds();
            c.violation(x) / scale(c.activity(x), lower, upper)
        });
        bounds.chain(rows).fold(0., f64::max)
    }
    // endregion Check Problem
}

/// Types of optimization problems
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemType {
    /// Problem with linear objectives and constraints, and continuous variables
    LinearContinuous,
    /// Problem with quadratic objective, linear constraints, and continuous variables
    QuadraticContinuous,
    /// Problem with linear objective and constraints, with integer and continuous variables
    LinearMixedInteger,
    /// Problem with a quadratic objective function, and some integer variables
    ///
    /// # Note:
    /// This problem type is not currently supported by any of the solvers
    QuadraticMixedInteger,
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add a variable with the same id as an existing variable: {0}")]
    VariableIdAlreadyExists(String),
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to set lower_bound > upper_bound for variable {0}")]
    InvalidVariableBounds(String),
    /// Error when a variable could not be built
    #[error("Unable to build variable: {0}")]
    InvalidVariable(String),
    /// Error when trying to add a constraint with the same id as an existing constraint
    #[error("Tried to add a constraint with the same id as an existing constraint: {0}")]
    ConstraintAlreadyExists(String),
    /// Error when trying to add a constraint with invalid bounds
    #[error("Tried to set lower_bound > upper_bound for constraint {0}")]
    InvalidConstraintBounds(String),
    /// Error when variables and coefficients have different lengths
    #[error("Constraint {0} has a different number of variables and coefficients")]
    MismatchedTerms(String),
    /// Error when trying to add a constraint that contains variables not in the model
    #[error("Tried to add constraint {0} with variables not in the model")]
    NonExistentVariablesInConstraint(String),
    /// Error when trying to add an objective term which includes variables not in the model
    #[error("Tried adding an objective term with variables not in the model")]
    NonExistentVariablesInObjective,
    /// Error when trying to perform an update on a variable that doesn't exist
    #[error("Tried to access variable {0} which doesn't exist")]
    NonExistentVariable(String),
    /// Error when trying to perform an update on a constraint that doesn't exist
    #[error("Tried to access constraint {0} which doesn't exist")]
    NonExistentConstraint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_problem() {
        // Check that the specific creation functions work
        let max_problem = Problem::new_maximization();
        assert_eq!(max_problem.objective.sense, ObjectiveSense::Maximize);

        let min_problem = Problem::new_minimization();
        assert_eq!(min_problem.objective.sense, ObjectiveSense::Minimize);
    }

    #[test]
    fn update_objective_sense() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.update_objective_sense(ObjectiveSense::Minimize);
        assert_eq!(problem.objective.sense, ObjectiveSense::Minimize);
        problem.update_objective_sense(ObjectiveSense::Maximize);
        assert_eq!(problem.objective.sense, ObjectiveSense::Maximize);
    }

    #[test]
    fn add_variables() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add a single variable
        let x = problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();
        assert_eq!(x, 0);
        let var = problem.variable("x").expect("Variable not added to model");
        assert_eq!(var.variable_type, VariableType::Continuous);
        assert!(
            (var.lower_bound - 64.0).abs() < 1e-25,
            "Variable added with incorrect lower bound"
        );
        assert!(
            (var.upper_bound - 100.0).abs() < 1e-25,
            "Variable added with incorrect upper bound"
        );
        // Check that the problem has the correct type
        assert_eq!(problem.problem_type, ProblemType::LinearContinuous);

        // Add another variable, this time an integer variable
        let y = problem
            .add_new_variable("y", Some("why"), VariableType::Integer, 64., 100.)
            .unwrap();
        assert_eq!(y, 1);
        assert_eq!(problem.variable("y").unwrap().index(), 1);
        // Check that the problem has updated its type
        assert_eq!(problem.problem_type, ProblemType::LinearMixedInteger);
    }

    #[test]
    fn add_bad_variable() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add a variable with bad bounds
        let res = problem.add_new_variable("x", None, VariableType::Continuous, 100., 64.);
        assert_eq!(res, Err(ProblemError::InvalidVariableBounds("x".to_string())));

        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        let res = problem.add_new_variable("x", None, VariableType::Continuous, 0., 1.);
        assert_eq!(res, Err(ProblemError::VariableIdAlreadyExists("x".to_string())));
    }

    #[test]
    fn add_constraint() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add some variables
        problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 64., 100.)
            .unwrap();

        // Add an equality constraint
        problem
            .add_new_equality_constraint_by_id("test_constraint", &["x", "y"], &[2., 3.], 200.)
            .unwrap();

        // Check that the constraint was correctly added
        match problem.constraint("test_constraint").unwrap() {
            Constraint::Equality { equals, .. } => {
                assert!((equals - 200.).abs() < 1e-25)
            }
            Constraint::Inequality { .. } => panic!("Incorrect constraint type added"),
        }

        // Adding under the same id fails
        let res = problem.add_new_inequality_constraint_by_id(
            "test_constraint",
            &["x", "y"],
            &[2., 3.],
            100.,
            200.,
        );
        assert!(matches!(res, Err(ProblemError::ConstraintAlreadyExists(_))));

        // Relaxing it turns it into an inequality
        problem
            .update_constraint_bounds("test_constraint", 100., 200.)
            .unwrap();
        match problem.constraint("test_constraint").unwrap() {
            Constraint::Inequality {
                lower_bound,
                upper_bound,
                terms,
                ..
            } => {
                assert!((lower_bound - 100.).abs() < 1e-25);
                assert!((upper_bound - 200.).abs() < 1e-25);
                assert_eq!(terms.len(), 2);
            }
            Constraint::Equality { .. } => panic!("Constraint not relaxed"),
        }
        assert!(problem.remove_constraint("test_constraint"));
        assert_eq!(problem.num_constraints(), 0);
    }

    #[test]
    fn add_bad_constraint() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);

        // Add some variables
        problem
            .add_new_variable("x", None, VariableType::Continuous, 64., 100.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 64., 100.)
            .unwrap();

        let res = problem.add_new_inequality_constraint_by_id(
            "bad_constraint",
            &["x", "y"],
            &[2., 3.],
            200.,
            100.,
        );
        assert!(matches!(res, Err(ProblemError::InvalidConstraintBounds(_))));

        let res = problem.add_new_equality_constraint("unknown", &[0, 5], &[1., 1.], 0.);
        assert!(matches!(
            res,
            Err(ProblemError::NonExistentVariablesInConstraint(_))
        ));

        let res = problem.add_new_equality_constraint("short", &[0, 1], &[1.], 0.);
        assert!(matches!(res, Err(ProblemError::MismatchedTerms(_))));
    }

    #[test]
    fn objective_terms_update_type() {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem.add_new_linear_objective_term_by_id("x", 1.).unwrap();
        assert_eq!(problem.problem_type(), ProblemType::LinearContinuous);
        problem
            .add_new_quadratic_objective_term_by_id("x", "x", 1.)
            .unwrap();
        assert_eq!(problem.problem_type(), ProblemType::QuadraticContinuous);
        problem.remove_all_objective_terms();
        assert_eq!(problem.problem_type(), ProblemType::LinearContinuous);
        assert_eq!(
            problem.add_new_linear_objective_term_by_id("z", 1.),
            Err(NonExistentVariablesInObjective)
        );
    }

    #[test]
    fn violation() {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .add_new_variable("y", None, VariableType::Continuous, 0., 1.)
            .unwrap();
        problem
            .add_new_equality_constraint_by_id("sum", &["x", "y"], &[1., 1.], 1.)
            .unwrap();
        assert_eq!(problem.max_violation(&[0.5, 0.5]), 0.);
        assert!((problem.max_violation(&[1.5, 0.]) - 0.5).abs() < 1e-12);
        // both the bound of x and the row are off by 0.5 at a magnitude of 1.5
        assert!((problem.max_relative_violation(&[1.5, 0.]) - 1. / 3.).abs() < 1e-12);
    }

    #[test]
    fn relative_violation_scales_with_rows() {
        let mut problem = Problem::new_minimization();
        problem
            .add_new_variable("x", None, VariableType::Continuous, 0., 1000.)
            .unwrap();
        problem
            .add_new_equality_constraint_by_id("big", &["x"], &[1.], 500.)
            .unwrap();
        let x = [500.5];
        assert!((problem.max_violation(&x) - 0.5).abs() < 1e-12);
        assert!((problem.max_relative_violation(&x) - 0.5 / 500.5).abs() < 1e-12);
    }
}
