//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

use derive_builder::Builder;

/// A variable of an optimization problem
///
/// Variables are stored by value inside the [`Problem`](crate::optimize::problem::Problem);
/// constraints and objective terms refer to them through their `index`.
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Variable {
    /// Identifier of the variable, unique within a problem
    #[builder(setter(into))]
    pub id: String,
    /// Optional human-readable name
    #[builder(setter(into, strip_option), default = "None")]
    pub name: Option<String>,
    /// Type of the variable, see [`VariableType`]
    #[builder(default = "VariableType::Continuous")]
    pub variable_type: VariableType,
    /// Lowest value the variable can take
    #[builder(default = "0.")]
    pub lower_bound: f64,
    /// Highest value the variable can take
    #[builder(default = "f64::INFINITY")]
    pub upper_bound: f64,
    /// Position of the variable in the problem, assigned when added
    #[builder(setter(skip), default = "0")]
    pub(crate) index: usize,
}

impl Variable {
    /// Position of the variable in the problem's variable vector
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the variable is fixed to a single value
    pub fn is_fixed(&self) -> bool {
        self.lower_bound == self.upper_bound
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", name, self.variable_type),
            None => write!(f, "{}:{}", self.id, self.variable_type),
        }
    }
}

/// Represents the type of variable in an optimization problem
///
/// # Notes:
/// Not all variable types are supported for all solvers, Clarabel and OSQP only support
/// Continuous variables, while the simplex backend supports all types
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub enum VariableType {
    /// Continuous variable
    Continuous,
    /// Integer variable
    Integer,
    /// Binary Variable
    Binary,
}

impl Display for VariableType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableType::Continuous => write!(f, "CONTINUOUS"),
            VariableType::Integer => write!(f, "INTEGER"),
            VariableType::Binary => write!(f, "BINARY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let var = VariableBuilder::default().id("x").build().unwrap();
        assert_eq!(var.variable_type, VariableType::Continuous);
        assert_eq!(var.lower_bound, 0.);
        assert!(var.upper_bound.is_infinite());
        assert_eq!(format!("{}", var), "x:CONTINUOUS");
    }
}
