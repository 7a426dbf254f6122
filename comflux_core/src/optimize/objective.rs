//! Provides struct for representing an optimization problem's objective
use indexmap::IndexMap;

/// Represents the Objective of an optimization problem
///
/// The objective is `sum(c_i * x_i) + sum(q_ij * x_i * x_j)`, terms on the same variables
/// are accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Linear coefficients keyed by variable index
    linear: IndexMap<usize, f64>,
    /// Quadratic coefficients keyed by (smaller index, larger index)
    quadratic: IndexMap<(usize, usize), f64>,
    /// Sense of the objective (maximize, or minimize), see [`ObjectiveSense`]
    pub(crate) sense: ObjectiveSense,
}

impl Objective {
    /// Create a new empty objective, with a given sense
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            linear: IndexMap::new(),
            quadratic: IndexMap::new(),
            sense,
        }
    }

    /// Create a new empty maximization objective
    pub fn new_maximize() -> Self {
        Self::new(ObjectiveSense::Maximize)
    }

    /// Create a new empty minimization objective
    pub fn new_minimize() -> Self {
        Self::new(ObjectiveSense::Minimize)
    }

    /// Change the sense of the objective
    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    /// Add a new Linear term to the objective
    pub fn add_linear_term(&mut self, variable: usize, coefficient: f64) {
        *self.linear.entry(variable).or_insert(0.) += coefficient;
    }

    /// Add a new Quadratic term `coefficient * x_1 * x_2` to the objective
    pub fn add_quadratic_term(&mut self, variable1: usize, variable2: usize, coefficient: f64) {
        let key = (variable1.min(variable2), variable1.max(variable2));
        *self.quadratic.entry(key).or_insert(0.) += coefficient;
    }

    /// Remove all terms from the objective, keeping the sense
    pub fn remove_all_terms(&mut self) {
        self.linear.clear();
        self.quadratic.clear();
    }

    pub fn contains_quadratic(&self) -> bool {
        self.quadratic.values().any(|c| *c != 0.)
    }

    pub fn linear_terms(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.linear.iter().map(|(i, c)| (*i, *c))
    }

    pub fn quadratic_terms(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.quadratic.iter().map(|(k, c)| (*k, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.linear.is_empty() && self.quadratic.is_empty()
    }

    /// Value of the objective at the variable vector `x`
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        let value = |i: usize| x.get(i).copied().unwrap_or(0.);
        let linear: f64 = self.linear.iter().map(|(i, c)| c * value(*i)).sum();
        let quadratic: f64 = self
            .quadratic
            .iter()
            .map(|((i, j), c)| c * value(*i) * value(*j))
            .sum();
        linear + quadratic
    }
}

/// Represents the sense of the objective, whether it should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// The objective should be minimized
    Minimize,
    /// The objective should be maximized
    Maximize,
}
