//! Configuration of community optimization runs
//!
//! A [`Configuration`] is passed explicitly to the community builder, the solver layer and
//! the tradeoff algorithm. Nothing is read from process-wide state, so different samples can
//! be solved side by side with different settings.
use std::fs;
use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimize::solvers::SolverOptions;

/// Which backend to solve with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverChoice {
    /// First order QP solver (OSQP)
    Fast,
    /// Interior point LP/QP solver (Clarabel)
    Robust,
    /// Fast first, robust when the fast answer is not trusted
    Auto,
    /// Dual simplex, linear problems only
    Simplex,
}

/// The deviation objective used to pick among optimal growth rate vectors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegularizationKind {
    /// Sum of squared deviations
    Quadratic,
    /// Sum of absolute deviations
    Linear,
    /// Quadratic when the backend supports it, linear otherwise
    Auto,
}

/// When to re-solve the regularized solution for a vertex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossoverMode {
    Never,
    /// Only when the regularized solve was not fully optimal
    Auto,
    Always,
}

#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Absolute tolerance, derived from the problem size when None
    #[builder(setter(strip_option), default = "None")]
    pub atol: Option<f64>,
    /// Relative tolerance, derived from the backend when None
    #[builder(setter(strip_option), default = "None")]
    pub rtol: Option<f64>,
    #[builder(default = "SolverChoice::Auto")]
    pub solver: SolverChoice,
    #[builder(default = "RegularizationKind::Auto")]
    pub regularization: RegularizationKind,
    /// Let backends presolve and rescale problems
    #[builder(default = "true")]
    pub presolve: bool,
    #[builder(default = "10_000")]
    pub max_iter: u32,
    /// Factor applied to the regularization objective
    #[builder(default = "1.0")]
    pub objective_scale: f64,
    #[builder(default = "CrossoverMode::Auto")]
    pub crossover: CrossoverMode,
    #[builder(default = "false")]
    pub verbose: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            atol: None,
            rtol: None,
            solver: SolverChoice::Auto,
            regularization: RegularizationKind::Auto,
            presolve: true,
            max_iter: 10_000,
            objective_scale: 1.0,
            crossover: CrossoverMode::Auto,
            verbose: false,
        }
    }
}

impl Configuration {
    /// Base tolerance of the configured backend
    fn base_tolerance(&self) -> f64 {
        match self.solver {
            SolverChoice::Fast => 1e-4,
            SolverChoice::Auto => 1e-5,
            SolverChoice::Robust | SolverChoice::Simplex => 1e-6,
        }
    }

    /// The (atol, rtol) pair for a problem with `n_variables` variables
    ///
    /// Explicit values win. Otherwise rtol is the backend's base tolerance and atol is
    /// that base scaled by `max(1, log10(n_variables))`.
    pub fn tolerances(&self, n_variables: usize) -> (f64, f64) {
        let base = self.base_tolerance();
        let scale = (n_variables.max(1) as f64).log10().max(1.);
        (
            self.atol.unwrap_or(base * scale),
            self.rtol.unwrap_or(base),
        )
    }

    /// Options for a single backend call on a problem with `n_variables` variables
    pub fn solver_options(&self, n_variables: usize) -> SolverOptions {
        let (atol, rtol) = self.tolerances(n_variables);
        SolverOptions {
            atol,
            rtol,
            max_iter: self.max_iter,
            presolve: self.presolve,
            equilibrate: self.presolve,
            verbose: self.verbose,
            warm_start: None,
        }
    }

    /// Parse a configuration from json, missing fields take their default
    pub fn from_json_str(data: &str) -> Result<Self, ConfigurationError> {
        let config: Configuration = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a json file
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Check that tolerances and scale are usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [("atol", self.atol), ("rtol", self.rtol)] {
            if let Some(value) = value {
                if !(value > 0. && value < 1.) {
                    return Err(ConfigurationError::InvalidTolerance(name.to_string(), value));
                }
            }
        }
        if !(self.objective_scale > 0. && self.objective_scale.is_finite()) {
            return Err(ConfigurationError::InvalidScale(self.objective_scale));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Tolerance {0} must lie in (0, 1), got {1}")]
    InvalidTolerance(String, f64),
    #[error("Objective scale must be positive and finite, got {0}")]
    InvalidScale(f64),
    #[error("Unable to parse configuration")]
    Parse(#[from] serde_json::Error),
    #[error("Unable to read configuration file")]
    Read(#[from] std::io::Error),
}
