//! Translates a community into an optimization problem
//!
//! Every reaction is split into a forward and a reverse variable, so the net flux is
//! `forward - reverse` and the total flux `forward + reverse` stays linear. Each metabolite
//! gets a steady state constraint. On top of the fluxes there is one growth variable per
//! taxon, equal to the flux of its biomass reaction, and a community growth variable equal
//! to the abundance weighted sum of the growth variables.
use indexmap::IndexMap;
use log::debug;

use crate::community::model::Community;
use crate::configuration::SolverChoice;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::solvers::{self, SolverError, SolverOptions};
use crate::optimize::variable::VariableType;
use crate::optimize::ProblemSolution;

/// Id of the community growth variable
pub const COMMUNITY_GROWTH: &str = "community_growth";
const COMMUNITY_GROWTH_BALANCE: &str = "community_growth_balance";

/// Id of the growth variable of a taxon
pub fn growth_variable_id(taxon: &str) -> String {
    format!("growth__{}", taxon)
}

#[derive(Clone, Debug)]
pub struct CommunityProblem {
    problem: Problem,
    /// Reaction id to (forward, reverse) variable indices
    reaction_variables: IndexMap<String, (usize, usize)>,
    growth_variables: IndexMap<String, usize>,
    community_variable: usize,
}

impl CommunityProblem {
    /// Build the problem, initially maximizing community growth
    pub fn new(community: &Community) -> Result<Self, ProblemError> {
        let mut problem = Problem::new_maximization();
        let mut balances: IndexMap<&str, (Vec<usize>, Vec<f64>)> = community
            .metabolites()
            .map(|m| (m.metabolite.id.as_str(), (Vec::new(), Vec::new())))
            .collect();
        let mut reaction_variables = IndexMap::with_capacity(community.num_reactions());
        for rxn in community.reactions() {
            let reaction = &rxn.reaction;
            let forward = problem.add_new_variable(
                &reaction.get_forward_id(),
                Some(&reaction.id),
                VariableType::Continuous,
                reaction.get_forward_lower_bound(),
                reaction.get_forward_upper_bound(),
            )?;
            let reverse = problem.add_new_variable(
                &reaction.get_reverse_id(),
                Some(&reaction.id),
                VariableType::Continuous,
                reaction.get_reverse_lower_bound(),
                reaction.get_reverse_upper_bound(),
            )?;
            for (met, coef) in &reaction.metabolites {
                if let Some((variables, coefficients)) = balances.get_mut(met.as_str()) {
                    variables.extend([forward, reverse]);
                    coefficients.extend([*coef, -coef]);
                }
            }
            reaction_variables.insert(reaction.id.clone(), (forward, reverse));
        }
        for (met, (variables, coefficients)) in balances {
            problem.add_new_equality_constraint(met, &variables, &coefficients, 0.)?;
        }

        let mut growth_variables = IndexMap::new();
        for taxon in community.taxa() {
            let growth = problem.add_new_variable(
                &growth_variable_id(&taxon.id),
                None,
                VariableType::Continuous,
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
            let (forward, reverse) = reaction_variables
                .get(&taxon.biomass)
                .copied()
                .ok_or_else(|| ProblemError::NonExistentVariable(taxon.biomass.clone()))?;
            problem.add_new_equality_constraint(
                &format!("growth_balance__{}", taxon.id),
                &[growth, forward, reverse],
                &[1., -1., 1.],
                0.,
            )?;
            growth_variables.insert(taxon.id.clone(), growth);
        }

        let community_variable = problem.add_new_variable(
            COMMUNITY_GROWTH,
            None,
            VariableType::Continuous,
            0.,
            f64::INFINITY,
        )?;
        let mut variables = vec![community_variable];
        let mut coefficients = vec![1.];
        for taxon in community.taxa() {
            if let Some(growth) = growth_variables.get(&taxon.id) {
                variables.push(*growth);
                coefficients.push(-taxon.effective_abundance());
            }
        }
        problem.add_new_equality_constraint(
            COMMUNITY_GROWTH_BALANCE,
            &variables,
            &coefficients,
            0.,
        )?;
        problem.add_new_linear_objective_term(community_variable, 1.)?;
        debug!(
            "community problem for {} has {} variables and {} constraints",
            community.id(),
            problem.num_variables(),
            problem.num_constraints()
        );
        Ok(CommunityProblem {
            problem,
            reaction_variables,
            growth_variables,
            community_variable,
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub(crate) fn problem_mut(&mut self) -> &mut Problem {
        &mut self.problem
    }

    pub fn num_variables(&self) -> usize {
        self.problem.num_variables()
    }

    pub fn growth_variable(&self, taxon: &str) -> Option<usize> {
        self.growth_variables.get(taxon).copied()
    }

    pub fn community_variable(&self) -> usize {
        self.community_variable
    }

    /// (reaction id, forward index, reverse index) for every reaction
    pub fn reaction_variables(&self) -> impl Iterator<Item = (&str, usize, usize)> {
        self.reaction_variables
            .iter()
            .map(|(id, (forward, reverse))| (id.as_str(), *forward, *reverse))
    }

    pub fn set_growth_bounds(&mut self, taxon: &str, lower: f64, upper: f64) -> Result<(), ProblemError> {
        self.problem
            .update_variable_bounds(&growth_variable_id(taxon), lower, upper)
    }

    pub fn set_community_bounds(&mut self, lower: f64, upper: f64) -> Result<(), ProblemError> {
        self.problem
            .update_variable_bounds(COMMUNITY_GROWTH, lower, upper)
    }

    /// Replace the objective by maximizing the growth of one taxon, or of the community
    pub fn maximize_growth(&mut self, taxon: Option<&str>) -> Result<(), ProblemError> {
        let variable = match taxon {
            Some(taxon) => self
                .growth_variable(taxon)
                .ok_or_else(|| ProblemError::NonExistentVariable(growth_variable_id(taxon)))?,
            None => self.community_variable,
        };
        self.problem.remove_all_objective_terms();
        self.problem.update_objective_sense(ObjectiveSense::Maximize);
        self.problem.add_new_linear_objective_term(variable, 1.)
    }

    pub fn solve(&self, choice: SolverChoice, options: &SolverOptions) -> Result<ProblemSolution, SolverError> {
        solvers::solve(&self.problem, choice, options)
    }

    /// Net flux of every reaction, None if the solution carries no point
    pub fn fluxes(&self, solution: &ProblemSolution) -> Option<IndexMap<String, f64>> {
        self.reaction_variables
            .iter()
            .map(|(id, (forward, reverse))| {
                Some((
                    id.clone(),
                    solution.value_at(*forward)? - solution.value_at(*reverse)?,
                ))
            })
            .collect()
    }

    /// Growth rate of every taxon, None if the solution carries no point
    pub fn growth_rates(&self, solution: &ProblemSolution) -> Option<IndexMap<String, f64>> {
        self.growth_variables
            .iter()
            .map(|(id, index)| Some((id.clone(), solution.value_at(*index)?)))
            .collect()
    }

    pub fn community_growth(&self, solution: &ProblemSolution) -> Option<f64> {
        solution.value_at(self.community_variable)
    }
}
