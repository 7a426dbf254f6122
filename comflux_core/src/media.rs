//! Minimal growth media for communities
//!
//! A minimal medium is the medium that still allows a given community growth rate (and
//! minimal individual growth rates) while requiring either the smallest total import flux
//! or the smallest number of imported components.
use derive_builder::Builder;
use indexmap::IndexMap;
use log::{info, warn};
use thiserror::Error;

use crate::community::model::Community;
use crate::community::problem::CommunityProblem;
use crate::community::solution::CommunitySolution;
use crate::community::ModelError;
use crate::configuration::{Configuration, SolverChoice};
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::ProblemError;
use crate::optimize::solvers::SolverError;
use crate::optimize::variable::VariableType;
use crate::optimize::OptimizationStatus;
use crate::tradeoff::MinGrowth;

/// Import bound of every medium exchange when exchanges are opened without a value
pub const DEFAULT_OPEN_BOUND: f64 = 1000.;

/// Options for [`minimal_medium`]
#[derive(Builder, Clone, Debug, PartialEq)]
pub struct MinimalMediumOptions {
    /// Minimal growth rate of every taxon that is not knocked out
    #[builder(default)]
    pub min_growth: MinGrowth,
    /// Report exports as negative entries of the medium
    #[builder(default = "false")]
    pub exports: bool,
    /// Minimize the number of imported components instead of the total import flux
    #[builder(default = "false")]
    pub minimize_components: bool,
    /// Open all medium exchanges to `(-bound, bound)` before minimizing
    #[builder(setter(strip_option), default = "None")]
    pub open_exchanges: Option<f64>,
    /// Weight of every medium exchange in the total import flux, missing ones weigh 1
    #[builder(setter(strip_option), default = "None")]
    pub weights: Option<IndexMap<String, f64>>,
}

impl Default for MinimalMediumOptions {
    fn default() -> Self {
        MinimalMediumOptions {
            min_growth: MinGrowth::default(),
            exports: false,
            minimize_components: false,
            open_exchanges: None,
            weights: None,
        }
    }
}

/// A minimal medium together with the community solution growing on it
#[derive(Clone, Debug, PartialEq)]
pub struct MinimalMedium {
    /// {medium exchange id: import flux}, exports negative
    pub medium: IndexMap<String, f64>,
    pub solution: CommunitySolution,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediumError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("Community growth must be non-negative and finite, got {0}")]
    InvalidGrowth(f64),
    #[error("Weight of {0} must be positive and finite")]
    InvalidWeight(String),
    #[error("No medium of {community} allows a community growth rate of {growth}")]
    Infeasible { community: String, growth: f64 },
    #[error("Minimizing the medium of {community} ended with status {status}")]
    Unsuccessful {
        community: String,
        status: OptimizationStatus,
    },
}

/// Find the minimal medium of `community` for a community growth rate of `community_growth`
///
/// The community itself is not modified. Component minimization adds one binary indicator
/// per medium exchange and therefore needs the simplex backend.
pub fn minimal_medium(
    community: &Community,
    community_growth: f64,
    options: &MinimalMediumOptions,
    config: &Configuration,
) -> Result<MinimalMedium, MediumError> {
    if !(community_growth >= 0. && community_growth.is_finite()) {
        return Err(MediumError::InvalidGrowth(community_growth));
    }
    info!("calculating minimal medium for {}", community.id());
    let mut com = community.clone();
    if let Some(bound) = options.open_exchanges {
        com.open_exchanges(bound);
    }
    let mut problem = CommunityProblem::new(&com)?;
    let (atol, rtol) = config.tolerances(problem.num_variables());

    problem.set_community_bounds(community_growth, f64::INFINITY)?;
    for taxon in com.taxa().filter(|t| !t.knocked_out) {
        let lower = (1. - rtol) * options.min_growth.for_taxon(&taxon.id) - atol;
        let lower = if lower < atol { 0. } else { lower };
        problem.set_growth_bounds(&taxon.id, lower, f64::INFINITY)?;
    }

    let exchange_ids: Vec<String> = com.medium_exchanges().map(|r| r.reaction.id.clone()).collect();
    let imports: Vec<(String, usize)> = problem
        .reaction_variables()
        .filter(|(id, _, _)| exchange_ids.iter().any(|e| e.as_str() == *id))
        .map(|(id, _, reverse)| (id.to_string(), reverse))
        .collect();

    let choice = if options.minimize_components {
        add_component_objective(&mut problem, &com, &imports)?;
        SolverChoice::Simplex
    } else {
        add_flux_objective(&mut problem, &imports, options.weights.as_ref())?;
        config.solver
    };
    let solver_options = config.solver_options(problem.num_variables());
    let solution = problem.solve(choice, &solver_options)?;
    match solution.status {
        status if status.has_solution() => {}
        OptimizationStatus::Infeasible => {
            warn!("minimization of the medium of {} was unsuccessful", com.id());
            return Err(MediumError::Infeasible {
                community: com.id().to_string(),
                growth: community_growth,
            });
        }
        status => {
            return Err(MediumError::Unsuccessful {
                community: com.id().to_string(),
                status,
            })
        }
    }

    let result = CommunitySolution::from_problem(&com, &problem, &solution, atol, rtol, true).ok_or_else(
        || MediumError::Unsuccessful {
            community: com.id().to_string(),
            status: solution.status,
        },
    )?;
    let mut medium = IndexMap::new();
    if let Some(fluxes) = &result.fluxes {
        for id in &exchange_ids {
            let flux = fluxes.get(id).copied().unwrap_or(0.);
            if flux.abs() < atol || (flux > 0. && !options.exports) {
                continue;
            }
            medium.insert(id.clone(), -flux);
        }
    }
    info!("minimal medium of {} has {} components", com.id(), medium.len());
    Ok(MinimalMedium {
        medium,
        solution: result,
    })
}

/// Minimize the weighted sum of import fluxes
fn add_flux_objective(
    problem: &mut CommunityProblem,
    imports: &[(String, usize)],
    weights: Option<&IndexMap<String, f64>>,
) -> Result<(), MediumError> {
    let inner = problem.problem_mut();
    inner.remove_all_objective_terms();
    inner.update_objective_sense(ObjectiveSense::Minimize);
    for (id, reverse) in imports {
        let weight = weights.and_then(|w| w.get(id)).copied().unwrap_or(1.);
        if !(weight > 0. && weight.is_finite()) {
            return Err(MediumError::InvalidWeight(id.clone()));
        }
        inner.add_new_linear_objective_term(*reverse, weight)?;
    }
    Ok(())
}

/// Minimize the number of medium exchanges carrying import flux
///
/// Each import variable is tied to a binary indicator through `import - M * indicator <= 0`
/// where M is the largest finite medium exchange bound.
fn add_component_objective(
    problem: &mut CommunityProblem,
    community: &Community,
    imports: &[(String, usize)],
) -> Result<(), MediumError> {
    let big_m = community
        .medium_exchanges()
        .flat_map(|r| [r.reaction.lower_bound.abs(), r.reaction.upper_bound.abs()])
        .filter(|b| b.is_finite())
        .fold(0., f64::max);
    let big_m = if big_m > 0. { big_m } else { DEFAULT_OPEN_BOUND };
    if problem.num_variables() > 10_000 {
        warn!("minimizing medium components is slow for problems with more than 10000 variables");
    }
    let inner = problem.problem_mut();
    inner.remove_all_objective_terms();
    inner.update_objective_sense(ObjectiveSense::Minimize);
    for (id, reverse) in imports {
        let indicator = inner.add_new_variable(
            &format!("ind__{}", id),
            None,
            VariableType::Binary,
            0.,
            1.,
        )?;
        inner.add_new_inequality_constraint(
            &format!("ind_constraint__{}", id),
            &[*reverse, indicator],
            &[1., -big_m],
            f64::NEG_INFINITY,
            0.,
        )?;
        inner.add_new_linear_objective_term(indicator, 1.)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::model::tests::pair;
    use crate::configuration::ConfigurationBuilder;

    fn robust() -> Configuration {
        ConfigurationBuilder::default()
            .solver(SolverChoice::Robust)
            .build()
            .unwrap()
    }

    #[test]
    fn smallest_total_import() {
        let community = pair();
        let options = MinimalMediumOptions::default();
        let result = minimal_medium(&community, 2., &options, &robust()).unwrap();
        // a community growth of 2 needs 2 units of glucose
        assert_eq!(result.medium.len(), 1);
        assert!((result.medium["EX_glc_m"] - 2.).abs() < 1e-4);
        assert!(result.solution.growth_rate >= 2. - 1e-4);
        // the community itself keeps its medium
        assert_eq!(community.medium()["EX_glc_m"], 10.);
    }

    #[test]
    fn min_growth_raises_imports() {
        let community = pair();
        let options = MinimalMediumOptionsBuilder::default()
            .min_growth(MinGrowth::Uniform(4.))
            .build()
            .unwrap();
        let result = minimal_medium(&community, 0., &options, &robust()).unwrap();
        // both taxa at 4 need 0.25 * 4 + 0.75 * 4 units
        assert!((result.medium["EX_glc_m"] - 4.).abs() < 1e-4);
    }

    #[test]
    fn unreachable_growth() {
        let community = pair();
        let res = minimal_medium(&community, 20., &MinimalMediumOptions::default(), &robust());
        assert!(matches!(res, Err(MediumError::Infeasible { .. })));
        let opened = MinimalMediumOptionsBuilder::default()
            .open_exchanges(DEFAULT_OPEN_BOUND)
            .build()
            .unwrap();
        // growth is still capped at 10 by the biomass reactions
        let res = minimal_medium(&community, 20., &opened, &robust());
        assert!(matches!(res, Err(MediumError::Infeasible { .. })));
        assert!(matches!(
            minimal_medium(&community, -1., &opened, &robust()),
            Err(MediumError::InvalidGrowth(_))
        ));
    }

    #[cfg(feature = "minilp")]
    #[test]
    fn fewest_components() {
        let community = pair();
        let options = MinimalMediumOptionsBuilder::default()
            .minimize_components(true)
            .build()
            .unwrap();
        let result = minimal_medium(&community, 1., &options, &robust()).unwrap();
        assert_eq!(result.medium.len(), 1);
        assert!(result.medium["EX_glc_m"] >= 1. - 1e-4);
    }
}
