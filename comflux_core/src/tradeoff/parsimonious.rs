//! Parsimonious fluxes at fixed growth rates
use indexmap::IndexMap;
use log::debug;

use crate::community::problem::CommunityProblem;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::ProblemError;

/// Keep the growth rates within tolerance and minimize the total flux instead
///
/// Every growth rate gets the lower bound `(1 - rtol) * rate - atol`, zero when that drops
/// below `atol`. The objective becomes the sum of all forward and reverse variables, which
/// is the total absolute flux.
pub(crate) fn minimize_total_flux(
    problem: &mut CommunityProblem,
    rates: &IndexMap<String, f64>,
    community_growth: f64,
    atol: f64,
    rtol: f64,
) -> Result<(), ProblemError> {
    for (taxon, rate) in rates {
        let lower = (1. - rtol) * rate - atol;
        let lower = if lower < atol { 0. } else { lower };
        problem.set_growth_bounds(taxon, lower, f64::INFINITY)?;
    }
    let lower = ((1. - rtol) * community_growth - atol).max(0.);
    problem.set_community_bounds(lower, f64::INFINITY)?;
    let variables: Vec<usize> = problem
        .reaction_variables()
        .flat_map(|(_, forward, reverse)| [forward, reverse])
        .collect();
    let inner = problem.problem_mut();
    inner.remove_all_objective_terms();
    inner.update_objective_sense(ObjectiveSense::Minimize);
    for variable in variables {
        inner.add_new_linear_objective_term(variable, 1.)?;
    }
    debug!("minimizing total flux with {} growth rates fixed", rates.len());
    Ok(())
}
