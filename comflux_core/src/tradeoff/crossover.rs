//! Moves a regularized solution onto a vertex of the feasible polytope
//!
//! Interior point and first order solutions of the regularized problem sit inside the
//! optimal face. Capping every growth rate at its regularized value and maximizing
//! community growth again on a vertex seeking backend returns a basic solution with the
//! same growth rates.
use indexmap::IndexMap;
use log::{debug, info};

use crate::community::problem::CommunityProblem;
use crate::configuration::SolverChoice;
use crate::optimize::solvers::{Backend, SolverOptions};
use crate::optimize::ProblemSolution;
use crate::tradeoff::{solve_stage, Stage, TradeoffError};

/// The solver used for crossover, the simplex when compiled in
pub fn crossover_choice() -> SolverChoice {
    if Backend::Simplex.is_available() {
        SolverChoice::Simplex
    } else {
        SolverChoice::Robust
    }
}

/// Re-solve for a vertex with growth rates capped at `rates`
///
/// `floors` keep their lower bounds, taxa without a floor are only capped. The community
/// growth may not exceed `community_growth + atol`.
pub(crate) fn crossover(
    problem: &mut CommunityProblem,
    rates: &IndexMap<String, f64>,
    floors: &IndexMap<String, f64>,
    community_growth: f64,
    atol: f64,
    options: &SolverOptions,
) -> Result<ProblemSolution, TradeoffError> {
    let choice = crossover_choice();
    info!("starting crossover with {:?}", choice);
    for (taxon, rate) in rates {
        let lower = floors.get(taxon).copied().unwrap_or(f64::NEG_INFINITY);
        problem.set_growth_bounds(taxon, lower, rate.max(lower))?;
    }
    problem.set_community_bounds(0., community_growth.max(0.) + atol)?;
    problem.maximize_growth(None)?;
    let solution = solve_stage(problem, choice, options, Stage::Crossover, None)?;
    debug!("crossover finished with {}", solution.status);
    Ok(solution)
}

/// Largest absolute change between two growth rate vectors
pub(crate) fn max_rate_change(before: &IndexMap<String, f64>, after: &IndexMap<String, f64>) -> f64 {
    before
        .iter()
        .map(|(taxon, rate)| (after.get(taxon).copied().unwrap_or(0.) - rate).abs())
        .fold(0., f64::max)
}
