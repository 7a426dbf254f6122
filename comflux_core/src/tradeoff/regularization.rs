//! Choosing one growth rate vector among the many optimal ones
//!
//! The community growth optimum is usually reached by a whole face of growth rate vectors.
//! The regularization objective keeps every taxon as close as possible to its individual
//! maximum, either in the squared or the absolute distance.
use indexmap::IndexMap;
use log::debug;

use crate::community::problem::CommunityProblem;
use crate::configuration::{RegularizationKind, SolverChoice};
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::ProblemError;
use crate::optimize::variable::VariableType;
use crate::tradeoff::TradeoffError;

/// Whether every backend behind a choice can solve quadratic objectives
pub fn supports_quadratic(choice: SolverChoice) -> bool {
    !matches!(choice, SolverChoice::Simplex)
}

/// Resolve the requested regularization against the capabilities of the backend
///
/// Returns [`RegularizationKind::Quadratic`] or [`RegularizationKind::Linear`], never
/// `Auto`.
pub fn select_regularization(
    requested: RegularizationKind,
    quadratic_capable: bool,
) -> Result<RegularizationKind, TradeoffError> {
    match (requested, quadratic_capable) {
        (RegularizationKind::Quadratic | RegularizationKind::Auto, true) => {
            Ok(RegularizationKind::Quadratic)
        }
        (RegularizationKind::Linear, _) | (RegularizationKind::Auto, false) => {
            Ok(RegularizationKind::Linear)
        }
        (RegularizationKind::Quadratic, false) => Err(TradeoffError::UnsupportedRegularization),
    }
}

fn deviation_variable_id(taxon: &str) -> String {
    format!("deviation__{}", taxon)
}

/// Replace the objective by the deviation of the growth rates from `targets`
///
/// Quadratic: `scale * sum (mu_t - target_t)^2`, expanded without its constant.
/// Linear: `scale * sum d_t` with `d_t >= |mu_t - target_t|` through two rows per taxon.
/// The deviation variables of the linear form are created once and re-targeted on later
/// calls.
pub(crate) fn apply_regularization(
    problem: &mut CommunityProblem,
    kind: RegularizationKind,
    targets: &IndexMap<String, f64>,
    scale: f64,
) -> Result<(), ProblemError> {
    let growth: Vec<(String, usize, f64)> = targets
        .iter()
        .map(|(taxon, target)| {
            problem
                .growth_variable(taxon)
                .map(|index| (taxon.clone(), index, *target))
                .ok_or_else(|| ProblemError::NonExistentVariable(taxon.clone()))
        })
        .collect::<Result<_, _>>()?;
    let inner = problem.problem_mut();
    inner.remove_all_objective_terms();
    inner.update_objective_sense(ObjectiveSense::Minimize);
    for (taxon, index, target) in growth {
        match kind {
            RegularizationKind::Linear => {
                let id = deviation_variable_id(&taxon);
                let above = format!("{}_above", id);
                let below = format!("{}_below", id);
                let deviation = match inner.variable_index(&id) {
                    Some(deviation) => {
                        inner.update_constraint_bounds(&above, target, f64::INFINITY)?;
                        inner.update_constraint_bounds(&below, -target, f64::INFINITY)?;
                        deviation
                    }
                    None => {
                        let deviation =
                            inner.add_new_variable(&id, None, VariableType::Continuous, 0., f64::INFINITY)?;
                        inner.add_new_inequality_constraint(
                            &above,
                            &[deviation, index],
                            &[1., 1.],
                            target,
                            f64::INFINITY,
                        )?;
                        inner.add_new_inequality_constraint(
                            &below,
                            &[deviation, index],
                            &[1., -1.],
                            -target,
                            f64::INFINITY,
                        )?;
                        deviation
                    }
                };
                inner.add_new_linear_objective_term(deviation, scale)?;
            }
            _ => {
                inner.add_new_quadratic_objective_term(index, index, scale)?;
                inner.add_new_linear_objective_term(index, -2. * scale * target)?;
            }
        }
    }
    debug!("regularizing {} growth rates with {:?} deviations", targets.len(), kind);
    Ok(())
}
