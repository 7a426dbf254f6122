//! Elasticities of reaction fluxes with respect to the medium and taxon abundances
//!
//! Effectors are perturbed by a factor of `exp(STEP)` and the elasticity of a flux `v` is
//! the finite difference `(ln(|v_after| + 1e-6) - ln(|v_before| + 1e-6)) / STEP`.
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::community::model::Community;
use crate::community::ModelError;
use crate::configuration::Configuration;
use crate::tradeoff::{Tradeoff, TradeoffError};

/// Perturbation size in log space
pub const STEP: f64 = 0.1;
/// Fluxes within this distance from zero count as zero
const FLUX_THRESHOLD: f64 = 1e-6;

/// The kind of parameter that was perturbed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectorKind {
    /// Import bound of a medium exchange
    Exchanges,
    /// Abundance of a taxon
    Abundance,
}

/// Direction a response flux runs in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxDirection {
    Forward,
    Reverse,
    Zero,
}

/// One elasticity coefficient
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elasticity {
    /// Id of the response reaction in its original model
    pub reaction: String,
    /// Owner of the response reaction, `medium` for medium exchanges
    pub taxon: String,
    /// Id of the perturbed medium exchange or taxon
    pub effector: String,
    pub direction: FluxDirection,
    pub elasticity: f64,
    pub kind: EffectorKind,
}

fn direction(before: f64, after: f64) -> FluxDirection {
    if before < -FLUX_THRESHOLD || after < -FLUX_THRESHOLD {
        FluxDirection::Reverse
    } else if before > FLUX_THRESHOLD || after > FLUX_THRESHOLD {
        FluxDirection::Forward
    } else {
        FluxDirection::Zero
    }
}

fn derivative(before: f64, after: f64) -> f64 {
    ((after.abs() + FLUX_THRESHOLD).ln() - (before.abs() + FLUX_THRESHOLD).ln()) / STEP
}

/// Runs the tradeoff and keeps the fluxes of the response reactions
struct Responses<'a> {
    tradeoff: Tradeoff,
    fraction: f64,
    reactions: &'a [String],
}

impl Responses<'_> {
    fn fluxes(&mut self, community: &Community) -> Result<Vec<f64>, TradeoffError> {
        let solution = self.tradeoff.run(community, self.fraction)?;
        let fluxes = solution.fluxes.unwrap_or_default();
        Ok(self
            .reactions
            .iter()
            .map(|id| fluxes.get(id).copied().unwrap_or(0.))
            .collect())
    }

    fn coefficients(
        &self,
        community: &Community,
        before: &[f64],
        after: &[f64],
        effector: &str,
        kind: EffectorKind,
    ) -> Vec<Elasticity> {
        let flipped = before
            .iter()
            .zip(after)
            .filter(|(b, a)| {
                (**b > FLUX_THRESHOLD && **a < -FLUX_THRESHOLD)
                    || (**b < -FLUX_THRESHOLD && **a > FLUX_THRESHOLD)
            })
            .count();
        if flipped > 0 {
            warn!("{} fluxes changed sign when perturbing {}", flipped, effector);
        }
        self.reactions
            .iter()
            .zip(before.iter().zip(after))
            .filter_map(|(id, (b, a))| {
                let rxn = community.reaction(id)?;
                Some(Elasticity {
                    reaction: rxn.global_id.clone(),
                    taxon: rxn.owner.id().to_string(),
                    effector: effector.to_string(),
                    direction: direction(*b, *a),
                    elasticity: derivative(*b, *a),
                    kind,
                })
            })
            .collect()
    }
}

/// Elasticities of the response fluxes with respect to every medium import in use
fn by_medium(
    responses: &mut Responses,
    community: &Community,
    imports: &IndexMap<String, f64>,
    before: &[f64],
) -> Result<Vec<Elasticity>, TradeoffError> {
    let mut results = Vec::new();
    for (id, flux) in imports {
        if *flux >= -FLUX_THRESHOLD {
            continue;
        }
        let mut perturbed = community.clone();
        let rxn = &community
            .reaction(id)
            .ok_or_else(|| ModelError::UnknownReaction(id.clone()))?
            .reaction;
        perturbed.set_reaction_bounds(id, rxn.lower_bound * STEP.exp(), rxn.upper_bound)?;
        debug!("perturbing import of {}", id);
        let after = responses.fluxes(&perturbed)?;
        results.extend(responses.coefficients(community, before, &after, id, EffectorKind::Exchanges));
    }
    Ok(results)
}

/// Elasticities of the response fluxes with respect to every taxon abundance
fn by_abundance(
    responses: &mut Responses,
    community: &Community,
    before: &[f64],
) -> Result<Vec<Elasticity>, TradeoffError> {
    let abundances = community.abundances();
    let mut results = Vec::new();
    for taxon in abundances.keys() {
        let mut values = abundances.clone();
        if let Some(value) = values.get_mut(taxon) {
            *value *= STEP.exp();
        }
        let mut perturbed = community.clone();
        perturbed.set_abundances(&values, false)?;
        debug!("perturbing abundance of {}", taxon);
        let after = responses.fluxes(&perturbed)?;
        results.extend(responses.coefficients(community, before, &after, taxon, EffectorKind::Abundance));
    }
    Ok(results)
}

/// Elasticities of `reactions` (all reactions when None) under the tradeoff at `fraction`
///
/// Medium effectors are the medium exchanges importing more than `1e-6` in the
/// unperturbed solution, abundance effectors are all taxa.
pub fn elasticities(
    community: &Community,
    fraction: f64,
    reactions: Option<&[&str]>,
    config: &Configuration,
) -> Result<Vec<Elasticity>, TradeoffError> {
    let reactions: Vec<String> = match reactions {
        Some(ids) => ids
            .iter()
            .map(|id| match community.reaction(id) {
                Some(_) => Ok(id.to_string()),
                None => Err(ModelError::UnknownReaction(id.to_string())),
            })
            .collect::<Result<_, _>>()?,
        None => community.reactions().map(|r| r.reaction.id.clone()).collect(),
    };
    info!(
        "calculating elasticities of {} reactions in {}",
        reactions.len(),
        community.id()
    );
    let mut responses = Responses {
        tradeoff: Tradeoff::new(config.clone()).with_fluxes(true),
        fraction,
        reactions: &reactions,
    };
    let base = responses.tradeoff.run(community, fraction)?;
    let fluxes = base.fluxes.unwrap_or_default();
    let before: Vec<f64> = reactions
        .iter()
        .map(|id| fluxes.get(id).copied().unwrap_or(0.))
        .collect();
    let imports: IndexMap<String, f64> = community
        .medium_exchanges()
        .map(|r| (r.reaction.id.clone(), fluxes.get(&r.reaction.id).copied().unwrap_or(0.)))
        .collect();

    let mut results = by_medium(&mut responses, community, &imports, &before)?;
    results.extend(by_abundance(&mut responses, community, &before)?);
    Ok(results)
}
