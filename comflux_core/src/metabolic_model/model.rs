//! This module provides the Model struct for representing an entire metabolic model
use indexmap::IndexMap;
use log::warn;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

/// Represents a Genome Scale Metabolic Model of a single organism
///
/// This is the record a model loader hands to the community builder: reactions with
/// bounds and stoichiometry, the metabolites they reference, and optionally explicit
/// designations of the biomass and exchange reactions.
#[derive(Clone, Debug, Default)]
pub struct Model {
    /// Map of reaction ids to Reaction Objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of metabolite ids to Metabolite Objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to objective function coefficients
    pub objective: IndexMap<String, f64>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
    /// Explicitly designated biomass reaction, detected from the objective if None
    pub biomass_reaction: Option<String>,
    /// Explicitly designated exchange reactions, detected from the boundary if empty
    pub exchange_reactions: Vec<String>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model::default()
    }

    /// Create an empty model with an id
    pub fn new(id: &str) -> Self {
        Model {
            id: Some(id.to_string()),
            ..Model::default()
        }
    }

    /// Add a reaction to the model
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use comflux_core::metabolic_model::model::Model;
    /// use comflux_core::metabolic_model::reaction::ReactionBuilder;
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction").build().unwrap();
    /// model.add_reaction(new_reaction);
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a metabolite to the model
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    /// Make a single reaction the objective of the model
    pub fn set_objective(&mut self, reaction_id: &str) {
        self.objective.clear();
        self.objective.insert(reaction_id.to_string(), 1.0);
    }

    /// Find the biomass reaction of the model
    ///
    /// Uses the explicit designation if present, then the single reaction carrying a
    /// non-zero objective coefficient, and finally a unique reaction whose id looks like
    /// a biomass reaction.
    pub fn biomass(&self) -> Option<&Reaction> {
        if let Some(id) = &self.biomass_reaction {
            return self.reactions.get(id);
        }
        let mut objective = self.objective.iter().filter(|(_, coef)| **coef != 0.);
        if let (Some((id, _)), None) = (objective.next(), objective.next()) {
            return self.reactions.get(id);
        }
        let mut candidates = self
            .reactions
            .values()
            .filter(|r| r.looks_like_biomass() && !r.is_boundary());
        match (candidates.next(), candidates.next()) {
            (Some(rxn), None) => Some(rxn),
            _ => None,
        }
    }

    /// The compartment holding the extracellular metabolites
    ///
    /// Picks `e` when present among boundary metabolites, otherwise the compartment most
    /// boundary reactions touch.
    pub fn external_compartment(&self) -> Option<String> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for rxn in self.reactions.values().filter(|r| r.is_boundary()) {
            let Some(met_id) = rxn.metabolites.keys().next() else {
                continue;
            };
            if let Some(compartment) = self
                .metabolites
                .get(met_id)
                .and_then(|m| m.compartment.clone())
            {
                *counts.entry(compartment).or_insert(0) += 1;
            }
        }
        if counts.contains_key("e") {
            return Some("e".to_string());
        }
        counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(compartment, _)| compartment)
    }

    /// Find the exchange reactions of the model
    ///
    /// Uses the explicit designation if present. Otherwise every boundary reaction in
    /// the external compartment that is not the biomass reaction counts as an exchange.
    pub fn exchanges(&self) -> Vec<&Reaction> {
        if !self.exchange_reactions.is_empty() {
            return self
                .exchange_reactions
                .iter()
                .filter_map(|id| self.reactions.get(id))
                .collect();
        }
        let external = self.external_compartment();
        let biomass = self.biomass().map(|r| r.id.clone());
        self.reactions
            .values()
            .filter(|r| r.is_boundary())
            .filter(|r| Some(&r.id) != biomass.as_ref() && !r.looks_like_biomass())
            .filter(|r| {
                let compartment = r
                    .metabolites
                    .keys()
                    .next()
                    .and_then(|m| self.metabolites.get(m))
                    .and_then(|m| m.compartment.clone());
                match (&external, compartment) {
                    (Some(ext), Some(comp)) => *ext == comp,
                    (None, _) => true,
                    (Some(_), None) => true,
                }
            })
            .collect()
    }

    /// Relax demand or sink reactions that force flux out of or into the model
    ///
    /// Forced boundary fluxes interfere with growth rate estimation, so their non-zero
    /// bound is reset to zero. Returns the ids of adjusted reactions.
    pub fn fix_demands(&mut self, tolerance: f64) -> Vec<String> {
        let mut adjusted = Vec::new();
        for rxn in self.reactions.values_mut().filter(|r| r.is_boundary()) {
            let all_reactants = rxn.reactants().count() == rxn.metabolites.len();
            let all_products = rxn.products().count() == rxn.metabolites.len();
            if all_reactants && rxn.lower_bound > tolerance {
                rxn.lower_bound = 0.0;
                adjusted.push(rxn.id.clone());
            } else if all_products && rxn.upper_bound < -tolerance {
                rxn.upper_bound = 0.0;
                adjusted.push(rxn.id.clone());
            }
        }
        if !adjusted.is_empty() {
            warn!(
                "relaxed forced sinks or demands in {}: {}",
                self.id.as_deref().unwrap_or("unnamed model"),
                adjusted.join(", ")
            );
        }
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn toy_model() -> Model {
        let mut model = Model::new("toy");
        for (id, comp) in [("glc_e", "e"), ("glc_c", "c"), ("ac_e", "e")] {
            model.add_metabolite(
                MetaboliteBuilder::default()
                    .id(id)
                    .compartment(comp)
                    .build()
                    .unwrap(),
            );
        }
        model.add_reaction(
            ReactionBuilder::default()
                .id("EX_glc_e")
                .metabolites(IndexMap::from([("glc_e".to_string(), -1.)]))
                .lower_bound(-10.)
                .build()
                .unwrap(),
        );
        model.add_reaction(
            ReactionBuilder::default()
                .id("EX_ac_e")
                .metabolites(IndexMap::from([("ac_e".to_string(), -1.)]))
                .lower_bound(0.)
                .build()
                .unwrap(),
        );
        model.add_reaction(
            ReactionBuilder::default()
                .id("GLCt")
                .metabolites(IndexMap::from([
                    ("glc_e".to_string(), -1.),
                    ("glc_c".to_string(), 1.),
                ]))
                .build()
                .unwrap(),
        );
        model.add_reaction(
            ReactionBuilder::default()
                .id("Growth")
                .metabolites(IndexMap::from([("glc_c".to_string(), -1.)]))
                .lower_bound(0.)
                .build()
                .unwrap(),
        );
        model
    }

    #[test]
    fn biomass_from_objective() {
        let mut model = toy_model();
        model.set_objective("Growth");
        assert_eq!(model.biomass().unwrap().id, "Growth");
    }

    #[test]
    fn biomass_designation_wins() {
        let mut model = toy_model();
        model.set_objective("GLCt");
        model.biomass_reaction = Some("Growth".to_string());
        assert_eq!(model.biomass().unwrap().id, "Growth");
    }

    #[test]
    fn exchanges_skip_biomass() {
        let mut model = toy_model();
        model.set_objective("Growth");
        let exchanges: Vec<_> = model.exchanges().iter().map(|r| r.id.clone()).collect();
        assert_eq!(exchanges, vec!["EX_glc_e", "EX_ac_e"]);
        assert_eq!(model.external_compartment().as_deref(), Some("e"));
    }

    #[test]
    fn forced_demands_are_relaxed() {
        let mut model = toy_model();
        model.reactions.get_mut("EX_ac_e").unwrap().lower_bound = 1.0;
        let adjusted = model.fix_demands(1e-6);
        assert_eq!(adjusted, vec!["EX_ac_e"]);
        assert_eq!(model.reactions["EX_ac_e"].lower_bound, 0.0);
    }
}
