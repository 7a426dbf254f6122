//! This module provides a struct for representing reactions
use crate::utils::hashing::hash_as_hex_string;
use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Default lower flux bound for reactions built without an explicit bound
pub const DEFAULT_LOWER_BOUND: f64 = -1000.;
/// Default upper flux bound for reactions built without an explicit bound
pub const DEFAULT_UPPER_BOUND: f64 = 1000.;

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Used to identify the reaction
    #[builder(setter(into))]
    pub id: String,
    /// Metabolite stoichiometry of the reaction
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(setter(into, strip_option), default = "None")]
    pub name: Option<String>,
    /// Lower flux bound
    #[builder(default = "DEFAULT_LOWER_BOUND")]
    pub lower_bound: f64,
    /// Upper flux bound
    #[builder(default = "DEFAULT_UPPER_BOUND")]
    pub upper_bound: f64,
    /// Reaction subsystem
    #[builder(setter(into, strip_option), default = "None")]
    pub subsystem: Option<String>,
    /// Reaction Activity
    #[builder(default = "ReactionActivity::Active")]
    pub activity: ReactionActivity,
}

impl Reaction {
    /// Determine the id to be associated with the forward reaction in the optimization problem
    ///
    /// # Note:
    /// The forward id is "{reaction_id}_forward"
    pub fn get_forward_id(&self) -> String {
        format!("{}_forward", &self.id)
    }

    /// Determine the id to be associated with the reverse reaction in the optimization problem
    ///
    /// # Note:
    /// The reverse id is "{reaction_id}_reverse_{hexidecimal hash of reaction_id}"
    pub fn get_reverse_id(&self) -> String {
        format!("{}_reverse_{}", &self.id, hash_as_hex_string(&self.id))
    }

    /// Determine the upper bound of the variable associated with the forward reaction
    pub(crate) fn get_forward_upper_bound(&self) -> f64 {
        match self.activity {
            ReactionActivity::Active => self.upper_bound.max(0f64),
            ReactionActivity::Inactive => 0f64,
        }
    }

    /// Determine the lower bound of the variable associated with the forward reaction
    pub(crate) fn get_forward_lower_bound(&self) -> f64 {
        match self.activity {
            ReactionActivity::Active => self.lower_bound.max(0f64),
            ReactionActivity::Inactive => 0f64,
        }
    }

    /// Determine the upper bound of the variable associated with the reverse reaction
    pub(crate) fn get_reverse_upper_bound(&self) -> f64 {
        match self.activity {
            ReactionActivity::Active => (-self.lower_bound).max(0f64),
            ReactionActivity::Inactive => 0f64,
        }
    }

    /// Determine the lower bound of the variable associated with the reverse reaction
    pub(crate) fn get_reverse_lower_bound(&self) -> f64 {
        match self.activity {
            ReactionActivity::Active => (-self.upper_bound).max(0f64),
            ReactionActivity::Inactive => 0f64,
        }
    }

    /// Whether the reaction only touches a single metabolite (an exchange, demand or sink)
    pub fn is_boundary(&self) -> bool {
        self.metabolites.len() == 1
    }

    /// Whether the id looks like a biomass reaction
    pub fn looks_like_biomass(&self) -> bool {
        let id = self.id.to_lowercase();
        id.contains("biomass") || id.contains("growth")
    }

    /// Prevent the reaction from carrying any flux
    ///
    /// The bounds are left untouched, so re-activating the reaction restores them.
    pub fn knock_out(&mut self) {
        self.activity = ReactionActivity::Inactive;
    }

    /// Metabolites consumed by the reaction
    pub fn reactants(&self) -> impl Iterator<Item = &String> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef < 0.)
            .map(|(id, _)| id)
    }

    /// Metabolites produced by the reaction
    pub fn products(&self) -> impl Iterator<Item = &String> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef > 0.)
            .map(|(id, _)| id)
    }
}

/// Whether a Reaction is active or inactive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionActivity {
    /// The Reaction is active and can carry flux
    Active,
    /// The Reaction is inactive and can't carry flux
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reversible() -> Reaction {
        ReactionBuilder::default()
            .id("PGI")
            .metabolites(IndexMap::from([("g6p_c".to_string(), -1.), ("f6p_c".to_string(), 1.)]))
            .lower_bound(-10.)
            .upper_bound(20.)
            .build()
            .unwrap()
    }

    #[test]
    fn split_bounds() {
        let rxn = reversible();
        assert_eq!(rxn.get_forward_lower_bound(), 0.);
        assert_eq!(rxn.get_forward_upper_bound(), 20.);
        assert_eq!(rxn.get_reverse_lower_bound(), 0.);
        assert_eq!(rxn.get_reverse_upper_bound(), 10.);
    }

    #[test]
    fn forced_flux_bounds() {
        let rxn = ReactionBuilder::default()
            .id("ATPM")
            .lower_bound(8.39)
            .upper_bound(1000.)
            .build()
            .unwrap();
        assert_eq!(rxn.get_forward_lower_bound(), 8.39);
        assert_eq!(rxn.get_reverse_upper_bound(), 0.);
    }

    #[test]
    fn knocked_out_reaction_has_no_flux() {
        let mut rxn = reversible();
        rxn.knock_out();
        assert_eq!(rxn.get_forward_upper_bound(), 0.);
        assert_eq!(rxn.get_reverse_upper_bound(), 0.);
        // bounds survive for later restoring
        assert_eq!(rxn.lower_bound, -10.);
    }

    #[test]
    fn variable_ids_differ() {
        let rxn = reversible();
        assert_eq!(rxn.get_forward_id(), "PGI_forward");
        assert!(rxn.get_reverse_id().starts_with("PGI_reverse_"));
    }

    #[test]
    fn reactants_and_products() {
        let rxn = reversible();
        assert_eq!(rxn.reactants().collect::<Vec<_>>(), vec!["g6p_c"]);
        assert_eq!(rxn.products().collect::<Vec<_>>(), vec!["f6p_c"]);
        assert!(!rxn.is_boundary());
    }
}
