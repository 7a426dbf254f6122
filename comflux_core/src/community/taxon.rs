//! Members of a community
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::metabolic_model::model::Model;

/// A model contributed to a community together with its abundance
///
/// # Examples
/// ```rust
/// use comflux_core::community::taxon::MemberBuilder;
/// use comflux_core::metabolic_model::model::Model;
/// let member = MemberBuilder::default()
///     .id("E. coli")
///     .model(Model::new("e_coli_core"))
///     .abundance(0.3)
///     .build()
///     .unwrap();
/// assert_eq!(member.abundance, 0.3);
/// ```
#[derive(Builder, Clone, Debug)]
pub struct Member {
    /// Identifier of the taxon, cleaned before use
    #[builder(setter(into))]
    pub id: String,
    /// Metabolic model of the taxon
    pub model: Model,
    /// Relative abundance, normalized by the community
    #[builder(default = "1.0")]
    pub abundance: f64,
}

/// Which direction an internal exchange points in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeDirection {
    /// The taxon's exchange consumed its metabolite, positive flux moves it into the medium
    Export,
    /// The taxon's exchange produced its metabolite, positive flux moves it out of the medium
    Import,
}

impl ExchangeDirection {
    /// Sign of the abundance coefficient on the medium metabolite
    pub fn sign(&self) -> f64 {
        match self {
            ExchangeDirection::Export => 1.,
            ExchangeDirection::Import => -1.,
        }
    }
}

/// Connects a taxon's external compartment with the shared medium
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternalExchange {
    pub reaction: String,
    pub medium_metabolite: String,
    pub direction: ExchangeDirection,
}

/// One organism inside a community
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: String,
    /// Normalized relative abundance
    pub abundance: f64,
    /// Namespaced id of the biomass reaction
    pub biomass: String,
    /// Namespaced ids of all reactions of the taxon, internal exchanges included
    pub reactions: Vec<String>,
    /// Namespaced ids of all metabolites of the taxon
    pub metabolites: Vec<String>,
    pub exchanges: Vec<InternalExchange>,
    /// Compartment of the original model that faced the environment
    pub external_compartment: String,
    /// Whether every reaction of the taxon has been knocked out
    pub knocked_out: bool,
}

impl Taxon {
    /// Abundance entering the community objective, zero once knocked out
    pub fn effective_abundance(&self) -> f64 {
        if self.knocked_out {
            0.
        } else {
            self.abundance
        }
    }
}

/// Replace every run of characters outside `[A-Za-z0-9_]` by a single underscore
pub fn clean_id(id: &str) -> String {
    let mut cleaned = String::with_capacity(id.len());
    let mut in_run = false;
    for c in id.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            cleaned.push(c);
            in_run = false;
        } else if !in_run {
            cleaned.push('_');
            in_run = true;
        }
    }
    cleaned
}

/// Suffix appended to the reaction, metabolite and compartment ids of a taxon
pub fn namespace_suffix(taxon: &str) -> String {
    format!("__{}", taxon)
}
