//! Community models merged from the metabolic models of several taxa
//!
//! Every taxon keeps its own namespaced copy of its reactions and metabolites. Taxa only
//! interact through a shared medium compartment `m`, which their exchange reactions are
//! coupled to with the taxon's abundance as coefficient.
pub mod model;
pub mod problem;
pub mod solution;
pub mod taxon;

use thiserror::Error;

pub use model::{Community, CommunityBuilder, CommunityReaction, Owner, ReactionKind};
pub use problem::CommunityProblem;
pub use solution::{CommunitySolution, SolutionWarning};
pub use taxon::{clean_id, Member, MemberBuilder, Taxon};

/// Id of the pseudo owner of medium reactions and metabolites
pub const MEDIUM: &str = "medium";
/// Compartment holding the shared medium metabolites
pub const MEDIUM_COMPARTMENT: &str = "m";

/// Errors raised while building or modifying a community
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("The community has no members")]
    NoTaxa,
    #[error("Taxon id {0:?} is empty after cleaning")]
    InvalidTaxonId(String),
    #[error("Taxon {0} was added twice")]
    DuplicateTaxon(String),
    #[error("No biomass reaction could be detected for taxon {taxon}")]
    MissingBiomass { taxon: String },
    #[error("Taxon {taxon} has invalid abundance {value}, abundances must be positive and finite")]
    InvalidAbundance { taxon: String, value: f64 },
    #[error("No abundance was given for taxon {0}")]
    MissingAbundance(String),
    #[error("Abundances sum to zero")]
    AllZero,
    #[error("Taxon {taxon} has no exchange reactions")]
    NoExchanges { taxon: String },
    #[error("Exchange reaction {reaction} of taxon {taxon} must involve exactly one metabolite")]
    InvalidExchange { taxon: String, reaction: String },
    #[error("Reaction {reaction} references unknown metabolite {metabolite}")]
    UnknownMetabolite { reaction: String, metabolite: String },
    #[error("Unknown taxon {0}")]
    UnknownTaxon(String),
    #[error("Unknown reaction {0}")]
    UnknownReaction(String),
    #[error("Invalid bounds ({lower}, {upper}) for reaction {reaction}")]
    InvalidBounds { reaction: String, lower: f64, upper: f64 },
    #[error("None of the given medium components match a medium exchange")]
    NoMediumMatch,
}
