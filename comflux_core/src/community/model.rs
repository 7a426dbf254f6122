//! The merged community model
use std::hash::{DefaultHasher, Hash, Hasher};

use indexmap::IndexMap;
use log::{debug, info, warn};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};

use crate::community::taxon::{
    clean_id, namespace_suffix, ExchangeDirection, InternalExchange, Member, Taxon,
};
use crate::community::{ModelError, MEDIUM, MEDIUM_COMPARTMENT};
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::{Reaction, ReactionActivity};
use crate::utils::hashing::hash_f64;

/// Default bound on the specific flux through an internal exchange
pub const DEFAULT_MAX_EXCHANGE: f64 = 100.;
/// Default total dry mass of the community
pub const DEFAULT_MASS: f64 = 1.;
/// Smallest non-zero magnitude of a medium bound
pub const BOUND_ACCURACY: f64 = 1e-6;
/// Abundances are raised to this value when normalization pushes them below it
pub const MIN_ABUNDANCE: f64 = 1e-6;

/// Who a reaction or metabolite belongs to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Taxon(String),
    Medium,
}

impl Owner {
    pub fn id(&self) -> &str {
        match self {
            Owner::Taxon(id) => id,
            Owner::Medium => MEDIUM,
        }
    }
}

/// The role of a reaction in the community
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionKind {
    Internal,
    /// The biomass reaction of a taxon
    Biomass,
    /// Exchange between a taxon's external compartment and the medium
    InternalExchange,
    /// Exchange between the medium and the outside world
    MediumExchange,
}

/// A reaction of the community along with its origin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunityReaction {
    /// The namespaced reaction
    pub reaction: Reaction,
    /// Id of the reaction in the model it came from
    pub global_id: String,
    pub owner: Owner,
    pub kind: ReactionKind,
}

/// A metabolite of the community along with its origin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunityMetabolite {
    pub metabolite: Metabolite,
    pub global_id: String,
    pub owner: Owner,
}

/// Sparse stoichiometric matrix, rows are metabolites and columns reactions
#[derive(Clone, Debug)]
pub struct StoichiometricMatrix {
    pub metabolites: Vec<String>,
    pub reactions: Vec<String>,
    pub matrix: CscMatrix<f64>,
}

/// Builds a [`Community`] from member models
///
/// # Examples
/// ```rust,no_run
/// use comflux_core::community::{Community, MemberBuilder};
/// use comflux_core::metabolic_model::model::Model;
///
/// let e_coli = Model::read_json("e_coli_core.json").unwrap();
/// let community = Community::builder("gut")
///     .member(
///         MemberBuilder::default()
///             .id("E. coli")
///             .model(e_coli)
///             .abundance(0.7)
///             .build()
///             .unwrap(),
///     )
///     .max_exchange(100.)
///     .build()
///     .unwrap();
/// assert_eq!(community.taxon_ids(), vec!["E_coli"]);
/// ```
#[derive(Clone, Debug)]
pub struct CommunityBuilder {
    id: String,
    members: Vec<Member>,
    max_exchange: f64,
    mass: f64,
    relax_demands: bool,
}

impl CommunityBuilder {
    pub fn new(id: &str) -> Self {
        CommunityBuilder {
            id: id.to_string(),
            members: Vec::new(),
            max_exchange: DEFAULT_MAX_EXCHANGE,
            mass: DEFAULT_MASS,
            relax_demands: true,
        }
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn members<I: IntoIterator<Item = Member>>(mut self, members: I) -> Self {
        self.members.extend(members);
        self
    }

    /// Bound on the specific import through internal exchanges
    pub fn max_exchange(mut self, max_exchange: f64) -> Self {
        self.max_exchange = max_exchange;
        self
    }

    /// Total dry mass of the community, medium import bounds are divided by it
    pub fn mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Whether to relax demand and sink reactions that force flux
    pub fn relax_demands(mut self, relax: bool) -> Self {
        self.relax_demands = relax;
        self
    }

    pub fn build(self) -> Result<Community, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NoTaxa);
        }
        for member in &self.members {
            if !(member.abundance.is_finite() && member.abundance > 0.) {
                return Err(ModelError::InvalidAbundance {
                    taxon: member.id.clone(),
                    value: member.abundance,
                });
            }
        }
        let mut community = Community {
            id: self.id,
            taxa: IndexMap::new(),
            reactions: IndexMap::new(),
            metabolites: IndexMap::new(),
            max_exchange: self.max_exchange,
            mass: self.mass,
        };
        for member in self.members {
            community.add_member(member, self.relax_demands)?;
        }
        let total: f64 = community.taxa.values().map(|t| t.abundance).sum();
        for taxon in community.taxa.values_mut() {
            taxon.abundance /= total;
        }
        community.couple_exchanges();
        info!(
            "built community {} with {} taxa, {} reactions and {} metabolites",
            community.id,
            community.taxa.len(),
            community.reactions.len(),
            community.metabolites.len()
        );
        Ok(community)
    }
}

/// Several metabolic models sharing one medium
///
/// Fluxes of a taxon are specific, i.e. per gram dry weight of that taxon, so the flux of
/// its biomass reaction is its growth rate. Internal exchanges carry the taxon's abundance
/// as coefficient on the medium metabolite, which turns them into community-level fluxes
/// inside the medium. The community growth rate is the abundance-weighted sum of growth
/// rates.
///
/// After construction only bounds, abundances and reaction activity change.
#[derive(Clone, Debug)]
pub struct Community {
    id: String,
    taxa: IndexMap<String, Taxon>,
    reactions: IndexMap<String, CommunityReaction>,
    metabolites: IndexMap<String, CommunityMetabolite>,
    max_exchange: f64,
    mass: f64,
}

fn snap_to_accuracy(lower: f64, upper: f64, reaction: &str) -> (f64, f64) {
    let mut lower = lower;
    let mut upper = upper;
    if lower < 0. && lower > -BOUND_ACCURACY {
        debug!("lower bound of {} below numerical accuracy, using {}", reaction, -BOUND_ACCURACY);
        lower = -BOUND_ACCURACY;
    }
    if upper > 0. && upper < BOUND_ACCURACY {
        debug!("upper bound of {} below numerical accuracy, using {}", reaction, BOUND_ACCURACY);
        upper = BOUND_ACCURACY;
    }
    (lower, upper)
}

impl Community {
    pub fn builder(id: &str) -> CommunityBuilder {
        CommunityBuilder::new(id)
    }

    // region Construction
    fn add_member(&mut self, member: Member, relax_demands: bool) -> Result<(), ModelError> {
        let taxon_id = clean_id(&member.id);
        if taxon_id.is_empty() {
            return Err(ModelError::InvalidTaxonId(member.id));
        }
        if self.taxa.contains_key(&taxon_id) {
            return Err(ModelError::DuplicateTaxon(taxon_id));
        }
        let mut model = member.model;
        if relax_demands {
            model.fix_demands(BOUND_ACCURACY);
        }
        let biomass_id = model
            .biomass()
            .map(|r| r.id.clone())
            .ok_or_else(|| ModelError::MissingBiomass {
                taxon: taxon_id.clone(),
            })?;
        let external = model
            .external_compartment()
            .unwrap_or_else(|| "e".to_string());
        debug!("using {} as the external compartment of {}", external, taxon_id);
        let exchange_ids: Vec<String> = model
            .exchanges()
            .into_iter()
            .filter(|r| r.id != biomass_id && !r.looks_like_biomass())
            .map(|r| r.id.clone())
            .collect();
        if exchange_ids.is_empty() {
            return Err(ModelError::NoExchanges { taxon: taxon_id });
        }

        let suffix = namespace_suffix(&taxon_id);
        let owner = Owner::Taxon(taxon_id.clone());
        let mut metabolite_ids = Vec::with_capacity(model.metabolites.len());
        for met in model.metabolites.values() {
            let mut namespaced = met.clone();
            namespaced.id = format!("{}{}", met.id, suffix);
            namespaced.compartment = Some(format!(
                "{}{}",
                met.compartment.as_deref().unwrap_or(&external),
                suffix
            ));
            metabolite_ids.push(namespaced.id.clone());
            self.metabolites.insert(
                namespaced.id.clone(),
                CommunityMetabolite {
                    metabolite: namespaced,
                    global_id: met.id.clone(),
                    owner: owner.clone(),
                },
            );
        }

        let mut reaction_ids = Vec::with_capacity(model.reactions.len());
        for rxn in model.reactions.values() {
            let mut metabolites = IndexMap::with_capacity(rxn.metabolites.len());
            for (met_id, coef) in &rxn.metabolites {
                if !model.metabolites.contains_key(met_id) {
                    return Err(ModelError::UnknownMetabolite {
                        reaction: rxn.id.clone(),
                        metabolite: met_id.clone(),
                    });
                }
                metabolites.insert(format!("{}{}", met_id, suffix), *coef);
            }
            let mut namespaced = rxn.clone();
            namespaced.id = format!("{}{}", rxn.id, suffix);
            namespaced.metabolites = metabolites;
            let kind = if rxn.id == biomass_id {
                ReactionKind::Biomass
            } else if exchange_ids.contains(&rxn.id) {
                ReactionKind::InternalExchange
            } else {
                ReactionKind::Internal
            };
            reaction_ids.push(namespaced.id.clone());
            self.reactions.insert(
                namespaced.id.clone(),
                CommunityReaction {
                    reaction: namespaced,
                    global_id: rxn.id.clone(),
                    owner: owner.clone(),
                    kind,
                },
            );
        }

        let mut exchanges = Vec::with_capacity(exchange_ids.len());
        for ex_id in &exchange_ids {
            let Some(rxn) = model.reactions.get(ex_id) else {
                continue;
            };
            let (met_id, coef) = match (rxn.metabolites.len(), rxn.metabolites.first()) {
                (1, Some((met_id, coef))) => (met_id, *coef),
                _ => {
                    return Err(ModelError::InvalidExchange {
                        taxon: taxon_id,
                        reaction: ex_id.clone(),
                    })
                }
            };
            if !ex_id.to_lowercase().starts_with("ex") {
                warn!(
                    "reaction {} of {} looks like an exchange but its id does not start with EX_",
                    ex_id, taxon_id
                );
            }
            let direction = if coef < 0. {
                ExchangeDirection::Export
            } else {
                ExchangeDirection::Import
            };
            let (lower, upper) = match direction {
                ExchangeDirection::Export => (rxn.lower_bound / self.mass, rxn.upper_bound),
                ExchangeDirection::Import => (-rxn.upper_bound / self.mass, -rxn.lower_bound),
            };
            let (lower, upper) = snap_to_accuracy(lower, upper, ex_id);
            let Some(met) = model.metabolites.get(met_id) else {
                return Err(ModelError::UnknownMetabolite {
                    reaction: ex_id.clone(),
                    metabolite: met_id.clone(),
                });
            };
            let medium_metabolite = self.add_medium_metabolite(met, lower, upper);
            let internal_id = format!("{}{}", ex_id, suffix);
            if let Some(internal) = self.reactions.get_mut(&internal_id) {
                match direction {
                    ExchangeDirection::Export => internal.reaction.lower_bound = -self.max_exchange,
                    ExchangeDirection::Import => internal.reaction.upper_bound = self.max_exchange,
                }
            }
            exchanges.push(InternalExchange {
                reaction: internal_id,
                medium_metabolite,
                direction,
            });
        }

        info!(
            "added {} with {} reactions and {} exchanges",
            taxon_id,
            reaction_ids.len(),
            exchanges.len()
        );
        self.taxa.insert(
            taxon_id.clone(),
            Taxon {
                id: taxon_id.clone(),
                abundance: member.abundance,
                biomass: format!("{}{}", biomass_id, suffix),
                reactions: reaction_ids,
                metabolites: metabolite_ids,
                exchanges,
                external_compartment: external,
                knocked_out: false,
            },
        );
        Ok(())
    }

    /// Add the medium counterpart of an external metabolite, or widen its bounds
    fn add_medium_metabolite(&mut self, met: &Metabolite, lower: f64, upper: f64) -> String {
        let medium_id = format!("{}_{}", met.id_without_compartment(), MEDIUM_COMPARTMENT);
        let exchange_id = format!("EX_{}", medium_id);
        if let Some(existing) = self.reactions.get_mut(&exchange_id) {
            debug!("updating import rate for medium metabolite {}", medium_id);
            existing.reaction.lower_bound = existing.reaction.lower_bound.min(lower);
            existing.reaction.upper_bound = existing.reaction.upper_bound.max(upper);
            return medium_id;
        }
        debug!("adding {} to the medium", medium_id);
        let mut medium_met = met.clone();
        medium_met.id = medium_id.clone();
        medium_met.compartment = Some(MEDIUM_COMPARTMENT.to_string());
        self.metabolites.insert(
            medium_id.clone(),
            CommunityMetabolite {
                metabolite: medium_met,
                global_id: medium_id.clone(),
                owner: Owner::Medium,
            },
        );
        let reaction = Reaction {
            id: exchange_id.clone(),
            metabolites: IndexMap::from([(medium_id.clone(), -1.)]),
            name: Some(format!("{} medium exchange", medium_id)),
            lower_bound: lower,
            upper_bound: upper,
            subsystem: None,
            activity: ReactionActivity::Active,
        };
        self.reactions.insert(
            exchange_id.clone(),
            CommunityReaction {
                reaction,
                global_id: exchange_id,
                owner: Owner::Medium,
                kind: ReactionKind::MediumExchange,
            },
        );
        medium_id
    }

    /// Write the current abundances into the internal exchanges
    fn couple_exchanges(&mut self) {
        for taxon in self.taxa.values() {
            for exchange in &taxon.exchanges {
                if let Some(rxn) = self.reactions.get_mut(&exchange.reaction) {
                    rxn.reaction.metabolites.insert(
                        exchange.medium_metabolite.clone(),
                        exchange.direction.sign() * taxon.abundance,
                    );
                }
            }
        }
    }
    // endregion Construction

    // region Accessors
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn taxa(&self) -> impl Iterator<Item = &Taxon> {
        self.taxa.values()
    }

    pub fn taxon(&self, id: &str) -> Option<&Taxon> {
        self.taxa.get(id)
    }

    pub fn taxon_ids(&self) -> Vec<String> {
        self.taxa.keys().cloned().collect()
    }

    /// Normalized abundance of every taxon
    pub fn abundances(&self) -> IndexMap<String, f64> {
        self.taxa
            .iter()
            .map(|(id, taxon)| (id.clone(), taxon.abundance))
            .collect()
    }

    pub fn reactions(&self) -> impl Iterator<Item = &CommunityReaction> {
        self.reactions.values()
    }

    pub fn reaction(&self, id: &str) -> Option<&CommunityReaction> {
        self.reactions.get(id)
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn metabolites(&self) -> impl Iterator<Item = &CommunityMetabolite> {
        self.metabolites.values()
    }

    pub fn metabolite(&self, id: &str) -> Option<&CommunityMetabolite> {
        self.metabolites.get(id)
    }

    /// Exchanges between the medium and the outside world
    pub fn medium_exchanges(&self) -> impl Iterator<Item = &CommunityReaction> {
        self.reactions
            .values()
            .filter(|r| r.kind == ReactionKind::MediumExchange)
    }

    /// Exchanges between the taxa and the medium
    pub fn internal_exchanges(&self) -> impl Iterator<Item = &CommunityReaction> {
        self.reactions
            .values()
            .filter(|r| r.kind == ReactionKind::InternalExchange)
    }

    pub fn max_exchange(&self) -> f64 {
        self.max_exchange
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }
    // endregion Accessors

    // region Modification
    /// Replace the abundances of all taxa
    ///
    /// Every taxon needs an entry. With `normalize` the values are scaled to sum to one
    /// and values that end up below [`MIN_ABUNDANCE`] are raised to it, without it every
    /// value has to be positive already.
    pub fn set_abundances(
        &mut self,
        values: &IndexMap<String, f64>,
        normalize: bool,
    ) -> Result<(), ModelError> {
        if let Some(unknown) = values.keys().find(|id| !self.taxa.contains_key(*id)) {
            return Err(ModelError::UnknownTaxon(unknown.clone()));
        }
        let mut updated = IndexMap::with_capacity(self.taxa.len());
        for id in self.taxa.keys() {
            let value = *values
                .get(id)
                .ok_or_else(|| ModelError::MissingAbundance(id.clone()))?;
            let valid = value.is_finite() && (value > 0. || (normalize && value == 0.));
            if !valid {
                return Err(ModelError::InvalidAbundance {
                    taxon: id.clone(),
                    value,
                });
            }
            updated.insert(id.clone(), value);
        }
        let total: f64 = updated.values().sum();
        if total <= 0. {
            return Err(ModelError::AllZero);
        }
        for (id, value) in updated {
            let abundance = if normalize { value / total } else { value };
            let abundance = if normalize && abundance < MIN_ABUNDANCE {
                info!("raising abundance of {} to {}", id, MIN_ABUNDANCE);
                MIN_ABUNDANCE
            } else {
                abundance
            };
            if let Some(taxon) = self.taxa.get_mut(&id) {
                taxon.abundance = abundance;
            }
        }
        self.couple_exchanges();
        Ok(())
    }

    /// The current medium as {medium exchange id: maximum import flux}
    pub fn medium(&self) -> IndexMap<String, f64> {
        self.medium_exchanges()
            .filter(|r| r.reaction.lower_bound < 0.)
            .map(|r| (r.reaction.id.clone(), -r.reaction.lower_bound))
            .collect()
    }

    /// Set the medium from {medium exchange id: maximum import flux}
    ///
    /// Listed exchanges get their lower bound set to the negated import flux, every other
    /// medium exchange is closed for import. Ids not matching a medium exchange are
    /// skipped with a warning, and none matching at all is an error.
    pub fn set_medium(&mut self, medium: &IndexMap<String, f64>) -> Result<(), ModelError> {
        let mut matched = 0;
        for (id, value) in medium {
            match self.reactions.get(id) {
                Some(rxn) if rxn.kind == ReactionKind::MediumExchange => {
                    if !(value.is_finite() && *value >= 0.) {
                        return Err(ModelError::InvalidBounds {
                            reaction: id.clone(),
                            lower: -value,
                            upper: rxn.reaction.upper_bound,
                        });
                    }
                    matched += 1;
                }
                _ => warn!("{} is not a medium exchange of {}, skipping it", id, self.id),
            }
        }
        if matched == 0 {
            return Err(ModelError::NoMediumMatch);
        }
        for rxn in self
            .reactions
            .values_mut()
            .filter(|r| r.kind == ReactionKind::MediumExchange)
        {
            let lower = medium.get(&rxn.reaction.id).map(|v| -v).unwrap_or(0.);
            rxn.reaction.lower_bound = lower;
            if rxn.reaction.upper_bound < lower {
                rxn.reaction.upper_bound = lower;
            }
        }
        Ok(())
    }

    /// Allow every medium exchange to carry flux within `(-bound, bound)`
    pub fn open_exchanges(&mut self, bound: f64) {
        info!("opening {} medium exchanges to {}", self.medium_exchanges().count(), bound);
        for rxn in self
            .reactions
            .values_mut()
            .filter(|r| r.kind == ReactionKind::MediumExchange)
        {
            rxn.reaction.lower_bound = -bound;
            rxn.reaction.upper_bound = bound;
        }
    }

    pub fn set_reaction_bounds(&mut self, id: &str, lower: f64, upper: f64) -> Result<(), ModelError> {
        if !(lower <= upper) {
            return Err(ModelError::InvalidBounds {
                reaction: id.to_string(),
                lower,
                upper,
            });
        }
        let rxn = self
            .reactions
            .get_mut(id)
            .ok_or_else(|| ModelError::UnknownReaction(id.to_string()))?;
        rxn.reaction.lower_bound = lower;
        rxn.reaction.upper_bound = upper;
        Ok(())
    }

    /// A copy of the community in which every reaction of `taxon` is knocked out
    ///
    /// The knocked out taxon keeps its abundance but no longer contributes to community
    /// growth. The original community is left untouched.
    pub fn with_knockout(&self, taxon: &str) -> Result<Community, ModelError> {
        let mut knocked = self.clone();
        let member = knocked
            .taxa
            .get_mut(taxon)
            .ok_or_else(|| ModelError::UnknownTaxon(taxon.to_string()))?;
        member.knocked_out = true;
        for rxn_id in &member.reactions {
            if let Some(rxn) = knocked.reactions.get_mut(rxn_id) {
                rxn.reaction.knock_out();
            }
        }
        info!("knocked out {} in {}", taxon, knocked.id);
        Ok(knocked)
    }
    // endregion Modification

    // region Analysis
    pub fn stoichiometric_matrix(&self) -> StoichiometricMatrix {
        let mut coo = CooMatrix::new(self.metabolites.len(), self.reactions.len());
        for (j, rxn) in self.reactions.values().enumerate() {
            for (met, coef) in &rxn.reaction.metabolites {
                if let Some(i) = self.metabolites.get_index_of(met) {
                    coo.push(i, j, *coef);
                }
            }
        }
        StoichiometricMatrix {
            metabolites: self.metabolites.keys().cloned().collect(),
            reactions: self.reactions.keys().cloned().collect(),
            matrix: CscMatrix::from(&coo),
        }
    }

    /// Largest absolute entry of `S * v`, reactions missing from `fluxes` count as zero
    pub fn mass_balance_violation(&self, fluxes: &IndexMap<String, f64>) -> f64 {
        let stoich = self.stoichiometric_matrix();
        if stoich.metabolites.is_empty() {
            return 0.;
        }
        let v = DVector::from_iterator(
            stoich.reactions.len(),
            stoich
                .reactions
                .iter()
                .map(|id| fluxes.get(id).copied().unwrap_or(0.)),
        );
        let balance = &stoich.matrix * &v;
        balance.amax()
    }

    /// Hash of everything that influences optimal growth rates
    ///
    /// Covers reaction bounds, reaction activity and abundances, but not the structure,
    /// which does not change after construction.
    pub fn fingerprint(&self) -> u64 {
        let mut state = DefaultHasher::new();
        self.id.hash(&mut state);
        for (id, rxn) in &self.reactions {
            id.hash(&mut state);
            hash_f64(rxn.reaction.lower_bound, &mut state);
            hash_f64(rxn.reaction.upper_bound, &mut state);
            rxn.reaction.activity.hash(&mut state);
        }
        for (id, taxon) in &self.taxa {
            id.hash(&mut state);
            hash_f64(taxon.abundance, &mut state);
            taxon.knocked_out.hash(&mut state);
        }
        state.finish()
    }
    // endregion Analysis
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::community::taxon::MemberBuilder;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::model::Model;
    use crate::metabolic_model::reaction::ReactionBuilder;

    /// glucose is imported, transported and turned into biomass
    pub(crate) fn toy_model(import: f64) -> Model {
        let mut model = Model::new("toy");
        for (id, comp) in [("glc_e", "e"), ("glc_c", "c")] {
            model.add_metabolite(
                MetaboliteBuilder::default()
                    .id(id)
                    .compartment(comp)
                    .build()
                    .unwrap(),
            );
        }
        let reactions = [
            ("EX_glc_e", vec![("glc_e", -1.)], -import, 1000.),
            ("GLCt", vec![("glc_e", -1.), ("glc_c", 1.)], 0., 1000.),
            ("Growth", vec![("glc_c", -1.)], 0., 10.),
        ];
        for (id, mets, lb, ub) in reactions {
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id)
                    .metabolites(mets.into_iter().map(|(m, c)| (m.to_string(), c)).collect())
                    .lower_bound(lb)
                    .upper_bound(ub)
                    .build()
                    .unwrap(),
            );
        }
        model.set_objective("Growth");
        model
    }

    pub(crate) fn member(id: &str, abundance: f64, import: f64) -> Member {
        MemberBuilder::default()
            .id(id)
            .model(toy_model(import))
            .abundance(abundance)
            .build()
            .unwrap()
    }

    /// a and b at 1:3, both growing up to 10 on 10 units of shared glucose
    pub(crate) fn pair() -> Community {
        Community::builder("pair")
            .member(member("a", 1., 10.))
            .member(member("b", 3., 4.))
            .build()
            .unwrap()
    }

    #[test]
    fn namespaces_and_medium() {
        let community = pair();
        assert_eq!(community.num_reactions(), 7);
        assert!(community.reaction("GLCt__a").is_some());
        assert_eq!(community.reaction("Growth__b").unwrap().kind, ReactionKind::Biomass);
        let medium = community.reaction("EX_glc_m").unwrap();
        assert_eq!(medium.owner, Owner::Medium);
        // merged bounds keep the widest import
        assert_eq!(medium.reaction.lower_bound, -10.);
        assert_eq!(
            community.metabolite("glc_e__a").unwrap().metabolite.compartment.as_deref(),
            Some("e__a")
        );
    }

    #[test]
    fn exchanges_are_coupled_by_abundance() {
        let community = pair();
        assert_eq!(community.abundances()["a"], 0.25);
        assert_eq!(community.abundances()["b"], 0.75);
        let internal = &community.reaction("EX_glc_e__b").unwrap().reaction;
        assert_eq!(internal.metabolites["glc_m"], 0.75);
        assert_eq!(internal.lower_bound, -DEFAULT_MAX_EXCHANGE);
        assert_eq!(community.internal_exchanges().count(), 2);
    }

    #[test]
    fn update_abundances() {
        let mut community = pair();
        let values = IndexMap::from([("a".to_string(), 1.), ("b".to_string(), 1.)]);
        community.set_abundances(&values, true).unwrap();
        let internal = &community.reaction("EX_glc_e__a").unwrap().reaction;
        assert_eq!(internal.metabolites["glc_m"], 0.5);

        let missing = IndexMap::from([("a".to_string(), 1.)]);
        assert_eq!(
            community.set_abundances(&missing, true),
            Err(ModelError::MissingAbundance("b".to_string()))
        );
        let zeros = IndexMap::from([("a".to_string(), 0.), ("b".to_string(), 0.)]);
        assert_eq!(community.set_abundances(&zeros, true), Err(ModelError::AllZero));
    }

    #[test]
    fn construction_errors() {
        let mut no_biomass = toy_model(10.);
        no_biomass.reactions.shift_remove("Growth");
        no_biomass.objective.clear();
        let res = Community::builder("broken")
            .member(MemberBuilder::default().id("x").model(no_biomass).build().unwrap())
            .build();
        assert_eq!(
            res.unwrap_err(),
            ModelError::MissingBiomass {
                taxon: "x".to_string()
            }
        );

        let res = Community::builder("broken").member(member("x", 0., 1.)).build();
        assert!(matches!(res, Err(ModelError::InvalidAbundance { .. })));

        let res = Community::builder("broken")
            .member(member("x", 1., 1.))
            .member(member("x", 1., 1.))
            .build();
        assert_eq!(res.unwrap_err(), ModelError::DuplicateTaxon("x".to_string()));

        assert_eq!(Community::builder("empty").build().unwrap_err(), ModelError::NoTaxa);
    }

    #[test]
    fn medium_roundtrip() {
        let mut community = pair();
        assert_eq!(community.medium(), IndexMap::from([("EX_glc_m".to_string(), 10.)]));
        community
            .set_medium(&IndexMap::from([("EX_glc_m".to_string(), 5.)]))
            .unwrap();
        assert_eq!(community.reaction("EX_glc_m").unwrap().reaction.lower_bound, -5.);
        assert_eq!(
            community.set_medium(&IndexMap::from([("EX_o2_m".to_string(), 5.)])),
            Err(ModelError::NoMediumMatch)
        );
    }

    #[test]
    fn knockout_leaves_original() {
        let community = pair();
        let knocked = community.with_knockout("a").unwrap();
        assert!(knocked.taxon("a").unwrap().knocked_out);
        assert_eq!(
            knocked.reaction("Growth__a").unwrap().reaction.activity,
            ReactionActivity::Inactive
        );
        assert!(!community.taxon("a").unwrap().knocked_out);
        assert_ne!(community.fingerprint(), knocked.fingerprint());
        assert_eq!(community.fingerprint(), pair().fingerprint());
        assert!(matches!(
            community.with_knockout("z"),
            Err(ModelError::UnknownTaxon(_))
        ));
    }

    #[test]
    fn steady_state_fluxes_balance() {
        let community = pair();
        let stoich = community.stoichiometric_matrix();
        assert_eq!(stoich.matrix.nrows(), 5);
        assert_eq!(stoich.matrix.ncols(), 7);
        // a imports one unit per gram, which is a quarter unit at community scale
        let fluxes = IndexMap::from([
            ("EX_glc_e__a".to_string(), -1.),
            ("GLCt__a".to_string(), 1.),
            ("Growth__a".to_string(), 1.),
            ("EX_glc_m".to_string(), -0.25),
        ]);
        assert!(community.mass_balance_violation(&fluxes) < 1e-12);
        let unbalanced = IndexMap::from([("GLCt__a".to_string(), 1.)]);
        assert_eq!(community.mass_balance_violation(&unbalanced), 1.);
    }
}
