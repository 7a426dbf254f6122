//! Named results of community optimizations
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::community::model::Community;
use crate::community::problem::CommunityProblem;
use crate::configuration::RegularizationKind;
use crate::optimize::solvers::Backend;
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Growth summary of one taxon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberGrowth {
    /// Abundance in the community objective, zero for knocked out taxa
    pub abundance: f64,
    /// Specific growth rate in 1/h
    pub growth_rate: f64,
    pub reactions: usize,
    pub metabolites: usize,
}

/// Problems with a solution that did not prevent returning it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SolutionWarning {
    /// The growth rates might not be the unique regularized optimum
    DegenerateSolution { message: String },
    /// The fractional growth floors could not all be met and only the minimal growth
    /// rates were kept
    FloorsRelaxed { fraction: f64 },
}

impl Display for SolutionWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionWarning::DegenerateSolution { message } => {
                write!(f, "degenerate solution: {}", message)
            }
            SolutionWarning::FloorsRelaxed { fraction } => {
                write!(f, "floors at fraction {} can not all be met, only minimal growth kept", fraction)
            }
        }
    }
}

/// How the solution was obtained
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Backend of the final solve
    pub backend: Backend,
    pub message: Option<String>,
    pub atol: f64,
    pub rtol: f64,
    /// Deviation norm used to pick the growth rates, None without regularization
    pub regularization: Option<RegularizationKind>,
    /// Whether the final point came from a crossover
    pub crossover: bool,
    /// Whether the fluxes minimize total flux at fixed growth rates
    pub parsimonious: bool,
}

/// Result of optimizing a community
///
/// All fluxes and growth rates with an absolute value below `atol` are reported as zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunitySolution {
    pub community: String,
    pub status: OptimizationStatus,
    pub objective_value: Option<f64>,
    /// Community growth rate in 1/h
    pub growth_rate: f64,
    /// Tradeoff fraction the solution was computed with
    pub fraction: Option<f64>,
    pub members: IndexMap<String, MemberGrowth>,
    /// Net flux of every reaction, only kept when requested
    pub fluxes: Option<IndexMap<String, f64>>,
    /// Medium exchanges taking up metabolites, with negative fluxes
    pub imports: IndexMap<String, f64>,
    /// Medium exchanges releasing metabolites, with positive fluxes
    pub exports: IndexMap<String, f64>,
    pub warnings: Vec<SolutionWarning>,
    pub diagnostics: Diagnostics,
}

fn zero_below(value: f64, atol: f64) -> f64 {
    if value.abs() < atol {
        0.
    } else {
        value
    }
}

impl CommunitySolution {
    /// Extract the named solution from a solved community problem
    ///
    /// Returns None when the solve did not produce a point.
    pub(crate) fn from_problem(
        community: &Community,
        problem: &CommunityProblem,
        solution: &ProblemSolution,
        atol: f64,
        rtol: f64,
        keep_fluxes: bool,
    ) -> Option<Self> {
        let mut fluxes = problem.fluxes(solution)?;
        for value in fluxes.values_mut() {
            *value = zero_below(*value, atol);
        }
        let rates = problem.growth_rates(solution)?;
        let members = community
            .taxa()
            .map(|taxon| {
                let rate = rates.get(&taxon.id).copied().unwrap_or(0.);
                (
                    taxon.id.clone(),
                    MemberGrowth {
                        abundance: taxon.effective_abundance(),
                        growth_rate: zero_below(rate, atol),
                        reactions: taxon.reactions.len(),
                        metabolites: taxon.metabolites.len(),
                    },
                )
            })
            .collect();
        let growth_rate = zero_below(problem.community_growth(solution)?, atol);

        let mut imports = IndexMap::new();
        let mut exports = IndexMap::new();
        for rxn in community.medium_exchanges() {
            let flux = fluxes.get(&rxn.reaction.id).copied().unwrap_or(0.);
            if flux < 0. {
                imports.insert(rxn.reaction.id.clone(), flux);
            } else if flux > 0. {
                exports.insert(rxn.reaction.id.clone(), flux);
            }
        }

        Some(CommunitySolution {
            community: community.id().to_string(),
            status: solution.status,
            objective_value: solution.objective_value,
            growth_rate,
            fraction: None,
            members,
            fluxes: if keep_fluxes { Some(fluxes) } else { None },
            imports,
            exports,
            warnings: Vec::new(),
            diagnostics: Diagnostics {
                backend: solution.backend,
                message: solution.message.clone(),
                atol,
                rtol,
                regularization: None,
                crossover: false,
                parsimonious: false,
            },
        })
    }

    /// Specific growth rate of every taxon
    pub fn growth_rates(&self) -> IndexMap<String, f64> {
        self.members
            .iter()
            .map(|(id, member)| (id.clone(), member.growth_rate))
            .collect()
    }

    pub fn is_degenerate(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SolutionWarning::DegenerateSolution { .. }))
    }

    /// Fluxes grouped by owner (taxon id or "medium") and keyed by the original reaction id
    ///
    /// Internal exchanges are reported as the taxon's own exchange fluxes.
    pub fn fluxes_by_taxon(&self, community: &Community) -> Option<IndexMap<String, IndexMap<String, f64>>> {
        let fluxes = self.fluxes.as_ref()?;
        let mut grouped: IndexMap<String, IndexMap<String, f64>> = IndexMap::new();
        for rxn in community.reactions() {
            let flux = fluxes.get(&rxn.reaction.id).copied().unwrap_or(0.);
            grouped
                .entry(rxn.owner.id().to_string())
                .or_default()
                .insert(rxn.global_id.clone(), flux);
        }
        Some(grouped)
    }

    /// Exchange fluxes of one taxon with the medium, keyed by medium metabolite
    ///
    /// Positive values are exports into the medium, negative values imports, both per gram
    /// dry weight of the taxon.
    pub fn taxon_exchanges(&self, community: &Community, taxon: &str) -> Option<IndexMap<String, f64>> {
        let fluxes = self.fluxes.as_ref()?;
        let taxon = community.taxon(taxon)?;
        Some(
            taxon
                .exchanges
                .iter()
                .map(|ex| {
                    let flux = fluxes.get(&ex.reaction).copied().unwrap_or(0.);
                    (ex.medium_metabolite.clone(), ex.direction.sign() * flux)
                })
                .collect(),
        )
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
