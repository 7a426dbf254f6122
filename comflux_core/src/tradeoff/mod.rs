//! Cooperative tradeoff between community growth and individual growth
//!
//! A run goes through the stages
//!
//! 1. `Init`: validate the fraction and build the community problem
//! 2. `IndividualMax`: maximize the growth of every taxon on its own, memoized per
//!    community fingerprint
//! 3. `CommunityBound`: maximize community growth with only the minimal growth rates
//!    enforced
//! 4. `Regularize`: keep community growth between a fraction of its optimum and the
//!    optimum, hold every growing taxon at the same fraction of its individual maximum
//!    where those floors can all be met, and minimize the deviation of every growth rate
//!    from its individual maximum
//! 5. `Done`: extract the named solution
//!
//! with an optional crossover to a vertex after regularization and an optional
//! parsimonious flux step before extraction.
pub mod crossover;
pub mod knockout;
pub mod parsimonious;
pub mod regularization;

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::community::model::Community;
use crate::community::problem::CommunityProblem;
use crate::community::solution::{CommunitySolution, SolutionWarning};
use crate::community::ModelError;
use crate::configuration::{Configuration, CrossoverMode, SolverChoice};
use crate::optimize::problem::ProblemError;
use crate::optimize::solvers::{Backend, SolverError, SolverOptions};
use crate::optimize::{OptimizationStatus, ProblemSolution};
use crate::tradeoff::crossover::{crossover, max_rate_change};
use crate::tradeoff::knockout::{KnockoutMethod, KnockoutResult, KnockoutTable};
use crate::tradeoff::parsimonious::minimize_total_flux;
use crate::tradeoff::regularization::{apply_regularization, select_regularization, supports_quadratic};

/// Stages of a tradeoff run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Init,
    IndividualMax,
    CommunityBound,
    Regularize,
    Crossover,
    Parsimonious,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::IndividualMax => "individual maximization",
            Stage::CommunityBound => "community bound",
            Stage::Regularize => "regularization",
            Stage::Crossover => "crossover",
            Stage::Parsimonious => "parsimonious fluxes",
            Stage::Done => "extraction",
        };
        write!(f, "{}", name)
    }
}

/// Minimal growth rates demanded from growing taxa at every fraction
#[derive(Clone, Debug, PartialEq)]
pub enum MinGrowth {
    /// Same rate for every taxon
    Uniform(f64),
    /// One rate per taxon, missing taxa get zero
    PerTaxon(IndexMap<String, f64>),
}

impl MinGrowth {
    pub fn for_taxon(&self, taxon: &str) -> f64 {
        match self {
            MinGrowth::Uniform(rate) => *rate,
            MinGrowth::PerTaxon(rates) => rates.get(taxon).copied().unwrap_or(0.),
        }
    }
}

impl Default for MinGrowth {
    fn default() -> Self {
        MinGrowth::Uniform(0.)
    }
}

/// Largest growth rate of every taxon with the rest of the community unconstrained
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndividualMaxima {
    pub rates: IndexMap<String, f64>,
    /// Taxa whose maximum is below `atol`, including knocked out taxa
    pub non_growing: Vec<String>,
}

impl IndividualMaxima {
    pub fn can_grow(&self, taxon: &str) -> bool {
        self.rates.contains_key(taxon) && !self.non_growing.iter().any(|t| t == taxon)
    }
}

/// Individual maxima keyed by [`Community::fingerprint`]
#[derive(Clone, Debug, Default)]
pub struct MaximaCache {
    entries: IndexMap<u64, IndividualMaxima>,
}

impl MaximaCache {
    pub fn get(&self, fingerprint: u64) -> Option<&IndividualMaxima> {
        self.entries.get(&fingerprint)
    }

    pub fn insert(&mut self, fingerprint: u64, maxima: IndividualMaxima) {
        self.entries.insert(fingerprint, maxima);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Errors of the tradeoff algorithm
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeoffError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The minimal growth rates can not be met together
    #[error("Minimal growth rates of {community} can not be met together at fraction {fraction}, floors: {floors:?}")]
    InfeasibleTradeoff {
        community: String,
        fraction: f64,
        floors: IndexMap<String, f64>,
    },
    /// Every backend failed to converge
    #[error("Solvers failed to converge during {stage} (taxon {taxon:?}), attempts: {attempts:?}")]
    SolverNumerical {
        stage: Stage,
        taxon: Option<String>,
        attempts: Vec<(Backend, OptimizationStatus)>,
    },
    #[error("Growth of {community} is unbounded during {stage}")]
    Unbounded { community: String, stage: Stage },
    #[error("Tradeoff fraction must lie in (0, 1], got {0}")]
    InvalidFraction(f64),
    #[error("Quadratic regularization requested for a backend without quadratic objectives")]
    UnsupportedRegularization,
}

/// Solve one stage, turning convergence failures into [`TradeoffError::SolverNumerical`]
pub(crate) fn solve_stage(
    problem: &CommunityProblem,
    choice: SolverChoice,
    options: &SolverOptions,
    stage: Stage,
    taxon: Option<&str>,
) -> Result<ProblemSolution, TradeoffError> {
    debug!("solving {} with {:?}", stage, choice);
    problem.solve(choice, options).map_err(|err| match err {
        SolverError::Numerical { attempts } => TradeoffError::SolverNumerical {
            stage,
            taxon: taxon.map(str::to_string),
            attempts,
        },
        other => TradeoffError::Solver(other),
    })
}

/// Status of a solve that ended without a usable point
fn unusable(
    community: &Community,
    solution: &ProblemSolution,
    stage: Stage,
    taxon: Option<&str>,
) -> TradeoffError {
    match solution.status {
        OptimizationStatus::Unbounded => TradeoffError::Unbounded {
            community: community.id().to_string(),
            stage,
        },
        status => TradeoffError::SolverNumerical {
            stage,
            taxon: taxon.map(str::to_string),
            attempts: vec![(solution.backend, status)],
        },
    }
}

/// Runs the cooperative tradeoff on communities
///
/// The runner owns the configuration and a cache of individual maxima, so scanning
/// fractions or re-running an unchanged community only maximizes each taxon once.
///
/// # Examples
/// ```rust,no_run
/// use comflux_core::configuration::Configuration;
/// use comflux_core::tradeoff::Tradeoff;
/// # fn community() -> comflux_core::community::Community { unimplemented!() }
/// let community = community();
/// let mut tradeoff = Tradeoff::new(Configuration::default()).with_fluxes(true);
/// let solution = tradeoff.run(&community, 0.5).unwrap();
/// println!("community growth {}", solution.growth_rate);
/// ```
#[derive(Clone, Debug)]
pub struct Tradeoff {
    config: Configuration,
    min_growth: MinGrowth,
    pfba: bool,
    keep_fluxes: bool,
    cache: MaximaCache,
}

impl Tradeoff {
    pub fn new(config: Configuration) -> Self {
        Tradeoff {
            config,
            min_growth: MinGrowth::default(),
            pfba: false,
            keep_fluxes: false,
            cache: MaximaCache::default(),
        }
    }

    pub fn with_min_growth(mut self, min_growth: MinGrowth) -> Self {
        self.min_growth = min_growth;
        self
    }

    /// Minimize total flux at the final growth rates
    pub fn with_pfba(mut self, pfba: bool) -> Self {
        self.pfba = pfba;
        self
    }

    /// Keep the flux of every reaction in the solutions
    pub fn with_fluxes(mut self, keep_fluxes: bool) -> Self {
        self.keep_fluxes = keep_fluxes;
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn cache(&self) -> &MaximaCache {
        &self.cache
    }

    // region Individual maxima
    /// Individual growth maxima of all taxa, from the cache when the community is unchanged
    pub fn individual_maxima(&mut self, community: &Community) -> Result<IndividualMaxima, TradeoffError> {
        let mut problem = CommunityProblem::new(community)?;
        self.cached_maxima(community, &mut problem)
    }

    fn cached_maxima(
        &mut self,
        community: &Community,
        problem: &mut CommunityProblem,
    ) -> Result<IndividualMaxima, TradeoffError> {
        let fingerprint = community.fingerprint();
        if let Some(maxima) = self.cache.get(fingerprint) {
            debug!("reusing individual maxima of {}", community.id());
            return Ok(maxima.clone());
        }
        let maxima = self.compute_maxima(community, problem)?;
        self.cache.insert(fingerprint, maxima.clone());
        Ok(maxima)
    }

    fn compute_maxima(
        &self,
        community: &Community,
        problem: &mut CommunityProblem,
    ) -> Result<IndividualMaxima, TradeoffError> {
        let (atol, _) = self.config.tolerances(problem.num_variables());
        let options = self.config.solver_options(problem.num_variables());
        info!("maximizing individual growth of {} taxa in {}", community.taxa().count(), community.id());
        let mut rates = IndexMap::new();
        let mut non_growing = Vec::new();
        for taxon in community.taxa() {
            if taxon.knocked_out {
                rates.insert(taxon.id.clone(), 0.);
                non_growing.push(taxon.id.clone());
                continue;
            }
            problem.maximize_growth(Some(&taxon.id))?;
            let solution = solve_stage(
                problem,
                self.config.solver,
                &options,
                Stage::IndividualMax,
                Some(&taxon.id),
            )?;
            let rate = match solution.status {
                status if status.has_solution() => problem
                    .growth_variable(&taxon.id)
                    .and_then(|index| solution.value_at(index))
                    .unwrap_or(0.),
                OptimizationStatus::Infeasible => {
                    warn!("{} can not grow in {}, the problem is infeasible", taxon.id, community.id());
                    0.
                }
                _ => return Err(unusable(community, &solution, Stage::IndividualMax, Some(&taxon.id))),
            };
            if rate < atol {
                info!("{} can not grow in {}", taxon.id, community.id());
                rates.insert(taxon.id.clone(), 0.);
                non_growing.push(taxon.id.clone());
            } else {
                debug!("individual maximum of {} is {:.6}", taxon.id, rate);
                rates.insert(taxon.id.clone(), rate);
            }
        }
        problem.maximize_growth(None)?;
        Ok(IndividualMaxima { rates, non_growing })
    }
    // endregion Individual maxima

    /// Lower bounds on the growth rates of all growing taxa
    ///
    /// A fraction of zero leaves only the minimal growth rates.
    fn floors(
        &self,
        community: &Community,
        maxima: &IndividualMaxima,
        fraction: f64,
        atol: f64,
        rtol: f64,
    ) -> IndexMap<String, f64> {
        community
            .taxa()
            .filter(|taxon| !taxon.knocked_out && maxima.can_grow(&taxon.id))
            .map(|taxon| {
                let max = maxima.rates.get(&taxon.id).copied().unwrap_or(0.);
                let floor = ((1. - rtol) * fraction * max - atol).max(self.min_growth.for_taxon(&taxon.id));
                let floor = if floor < atol { 0. } else { floor };
                (taxon.id.clone(), floor)
            })
            .collect()
    }

    /// Largest community growth rate without any floors
    pub fn max_community_growth(&self, community: &Community) -> Result<f64, TradeoffError> {
        let problem = CommunityProblem::new(community)?;
        let (atol, _) = self.config.tolerances(problem.num_variables());
        let options = self.config.solver_options(problem.num_variables());
        let solution = solve_stage(&problem, self.config.solver, &options, Stage::CommunityBound, None)?;
        if !solution.status.has_solution() {
            return Err(unusable(community, &solution, Stage::CommunityBound, None));
        }
        let growth = problem.community_growth(&solution).unwrap_or(0.);
        Ok(if growth < atol { 0. } else { growth })
    }

    // region Run
    /// Run the cooperative tradeoff at `fraction`
    ///
    /// Community growth stays within `[fraction·μ*, μ*]` of its optimum `μ*`, so a fraction
    /// of 1 reproduces community FBA. Every growing taxon keeps `fraction` of its individual
    /// maximum unless those floors conflict, which leaves a
    /// [`SolutionWarning::FloorsRelaxed`] on the solution.
    pub fn run(&mut self, community: &Community, fraction: f64) -> Result<CommunitySolution, TradeoffError> {
        if !(fraction > 0. && fraction <= 1.) {
            return Err(TradeoffError::InvalidFraction(fraction));
        }
        if community.taxa().all(|taxon| taxon.knocked_out) {
            return Err(ModelError::AllZero.into());
        }
        let kind = select_regularization(self.config.regularization, supports_quadratic(self.config.solver))?;
        info!("cooperative tradeoff for {} at fraction {}", community.id(), fraction);
        let mut problem = CommunityProblem::new(community)?;
        let (atol, rtol) = self.config.tolerances(problem.num_variables());
        let options = self.config.solver_options(problem.num_variables());

        let maxima = self.cached_maxima(community, &mut problem)?;

        let minimal = self.floors(community, &maxima, 0., atol, rtol);
        for (taxon, floor) in &minimal {
            problem.set_growth_bounds(taxon, *floor, f64::INFINITY)?;
        }
        problem.maximize_growth(None)?;
        let bound = solve_stage(&problem, self.config.solver, &options, Stage::CommunityBound, None)?;
        let max_growth = match bound.status {
            status if status.has_solution() => problem.community_growth(&bound).unwrap_or(0.),
            OptimizationStatus::Infeasible => {
                return Err(TradeoffError::InfeasibleTradeoff {
                    community: community.id().to_string(),
                    fraction,
                    floors: minimal,
                })
            }
            _ => return Err(unusable(community, &bound, Stage::CommunityBound, None)),
        };
        info!("maximal community growth of {} is {:.6}", community.id(), max_growth);

        let upper = max_growth.max(0.);
        let lower = ((1. - rtol) * fraction * max_growth - atol).max(0.);
        problem.set_community_bounds(lower, upper)?;
        let mut floors = self.floors(community, &maxima, fraction, atol, rtol);
        for (taxon, floor) in &floors {
            problem.set_growth_bounds(taxon, *floor, f64::INFINITY)?;
        }
        let targets: IndexMap<String, f64> = community
            .taxa()
            .filter(|taxon| !taxon.knocked_out)
            .map(|taxon| (taxon.id.clone(), maxima.rates.get(&taxon.id).copied().unwrap_or(0.)))
            .collect();
        apply_regularization(&mut problem, kind, &targets, self.config.objective_scale)?;
        let mut warnings = Vec::new();
        let mut regularized = solve_stage(&problem, self.config.solver, &options, Stage::Regularize, None)?;
        if regularized.status == OptimizationStatus::Infeasible {
            warn!(
                "floors of {} at fraction {} can not all be met, keeping only the minimal growth rates",
                community.id(),
                fraction
            );
            for (taxon, floor) in &minimal {
                problem.set_growth_bounds(taxon, *floor, f64::INFINITY)?;
            }
            floors = minimal;
            warnings.push(SolutionWarning::FloorsRelaxed { fraction });
            regularized = solve_stage(&problem, self.config.solver, &options, Stage::Regularize, None)?;
        }
        if !regularized.status.has_solution() {
            return Err(unusable(community, &regularized, Stage::Regularize, None));
        }

        let mut final_solution = regularized;
        let mut crossed = false;
        let needs_crossover = match self.config.crossover {
            CrossoverMode::Never => false,
            CrossoverMode::Always => true,
            CrossoverMode::Auto => final_solution.status != OptimizationStatus::Optimal,
        };
        if needs_crossover {
            let rates = problem.growth_rates(&final_solution).unwrap_or_default();
            let total = problem.community_growth(&final_solution).unwrap_or(max_growth);
            match crossover(&mut problem, &rates, &floors, total, atol, &options) {
                Ok(solution) if solution.status.has_solution() => {
                    let after = problem.growth_rates(&solution).unwrap_or_default();
                    let change = max_rate_change(&rates, &after);
                    if change > atol.max(rtol * upper) {
                        warnings.push(SolutionWarning::DegenerateSolution {
                            message: format!("crossover moved growth rates by up to {:.3e}", change),
                        });
                    }
                    final_solution = solution;
                    crossed = true;
                }
                Ok(solution) => warnings.push(SolutionWarning::DegenerateSolution {
                    message: format!("crossover ended with status {}", solution.status),
                }),
                Err(err) => warnings.push(SolutionWarning::DegenerateSolution {
                    message: format!("crossover failed: {}", err),
                }),
            }
        } else if final_solution.status != OptimizationStatus::Optimal {
            warnings.push(SolutionWarning::DegenerateSolution {
                message: format!("regularization ended with status {}", final_solution.status),
            });
        }

        let mut parsimonious = false;
        if self.pfba {
            let rates = problem.growth_rates(&final_solution).unwrap_or_default();
            let total = problem.community_growth(&final_solution).unwrap_or(max_growth);
            minimize_total_flux(&mut problem, &rates, total, atol, rtol)?;
            let solution = solve_stage(&problem, self.config.solver, &options, Stage::Parsimonious, None)?;
            if solution.status.has_solution() {
                final_solution = solution;
                parsimonious = true;
            } else {
                warn!(
                    "minimizing total flux in {} ended with {}, keeping the regularized fluxes",
                    community.id(),
                    solution.status
                );
            }
        }

        let mut solution = CommunitySolution::from_problem(
            community,
            &problem,
            &final_solution,
            atol,
            rtol,
            self.keep_fluxes,
        )
        .ok_or_else(|| unusable(community, &final_solution, Stage::Done, None))?;
        for warning in &warnings {
            warn!("{}: {}", community.id(), warning);
        }
        solution.fraction = Some(fraction);
        solution.warnings = warnings;
        solution.diagnostics.regularization = Some(kind);
        solution.diagnostics.crossover = crossed;
        solution.diagnostics.parsimonious = parsimonious;
        Ok(solution)
    }

    /// Run several fractions from the largest to the smallest
    ///
    /// Fractions whose minimal growth rates can not be met give None, every other error
    /// aborts the scan.
    pub fn scan(
        &mut self,
        community: &Community,
        fractions: &[f64],
    ) -> Result<Vec<(f64, Option<CommunitySolution>)>, TradeoffError> {
        if let Some(invalid) = fractions.iter().find(|f| !(**f > 0. && **f <= 1.)) {
            return Err(TradeoffError::InvalidFraction(*invalid));
        }
        let mut sorted = fractions.to_vec();
        sorted.sort_by(|a, b| b.total_cmp(a));
        sorted.dedup();
        let mut results = Vec::with_capacity(sorted.len());
        for fraction in sorted {
            match self.run(community, fraction) {
                Ok(solution) => results.push((fraction, Some(solution))),
                Err(TradeoffError::InfeasibleTradeoff { .. }) => {
                    warn!("fraction {} is infeasible for {}", fraction, community.id());
                    results.push((fraction, None));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(results)
    }
    // endregion Run

    // region Knockouts
    /// Knock out one taxon and compare community growth against the intact community
    pub fn knockout(
        &mut self,
        community: &Community,
        taxon: &str,
        fraction: f64,
    ) -> Result<KnockoutResult, TradeoffError> {
        let base = self.run(community, fraction)?;
        self.knockout_against(community, taxon, fraction, &base)
    }

    fn knockout_against(
        &mut self,
        community: &Community,
        taxon: &str,
        fraction: f64,
        base: &CommunitySolution,
    ) -> Result<KnockoutResult, TradeoffError> {
        let knocked = community.with_knockout(taxon)?;
        let solution = self.run(&knocked, fraction)?;
        let growth_delta = solution.growth_rate - base.growth_rate;
        info!("knocking out {} changes community growth by {:.6}", taxon, growth_delta);
        Ok(KnockoutResult {
            taxon: taxon.to_string(),
            solution,
            growth_delta,
        })
    }

    /// Knock out each of `taxa` in turn and tabulate the growth effects on all taxa
    pub fn knockout_taxa(
        &mut self,
        community: &Community,
        taxa: &[&str],
        fraction: f64,
        method: KnockoutMethod,
    ) -> Result<KnockoutTable, TradeoffError> {
        if let Some(unknown) = taxa.iter().find(|t| community.taxon(t).is_none()) {
            return Err(ModelError::UnknownTaxon(unknown.to_string()).into());
        }
        let base = self.run(community, fraction)?;
        let before = base.growth_rates();
        let mut table = KnockoutTable::new(method, community.taxon_ids());
        for taxon in taxa {
            let result = self.knockout_against(community, taxon, fraction, &base)?;
            table.push(&before, &result);
        }
        Ok(table)
    }
    // endregion Knockouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::model::tests::pair;
    use crate::configuration::ConfigurationBuilder;

    fn robust() -> Tradeoff {
        Tradeoff::new(
            ConfigurationBuilder::default()
                .solver(SolverChoice::Robust)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn invalid_fractions() {
        let community = pair();
        let mut tradeoff = robust();
        for fraction in [0., -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                tradeoff.run(&community, fraction),
                Err(TradeoffError::InvalidFraction(_))
            ));
        }
    }

    #[test]
    fn maxima_are_memoized() {
        let community = pair();
        let mut tradeoff = robust();
        let maxima = tradeoff.individual_maxima(&community).unwrap();
        assert!((maxima.rates["a"] - 10.).abs() < 1e-4);
        assert!(maxima.non_growing.is_empty());
        tradeoff.run(&community, 0.5).unwrap();
        assert_eq!(tradeoff.cache().len(), 1);
        let knocked = community.with_knockout("a").unwrap();
        let maxima = tradeoff.individual_maxima(&knocked).unwrap();
        assert!(!maxima.can_grow("a"));
        assert_eq!(tradeoff.cache().len(), 2);
    }

    #[test]
    fn floors_follow_fraction_and_min_growth() {
        let community = pair();
        let tradeoff = robust().with_min_growth(MinGrowth::PerTaxon(IndexMap::from([(
            "b".to_string(),
            8.,
        )])));
        let maxima = IndividualMaxima {
            rates: IndexMap::from([("a".to_string(), 10.), ("b".to_string(), 10.)]),
            non_growing: vec![],
        };
        let floors = tradeoff.floors(&community, &maxima, 0.5, 1e-6, 0.);
        assert!((floors["a"] - 5.).abs() < 1e-5);
        assert_eq!(floors["b"], 8.);
        let minimal = tradeoff.floors(&community, &maxima, 0., 1e-6, 0.);
        assert_eq!(minimal["a"], 0.);
        assert_eq!(minimal["b"], 8.);
    }

    #[test]
    fn pfba_and_fluxes() {
        let community = pair();
        let mut tradeoff = robust().with_pfba(true).with_fluxes(true);
        let solution = tradeoff.run(&community, 0.5).unwrap();
        assert!(solution.diagnostics.parsimonious);
        assert_eq!(solution.diagnostics.regularization, Some(crate::configuration::RegularizationKind::Quadratic));
        let fluxes = solution.fluxes.as_ref().unwrap();
        assert!(community.mass_balance_violation(fluxes) < 1e-4);
        assert!((solution.growth_rate - 10.).abs() < 1e-3);
    }

    #[test]
    fn unknown_knockout() {
        let community = pair();
        let mut tradeoff = robust();
        assert!(matches!(
            tradeoff.knockout_taxa(&community, &["z"], 0.5, KnockoutMethod::Change),
            Err(TradeoffError::Model(ModelError::UnknownTaxon(_)))
        ));
    }
}
