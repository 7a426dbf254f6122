mod common;

use common::*;
use comflux_core::configuration::{ConfigurationBuilder, CrossoverMode, SolverChoice};
use comflux_core::tradeoff::knockout::KnockoutMethod;
use comflux_core::community::SolutionWarning;
use comflux_core::optimize::solvers::Backend;
use comflux_core::optimize::OptimizationStatus;
use comflux_core::tradeoff::{MinGrowth, Stage, Tradeoff, TradeoffError};

#[test]
fn full_fraction_is_community_fba() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let optimum = tradeoff.max_community_growth(&community).unwrap();
    assert!((optimum - 0.4).abs() < 1e-4);
    let solution = tradeoff.run(&community, 1.0).unwrap();
    assert!((solution.growth_rate - optimum).abs() < 1e-4);
    // x, y and z at their maxima would need 0.57 units of glucose, so the floors go
    assert!(solution
        .warnings
        .iter()
        .any(|w| matches!(w, SolutionWarning::FloorsRelaxed { fraction } if *fraction == 1.0)));
    assert!(!solution.is_degenerate());
    let rates = solution.growth_rates();
    assert!((rates["x"] - 2.5 / 3.).abs() < 1e-3, "{:?}", rates);
    assert!((rates["y"] - 1. / 3.).abs() < 1e-3, "{:?}", rates);
    assert!((rates["z"] - 0.1 / 3.).abs() < 1e-3, "{:?}", rates);
}

#[test]
fn lower_fraction_keeps_community_growth() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let maxima = tradeoff.individual_maxima(&community).unwrap();
    let full = tradeoff.run(&community, 1.0).unwrap();
    let half = tradeoff.run(&community, 0.5).unwrap();
    assert!(half.growth_rate >= full.growth_rate - 1e-4);
    assert!(half.warnings.is_empty());
    for (taxon, member) in &half.members {
        assert!(member.growth_rate >= 0.5 * maxima.rates[taxon] - 1e-4);
    }
}

#[test]
fn half_fraction_shares_glucose() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let maxima = tradeoff.individual_maxima(&community).unwrap();
    assert!((maxima.rates["x"] - 1.0).abs() < 1e-4);
    assert!((maxima.rates["y"] - 0.5).abs() < 1e-4);
    assert!((maxima.rates["z"] - 0.2).abs() < 1e-4);

    let solution = tradeoff.run(&community, 0.5).unwrap();
    assert!((solution.growth_rate - 0.4).abs() < 1e-3);
    let rates = solution.growth_rates();
    // closest point to the maxima with z held at its floor of 0.1
    assert!((rates["x"] - 0.8).abs() < 1e-3, "{:?}", rates);
    assert!((rates["y"] - 0.3).abs() < 1e-3, "{:?}", rates);
    assert!((rates["z"] - 0.1).abs() < 1e-3, "{:?}", rates);
    assert_eq!(solution.fraction, Some(0.5));
    assert!(solution.imports.contains_key("EX_glc_m"));
}

#[test]
fn every_growing_taxon_keeps_its_floor() {
    let community = competing_trio();
    for config in [robust(), linear()] {
        let mut tradeoff = Tradeoff::new(config);
        let maxima = tradeoff.individual_maxima(&community).unwrap();
        let solution = tradeoff.run(&community, 0.3).unwrap();
        for (taxon, member) in &solution.members {
            assert!(member.growth_rate >= 0.3 * maxima.rates[taxon] - 1e-4);
        }
        assert!((solution.growth_rate - 0.4).abs() < 1e-3);
    }
}

#[test]
fn full_fraction_matches_community_optimum() {
    let community = identical_pair();
    let mut tradeoff = Tradeoff::new(robust());
    let optimum = tradeoff.max_community_growth(&community).unwrap();
    assert!((optimum - 10.).abs() < 1e-4);
    let solution = tradeoff.run(&community, 1.0).unwrap();
    assert!((solution.growth_rate - optimum).abs() < 1e-3);
    for member in solution.members.values() {
        assert!((member.growth_rate - 10.).abs() < 1e-3);
    }
}

#[test]
fn taxon_without_nutrients_does_not_grow() {
    let community = starved_pair();
    let mut tradeoff = Tradeoff::new(robust());
    let maxima = tradeoff.individual_maxima(&community).unwrap();
    assert_eq!(maxima.non_growing, vec!["starved".to_string()]);
    let solution = tradeoff.run(&community, 0.9).unwrap();
    assert_eq!(solution.members["starved"].growth_rate, 0.);
    assert!(solution.members["eater"].growth_rate > 0.89);
}

#[test]
fn steady_state_holds() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust()).with_fluxes(true).with_pfba(true);
    let solution = tradeoff.run(&community, 0.5).unwrap();
    let fluxes = solution.fluxes.as_ref().unwrap();
    assert!(community.mass_balance_violation(fluxes) < 1e-5);
    let by_taxon = solution.fluxes_by_taxon(&community).unwrap();
    assert!(by_taxon["x"].contains_key("Growth"));
}

#[test]
fn growth_does_not_increase_with_fraction() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let results = tradeoff.scan(&community, &[0.1, 0.5, 1.0, 0.3]).unwrap();
    let fractions: Vec<f64> = results.iter().map(|(f, _)| *f).collect();
    assert_eq!(fractions, vec![1.0, 0.5, 0.3, 0.1]);
    let growth: Vec<f64> = results
        .iter()
        .map(|(_, s)| s.as_ref().unwrap().growth_rate)
        .collect();
    for pair in growth.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-4);
    }
    assert!((growth[0] - 0.4).abs() < 1e-4);
    let growing: Vec<usize> = results
        .iter()
        .map(|(_, s)| {
            s.as_ref()
                .unwrap()
                .members
                .values()
                .filter(|m| m.growth_rate > 0.)
                .count()
        })
        .collect();
    for pair in growing.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    // the maxima were only computed once for the whole scan
    assert_eq!(tradeoff.cache().len(), 1);
}

#[test]
fn runs_are_reproducible() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let first = tradeoff.run(&community, 0.5).unwrap();
    let second = tradeoff.run(&community, 0.5).unwrap();
    for (taxon, rate) in first.growth_rates() {
        assert!((second.growth_rates()[&taxon] - rate).abs() < 1e-6);
    }
}

#[test]
fn min_growth_is_enforced() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust()).with_min_growth(MinGrowth::Uniform(0.15));
    let solution = tradeoff.run(&community, 0.1).unwrap();
    assert!(solution.members["z"].growth_rate >= 0.15 - 1e-4);
}

#[test]
fn conflicting_min_growth_is_infeasible() {
    let community = competing_trio();
    // z can not grow faster than 0.2 on its own
    let mut tradeoff = Tradeoff::new(robust()).with_min_growth(MinGrowth::Uniform(0.9));
    match tradeoff.run(&community, 0.5) {
        Err(TradeoffError::InfeasibleTradeoff {
            community,
            fraction,
            floors,
        }) => {
            assert_eq!(community, "trio");
            assert_eq!(fraction, 0.5);
            assert!((floors["z"] - 0.9).abs() < 1e-4);
        }
        other => panic!("expected an infeasible tradeoff, got {:?}", other),
    }
    let results = tradeoff.scan(&community, &[1.0, 0.5]).unwrap();
    assert!(results.iter().all(|(_, s)| s.is_none()));
}

#[test]
fn stalled_solver_is_a_numerical_error() {
    let community = competing_trio();
    let config = ConfigurationBuilder::default()
        .solver(SolverChoice::Robust)
        .max_iter(1)
        .build()
        .unwrap();
    let mut tradeoff = Tradeoff::new(config);
    match tradeoff.run(&community, 0.5) {
        Err(TradeoffError::SolverNumerical {
            stage,
            taxon,
            attempts,
        }) => {
            assert_eq!(stage, Stage::IndividualMax);
            assert_eq!(taxon.as_deref(), Some("x"));
            assert_eq!(
                attempts,
                vec![
                    (Backend::Clarabel, OptimizationStatus::SolverHalted),
                    (Backend::Clarabel, OptimizationStatus::SolverHalted),
                ]
            );
        }
        other => panic!("expected a numerical failure, got {:?}", other),
    }
}

#[test]
fn crossover_keeps_growth_rates() {
    let community = competing_trio();
    let config = ConfigurationBuilder::default()
        .solver(SolverChoice::Robust)
        .crossover(CrossoverMode::Always)
        .build()
        .unwrap();
    let mut tradeoff = Tradeoff::new(config);
    let solution = tradeoff.run(&community, 0.5).unwrap();
    assert!(solution.diagnostics.crossover);
    assert!((solution.growth_rates()["x"] - 0.8).abs() < 1e-3);
    assert!(!solution.is_degenerate());
}

#[test]
fn knockouts() {
    let community = competing_trio();
    let mut tradeoff = Tradeoff::new(robust());
    let result = tradeoff.knockout(&community, "x", 0.5).unwrap();
    assert_eq!(result.solution.members["x"].growth_rate, 0.);
    assert_eq!(result.solution.members["x"].abundance, 0.);
    // y and z reach their maxima of 0.5 and 0.2 at a third of the community each
    assert!((result.growth_delta - (0.7 / 3. - 0.4)).abs() < 1e-3);

    let knocked = community.with_knockout("x").unwrap();
    let before = tradeoff.individual_maxima(&community).unwrap();
    let after = tradeoff.individual_maxima(&knocked).unwrap();
    assert_eq!(after.rates["x"], 0.);
    for taxon in ["y", "z"] {
        assert!((after.rates[taxon] - before.rates[taxon]).abs() < 1e-4);
    }

    let table = tradeoff
        .knockout_taxa(&community, &["x", "z"], 0.5, KnockoutMethod::Change)
        .unwrap();
    assert_eq!(table.knocked_out, vec!["x".to_string(), "z".to_string()]);
    assert!((table.get("x", "x").unwrap() + 0.8).abs() < 1e-3);
    assert!(table.get("z", "x").unwrap() >= -1e-4);
}

#[test]
fn solution_serializes() {
    let community = identical_pair();
    let mut tradeoff = Tradeoff::new(robust());
    let solution = tradeoff.run(&community, 0.5).unwrap();
    let json = solution.to_json_string().unwrap();
    assert!(json.contains("\"twins\""));
    assert!(json.contains("\"left\""));
}
