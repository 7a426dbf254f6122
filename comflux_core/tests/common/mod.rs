//! Toy communities shared by the integration tests
#![allow(dead_code)]

use comflux_core::community::{Community, Member, MemberBuilder};
use comflux_core::configuration::{Configuration, ConfigurationBuilder, RegularizationKind, SolverChoice};
use comflux_core::metabolic_model::metabolite::MetaboliteBuilder;
use comflux_core::metabolic_model::model::Model;
use comflux_core::metabolic_model::reaction::ReactionBuilder;

/// A taxon that takes up `nutrient` and turns it into biomass at a rate of at most `max_growth`
pub fn single_nutrient_model(id: &str, nutrient: &str, import: f64, max_growth: f64) -> Model {
    let mut model = Model::new(id);
    let external = format!("{}_e", nutrient);
    let internal = format!("{}_c", nutrient);
    for (met, comp) in [(external.as_str(), "e"), (internal.as_str(), "c")] {
        model.add_metabolite(
            MetaboliteBuilder::default()
                .id(met)
                .compartment(comp)
                .build()
                .unwrap(),
        );
    }
    let exchange = format!("EX_{}", external);
    let transport = format!("{}t", nutrient.to_uppercase());
    let reactions = [
        (exchange.as_str(), vec![(external.as_str(), -1.)], -import, 1000.),
        (
            transport.as_str(),
            vec![(external.as_str(), -1.), (internal.as_str(), 1.)],
            0.,
            1000.,
        ),
        ("Growth", vec![(internal.as_str(), -1.)], 0., max_growth),
    ];
    for (rxn, mets, lb, ub) in reactions {
        model.add_reaction(
            ReactionBuilder::default()
                .id(rxn)
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

pub fn member(id: &str, model: Model, abundance: f64) -> Member {
    MemberBuilder::default()
        .id(id)
        .model(model)
        .abundance(abundance)
        .build()
        .unwrap()
}

/// Three taxa at equal abundance, growing up to 1.0, 0.5 and 0.2 on 0.4 units of shared glucose
pub fn competing_trio() -> Community {
    let taxa = [("x", 1.0), ("y", 0.5), ("z", 0.2)];
    Community::builder("trio")
        .members(
            taxa.iter()
                .map(|(id, max)| member(id, single_nutrient_model(id, "glc", 0.4, *max), 1.)),
        )
        .build()
        .unwrap()
}

/// Two identical taxa at equal abundance with plenty of glucose
pub fn identical_pair() -> Community {
    Community::builder("twins")
        .member(member("left", single_nutrient_model("left", "glc", 100., 10.), 0.5))
        .member(member("right", single_nutrient_model("right", "glc", 100., 10.), 0.5))
        .build()
        .unwrap()
}

/// A glucose consumer next to a taxon that only grows on acetate, which is not in the medium
pub fn starved_pair() -> Community {
    Community::builder("starved")
        .member(member("eater", single_nutrient_model("eater", "glc", 10., 1.), 1.))
        .member(member("starved", single_nutrient_model("starved", "ac", 0., 1.), 1.))
        .build()
        .unwrap()
}

pub fn robust() -> Configuration {
    ConfigurationBuilder::default()
        .solver(SolverChoice::Robust)
        .build()
        .unwrap()
}

pub fn linear() -> Configuration {
    ConfigurationBuilder::default()
        .solver(SolverChoice::Robust)
        .regularization(RegularizationKind::Linear)
        .build()
        .unwrap()
}
