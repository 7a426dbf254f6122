//! This module provides the metabolite struct representing a metabolite

use std::hash::Hash;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Represents a metabolite
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    #[builder(setter(into))]
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(setter(into, strip_option), default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(setter(into, strip_option), default = "None")]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite
    #[builder(default = "0")]
    pub charge: i32,
    /// Chemical Formula of the metabolite
    #[builder(setter(into, strip_option), default = "None")]
    pub formula: Option<String>,
}

impl Metabolite {
    /// The id with the compartment suffix removed
    ///
    /// `glc__D_e` in compartment `e` becomes `glc__D`. Ids that do not carry their
    /// compartment as a suffix are returned unchanged.
    pub fn id_without_compartment(&self) -> &str {
        match &self.compartment {
            Some(compartment) => {
                let suffix = format!("_{}", compartment);
                match self.id.strip_suffix(&suffix) {
                    Some(stripped) if !stripped.is_empty() => stripped,
                    _ => &self.id,
                }
            }
            None => &self.id,
        }
    }
}

impl Hash for Metabolite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state); // Hash by id
                             // If the metabolite has an associated compartment, also hash by that
        if let Some(ref compartment) = self.compartment {
            compartment.hash(state)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_compartment() {
        let met = MetaboliteBuilder::default()
            .id("glc__D_e")
            .compartment("e")
            .build()
            .unwrap();
        assert_eq!(met.id_without_compartment(), "glc__D");

        let odd = MetaboliteBuilder::default()
            .id("M_glucose")
            .compartment("e")
            .build()
            .unwrap();
        assert_eq!(odd.id_without_compartment(), "M_glucose");
    }
}
