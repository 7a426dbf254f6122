//! Module providing JSON IO for taxon models and abundance tables
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, ReactionActivity, ReactionBuilder, ReactionBuilderError};

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in the COBRA
/// json format. Genes, notes and annotations are accepted but not carried over.
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    genes: Vec<serde_json::Value>,
    id: Option<String>,
    compartments: Option<IndexMap<String, String>>,
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    charge: Option<i32>,
    formula: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(default)]
    gene_reaction_rule: String,
    objective_coefficient: Option<f64>,
    subsystem: Option<String>,
}
// endregion JSON Model

// region Conversions
impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
        }
    }
}

impl From<Metabolite> for JsonMetabolite {
    fn from(m: Metabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: Some(m.charge),
            formula: m.formula,
        }
    }
}

impl Model {
    /// Read a COBRA json model from a file
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, JsonError> {
        let model_str = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(JsonError::UnableToRead(format!("{:?}", err))),
        };
        Model::from_json_str(&model_str)
    }

    /// Parse a COBRA json model from a string
    pub fn from_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = match serde_json::from_str::<JsonModel>(model_str) {
            Ok(model) => model,
            Err(err) => return Err(JsonError::UnableToParse(format!("{:?}", err))),
        };
        Model::from_json(json_model)
    }

    /// Write the model to a file in the COBRA json format
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        let model_string = self.to_json_string()?;
        fs::write(path, model_string)?;
        Ok(())
    }

    /// Serialize the model into a COBRA json string
    pub fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut model = Model::new_empty();
        json_model.metabolites.into_iter().for_each(|m| {
            model.add_metabolite(Metabolite::from(m));
        });
        for rxn in json_model.reactions {
            if let Some(missing) = rxn
                .metabolites
                .keys()
                .find(|m| !model.metabolites.contains_key(*m))
            {
                return Err(JsonError::UnknownMetabolite {
                    reaction: rxn.id,
                    metabolite: missing.clone(),
                });
            }
            let mut builder = ReactionBuilder::default();
            builder
                .id(rxn.id.clone())
                .metabolites(rxn.metabolites)
                .lower_bound(rxn.lower_bound)
                .upper_bound(rxn.upper_bound)
                .activity(ReactionActivity::Active);
            if let Some(name) = rxn.name {
                builder.name(name);
            }
            if let Some(subsystem) = rxn.subsystem {
                builder.subsystem(subsystem);
            }
            model.add_reaction(builder.build()?);
            // Add the reaction to the objective function if desired
            if let Some(coef) = rxn.objective_coefficient {
                if coef != 0. {
                    model.objective.insert(rxn.id, coef);
                }
            }
        }
        model.id = json_model.id;
        model.compartments = json_model.compartments;
        model.version = json_model.version;
        Ok(model)
    }

    fn to_json(&self) -> JsonModel {
        let metabolites = self
            .metabolites
            .values()
            .map(|m| m.clone().into())
            .collect();
        let reactions = self
            .reactions
            .values()
            .map(|r: &Reaction| JsonReaction {
                id: r.id.clone(),
                name: r.name.clone(),
                metabolites: r.metabolites.clone(),
                lower_bound: r.lower_bound,
                upper_bound: r.upper_bound,
                gene_reaction_rule: String::new(),
                objective_coefficient: self.objective.get(&r.id).copied(),
                subsystem: r.subsystem.clone(),
            })
            .collect();
        JsonModel {
            metabolites,
            reactions,
            genes: Vec::new(),
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}
// endregion Conversions

// region Abundances
/// One row of an abundance table given as a list of records
#[derive(Deserialize)]
struct AbundanceRecord {
    id: String,
    abundance: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AbundanceTable {
    Map(IndexMap<String, f64>),
    Records(Vec<AbundanceRecord>),
}

/// Parse an abundance table, either `{"taxon": abundance}` or
/// `[{"id": "taxon", "abundance": 0.3}]`
pub fn abundances_from_json_str(data: &str) -> Result<IndexMap<String, f64>, JsonError> {
    let table: AbundanceTable =
        serde_json::from_str(data).map_err(|err| JsonError::UnableToParse(format!("{:?}", err)))?;
    Ok(match table {
        AbundanceTable::Map(map) => map,
        AbundanceTable::Records(records) => records
            .into_iter()
            .map(|r| (r.id, r.abundance))
            .collect(),
    })
}

/// Read an abundance table from a json file, see [`abundances_from_json_str`]
pub fn read_abundances<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, f64>, JsonError> {
    let data = fs::read_to_string(path).map_err(|err| JsonError::UnableToRead(format!("{:?}", err)))?;
    abundances_from_json_str(&data)
}
// endregion Abundances

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to read file due to {0}")]
    UnableToRead(String),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Reaction {reaction} references unknown metabolite {metabolite}")]
    UnknownMetabolite { reaction: String, metabolite: String },
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Serde json parse error")]
    SerdeJsonParseError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}
