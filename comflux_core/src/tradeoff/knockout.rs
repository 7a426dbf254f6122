//! Effects of removing taxa from a community
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::community::solution::CommunitySolution;

/// How knockout effects are reported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnockoutMethod {
    /// Growth rates after the knockout
    Raw,
    /// Difference to the growth rates before the knockout
    Change,
    /// Difference relative to the growth rates before the knockout
    RelativeChange,
}

impl KnockoutMethod {
    /// The reported effect for a growth rate going from `before` to `after`
    ///
    /// A relative change from zero is NaN unless the rate stays zero.
    pub fn effect(&self, before: f64, after: f64) -> f64 {
        match self {
            KnockoutMethod::Raw => after,
            KnockoutMethod::Change => after - before,
            KnockoutMethod::RelativeChange => {
                if before == 0. {
                    if after == 0. {
                        0.
                    } else {
                        f64::NAN
                    }
                } else {
                    (after - before) / before
                }
            }
        }
    }
}

/// The community after knocking out one taxon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnockoutResult {
    pub taxon: String,
    pub solution: CommunitySolution,
    /// Community growth after the knockout minus community growth before it
    pub growth_delta: f64,
}

/// Growth effects of knocking out taxa one at a time
///
/// `values[i][j]` is the effect of knocking out `knocked_out[i]` on `taxa[j]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnockoutTable {
    pub method: KnockoutMethod,
    pub knocked_out: Vec<String>,
    pub taxa: Vec<String>,
    pub values: Vec<Vec<f64>>,
    /// Change in community growth for every knocked out taxon
    pub community_growth_delta: Vec<f64>,
}

impl KnockoutTable {
    pub(crate) fn new(method: KnockoutMethod, taxa: Vec<String>) -> Self {
        KnockoutTable {
            method,
            knocked_out: Vec::new(),
            taxa,
            values: Vec::new(),
            community_growth_delta: Vec::new(),
        }
    }

    /// Add the row of one knockout
    pub(crate) fn push(&mut self, before: &IndexMap<String, f64>, result: &KnockoutResult) {
        let after = result.solution.growth_rates();
        let row = self
            .taxa
            .iter()
            .map(|taxon| {
                self.method.effect(
                    before.get(taxon).copied().unwrap_or(0.),
                    after.get(taxon).copied().unwrap_or(0.),
                )
            })
            .collect();
        self.knocked_out.push(result.taxon.clone());
        self.values.push(row);
        self.community_growth_delta.push(result.growth_delta);
    }

    /// Effect of knocking out `knocked_out` on `taxon`
    pub fn get(&self, knocked_out: &str, taxon: &str) -> Option<f64> {
        let row = self.knocked_out.iter().position(|t| t == knocked_out)?;
        let column = self.taxa.iter().position(|t| t == taxon)?;
        self.values.get(row)?.get(column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects() {
        assert_eq!(KnockoutMethod::Raw.effect(2., 1.), 1.);
        assert_eq!(KnockoutMethod::Change.effect(2., 1.), -1.);
        assert_eq!(KnockoutMethod::RelativeChange.effect(2., 1.), -0.5);
        assert_eq!(KnockoutMethod::RelativeChange.effect(0., 0.), 0.);
        assert!(KnockoutMethod::RelativeChange.effect(0., 1.).is_nan());
    }
}
