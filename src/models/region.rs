//! Static demographic attributes of one region.

use serde::{Deserialize, Serialize};

/// One of the 16 fixed top-level administrative regions used as the
/// aggregation granularity. Reference data; never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region name; identity within the reference table.
    pub name: String,
    /// Official region code (e.g. "BY").
    pub code: String,
    /// Absolute number of inhabitants.
    pub population: u64,
    /// Area in square kilometres.
    pub area_km2: f64,
    /// Mean disposable yearly household income.
    pub household_income: f64,
    /// Mean age across all inhabitants.
    pub mean_age: f64,
    /// Percentage of inhabitants aged 0-17.
    pub age_0_17: f64,
    /// Percentage of inhabitants aged 18-65.
    pub age_18_65: f64,
    /// Percentage of inhabitants aged 66 and above.
    pub age_66_100: f64,
    /// Population divided by national population. Recomputed when the
    /// reference table is loaded so the weights always sum to one.
    #[serde(default)]
    pub population_weight: f64,
}

impl Region {
    /// Inhabitants per square kilometre.
    pub fn density(&self) -> f64 {
        self.population as f64 / self.area_km2
    }
}
