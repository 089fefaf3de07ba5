//! Static reference data: region demographics and the postal-code lookup.
//!
//! Both tables are loaded once at startup and shared read-only between jobs.
//! Jobs copy region attributes into their own statistics rows instead of
//! mutating the shared tables.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{JobError, Result};
use crate::models::Region;

/// Coordinates and region for one postal code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostalEntry {
    /// Name of the region the postal code belongs to.
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Immutable lookup tables loaded at startup.
#[derive(Debug)]
pub struct ReferenceData {
    regions: Vec<Region>,
    postal: HashMap<String, PostalEntry>,
    national_population: u64,
}

impl ReferenceData {
    /// Load both tables from JSON files.
    ///
    /// The regions file holds an array of [`Region`]; the postal file maps
    /// postal-code strings to [`PostalEntry`] records.
    pub fn load(regions_file: &Path, postal_file: &Path) -> Result<Self> {
        let regions: Vec<Region> = read_json(regions_file)?;
        let postal: HashMap<String, PostalEntry> = read_json(postal_file)?;
        Self::from_parts(regions, postal)
    }

    /// Build reference data from already-parsed tables. Population weights
    /// are recomputed here so they always sum to one.
    pub fn from_parts(
        mut regions: Vec<Region>,
        postal: HashMap<String, PostalEntry>,
    ) -> Result<Self> {
        if regions.is_empty() {
            return Err(JobError::Reference("region table is empty".to_string()));
        }
        let national_population: u64 = regions.iter().map(|r| r.population).sum();
        if national_population == 0 {
            return Err(JobError::Reference(
                "region table has zero total population".to_string(),
            ));
        }
        for region in &mut regions {
            region.population_weight = region.population as f64 / national_population as f64;
        }
        for (code, entry) in &postal {
            if !regions.iter().any(|r| r.name == entry.region) {
                return Err(JobError::Reference(format!(
                    "postal code {} points at unknown region \"{}\"",
                    code, entry.region
                )));
            }
        }
        Ok(Self {
            regions,
            postal,
            national_population,
        })
    }

    /// The region table, in load order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Sum of all regions' populations.
    pub fn national_population(&self) -> u64 {
        self.national_population
    }

    /// Resolve a postal code to its region and coordinates. An unknown code
    /// is a hard error: silently dropping the listing would corrupt counts.
    pub fn resolve_postal(&self, code: &str) -> Result<&PostalEntry> {
        self.postal.get(code).ok_or_else(|| JobError::Attribution {
            postal_code: code.to_string(),
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| JobError::Reference(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| JobError::Reference(format!("failed to parse {}: {}", path.display(), e)))
}
