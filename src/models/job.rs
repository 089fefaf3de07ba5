//! Job parameters and the immutable job result.

use std::fmt;

use serde::Serialize;

use crate::config::Settings;
use crate::models::{Listing, Region};

/// Parameters of one search job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Search term, trimmed and lowercased.
    pub term: String,
    /// Number of listings to collect at most.
    pub sample_size: u32,
    /// Maximum listing age in days.
    pub max_age_days: u32,
}

impl JobRequest {
    /// Build a request with a normalized term.
    pub fn new(term: &str, sample_size: u32, max_age_days: u32) -> Self {
        Self {
            term: term.trim().to_lowercase(),
            sample_size,
            max_age_days,
        }
    }

    /// Clamp the request to the configured per-job ceilings.
    pub fn clamped(mut self, settings: &Settings) -> Self {
        self.sample_size = self.sample_size.min(settings.max_sample_size);
        self.max_age_days = self.max_age_days.min(settings.max_age_ceiling_days);
        self
    }

    /// Composite key under which the result is stored.
    pub fn key(&self) -> JobKey {
        JobKey {
            term: self.term.clone(),
            sample_size: self.sample_size,
            max_age_days: self.max_age_days,
        }
    }
}

/// Composite key addressing a job result. Re-running an identical job
/// overwrites the prior result under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub term: String,
    pub sample_size: u32,
    pub max_age_days: u32,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.term, self.sample_size, self.max_age_days)
    }
}

/// Per-region statistics row derived for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    /// Static region attributes (copied from reference data).
    pub region: Region,
    /// Authoritative count of all matching listings reported by the
    /// source's own region filter, independent of the sample.
    pub total_count: u64,
    /// `total_count` per million inhabitants.
    pub total_rate: f64,
    /// Expected `total_count` under a uniform-by-population null.
    pub expected_total: f64,
    /// Listings from the crawled sample attributed to this region.
    pub sample_count: u64,
    /// `sample_count` per million inhabitants.
    pub sample_rate: f64,
    /// Expected `sample_count` under a uniform-by-population null.
    pub expected_sample: f64,
}

/// Chi-square goodness-of-fit result for observed vs expected totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquare {
    pub statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: usize,
    /// Sum of the per-region filter totals the test was run against.
    pub national_total: u64,
}

/// Spearman rank correlation matrix over the regional statistics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    /// Column labels, in matrix order.
    pub columns: Vec<String>,
    /// Row-major correlation coefficients, `columns.len()` square.
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Coefficient for a pair of columns, by label.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

/// The immutable outcome of one completed job.
#[derive(Debug)]
pub struct JobResult {
    /// Key this result is addressed by.
    pub key: JobKey,
    /// Enriched listings in the order they were collected.
    pub listings: Vec<Listing>,
    /// One statistics row per region, in reference-table order.
    pub rows: Vec<RegionStats>,
    /// `None` when too few usable columns remain (unavailable, not an error).
    pub correlation: Option<CorrelationMatrix>,
    /// `None` when the statistic is undefined (unavailable, not an error).
    pub chi_square: Option<ChiSquare>,
}

impl JobResult {
    /// Sum of the per-region filter totals.
    pub fn national_total(&self) -> u64 {
        self.rows.iter().map(|r| r.total_count).sum()
    }
}
