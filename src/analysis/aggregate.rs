//! Joins crawled listings and filter totals with the reference tables.

use std::collections::HashMap;

use crate::analysis::stats::{chi_square_gof, spearman};
use crate::error::Result;
use crate::models::{ChiSquare, CorrelationMatrix, JobKey, JobResult, Listing, RegionStats};
use crate::reference::ReferenceData;
use crate::scrapers::CrawlOutcome;

/// Rate scale: listings per million inhabitants.
const PER_MILLION: f64 = 1_000_000.0;

/// Columns entering the correlation matrix. Population weight and the
/// count/rate columns that are direct linear functions of population stay
/// out; they would produce degenerate correlations.
const CORRELATION_COLUMNS: [&str; 10] = [
    "total_rate",
    "total_count",
    "area_km2",
    "population",
    "density",
    "household_income",
    "mean_age",
    "age_0_17",
    "age_18_65",
    "age_66_100",
];

/// Turns one crawl outcome into the per-region statistics table and the
/// summary statistics. Holds only a borrow of the shared reference data;
/// all produced state is job-local.
pub struct RegionalAggregator<'a> {
    reference: &'a ReferenceData,
}

impl<'a> RegionalAggregator<'a> {
    pub fn new(reference: &'a ReferenceData) -> Self {
        Self { reference }
    }

    /// Build the immutable job result. Fails hard on attribution gaps;
    /// degenerate statistics degrade to `None` instead.
    pub fn aggregate(&self, key: JobKey, outcome: CrawlOutcome) -> Result<JobResult> {
        let (listings, totals) = self.enrich(outcome)?;
        let rows = self.count(&listings, &totals);
        let correlation = correlation_matrix(&rows);
        let chi_square = chi_square(&rows);

        Ok(JobResult {
            key,
            listings,
            rows,
            correlation,
            chi_square,
        })
    }

    /// Resolve every listing's postal code to region and coordinates. A
    /// missing postal code aborts the job: dropping the listing would
    /// silently corrupt the counts.
    fn enrich(&self, outcome: CrawlOutcome) -> Result<(Vec<Listing>, Vec<(String, u64)>)> {
        let mut enriched = Vec::with_capacity(outcome.listings.len());
        for raw in outcome.listings {
            let postal_code = raw
                .location
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            let entry = self.reference.resolve_postal(&postal_code)?;
            enriched.push(Listing {
                href: raw.href,
                price: raw.price,
                location: raw.location,
                posted: raw.posted,
                postal_code,
                region: entry.region.clone(),
                latitude: entry.latitude,
                longitude: entry.longitude,
            });
        }
        Ok((enriched, outcome.region_totals))
    }

    /// Per-region counting plus the derived rates and expectations.
    fn count(&self, listings: &[Listing], totals: &[(String, u64)]) -> Vec<RegionStats> {
        let mut rows: Vec<RegionStats> = self
            .reference
            .regions()
            .iter()
            .map(|region| RegionStats {
                region: region.clone(),
                total_count: 0,
                total_rate: 0.0,
                expected_total: 0.0,
                sample_count: 0,
                sample_rate: 0.0,
                expected_sample: 0.0,
            })
            .collect();

        let index: HashMap<&str, usize> = self
            .reference
            .regions()
            .iter()
            .enumerate()
            .map(|(i, region)| (region.name.as_str(), i))
            .collect();

        for (name, count) in totals {
            match index.get(name.as_str()) {
                Some(&i) => rows[i].total_count = *count,
                None => {
                    tracing::warn!("filter total for unknown region \"{}\" ignored", name)
                }
            }
        }

        for listing in listings {
            if let Some(&i) = index.get(listing.region.as_str()) {
                rows[i].sample_count += 1;
            }
        }

        let collected = listings.len() as f64;
        let national_total: u64 = rows.iter().map(|r| r.total_count).sum();
        for row in &mut rows {
            let population = row.region.population as f64;
            row.sample_rate = row.sample_count as f64 / population * PER_MILLION;
            row.total_rate = row.total_count as f64 / population * PER_MILLION;
            row.expected_sample = row.region.population_weight * collected;
            row.expected_total = row.region.population_weight * national_total as f64;
        }

        rows
    }
}

fn column_value(row: &RegionStats, column: &str) -> f64 {
    match column {
        "total_rate" => row.total_rate,
        "total_count" => row.total_count as f64,
        "area_km2" => row.region.area_km2,
        "population" => row.region.population as f64,
        "density" => row.region.density(),
        "household_income" => row.region.household_income,
        "mean_age" => row.region.mean_age,
        "age_0_17" => row.region.age_0_17,
        "age_18_65" => row.region.age_18_65,
        "age_66_100" => row.region.age_66_100,
        other => unreachable!("unknown correlation column {other}"),
    }
}

/// Spearman rank correlation matrix over the non-derived numeric columns.
/// `None` when fewer than two usable columns or fewer than two regions
/// remain.
fn correlation_matrix(rows: &[RegionStats]) -> Option<CorrelationMatrix> {
    if rows.len() < 2 || CORRELATION_COLUMNS.len() < 2 {
        return None;
    }

    let series: Vec<Vec<f64>> = CORRELATION_COLUMNS
        .iter()
        .map(|col| rows.iter().map(|row| column_value(row, col)).collect())
        .collect();

    let n = series.len();
    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let r = if i == j {
                1.0
            } else {
                spearman(&series[i], &series[j])
            };
            values[i][j] = r;
            values[j][i] = r;
        }
    }

    Some(CorrelationMatrix {
        columns: CORRELATION_COLUMNS.iter().map(|c| c.to_string()).collect(),
        values,
    })
}

/// Chi-square test of observed totals against the population-share
/// expectation, df = regions - 1.
fn chi_square(rows: &[RegionStats]) -> Option<ChiSquare> {
    let observed: Vec<f64> = rows.iter().map(|r| r.total_count as f64).collect();
    let expected: Vec<f64> = rows.iter().map(|r| r.expected_total).collect();

    let (statistic, p_value) = chi_square_gof(&observed, &expected)?;
    Some(ChiSquare {
        statistic,
        p_value,
        degrees_of_freedom: rows.len() - 1,
        national_total: rows.iter().map(|r| r.total_count).sum(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::RawListing;
    use crate::reference::test_fixtures::{postal, region};

    fn reference() -> ReferenceData {
        let mut postal_map = HashMap::new();
        postal_map.insert("11111".to_string(), postal("A", 50.0, 10.0));
        postal_map.insert("22222".to_string(), postal("B", 52.0, 12.0));
        ReferenceData::from_parts(
            vec![region("A", "AA", 600_000), region("B", "BB", 400_000)],
            postal_map,
        )
        .unwrap()
    }

    fn raw(href: &str, postal_code: &str) -> RawListing {
        RawListing {
            href: href.to_string(),
            price: "10 €".to_string(),
            location: format!("{postal_code} Somewhere"),
            posted: "Heute, 09:00".to_string(),
        }
    }

    fn key() -> JobKey {
        JobKey {
            term: "bicycle".to_string(),
            sample_size: 25,
            max_age_days: 30,
        }
    }

    #[test]
    fn observed_counts_sum_to_collected_listings() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![
                raw("/a/1", "11111"),
                raw("/a/2", "11111"),
                raw("/b/1", "22222"),
            ],
            region_totals: vec![("A".to_string(), 100), ("B".to_string(), 50)],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();

        let sample_sum: u64 = result.rows.iter().map(|r| r.sample_count).sum();
        assert_eq!(sample_sum, result.listings.len() as u64);

        let expected_sum: f64 = result.rows.iter().map(|r| r.expected_sample).sum();
        assert!((expected_sum - result.listings.len() as f64).abs() < 1e-9);

        let expected_total_sum: f64 = result.rows.iter().map(|r| r.expected_total).sum();
        assert!((expected_total_sum - 150.0).abs() < 1e-9);
    }

    #[test]
    fn rates_are_per_million_inhabitants() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "11111")],
            region_totals: vec![("A".to_string(), 60)],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();

        let a = &result.rows[0];
        assert_eq!(a.region.name, "A");
        // 1 listing over 600k inhabitants = 1.666... per million.
        assert!((a.sample_rate - 1.0 / 0.6).abs() < 1e-9);
        assert!((a.total_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn end_to_end_expectations_and_chi_square() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "11111")],
            region_totals: vec![("A".to_string(), 100), ("B".to_string(), 50)],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();

        // Weights {0.6, 0.4} over a national total of 150.
        assert!((result.rows[0].expected_total - 90.0).abs() < 1e-9);
        assert!((result.rows[1].expected_total - 60.0).abs() < 1e-9);

        let chi = result.chi_square.expect("chi-square should be defined");
        assert_eq!(chi.degrees_of_freedom, 1);
        assert_eq!(chi.national_total, 150);
        assert!(chi.statistic.is_finite());
        assert!(!chi.p_value.is_nan());
    }

    #[test]
    fn all_zero_totals_degrade_chi_square_to_unavailable() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "11111")],
            region_totals: vec![],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();
        assert!(result.chi_square.is_none());
        // The rest of the table stays valid.
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].sample_count, 1);
    }

    #[test]
    fn unknown_postal_code_aborts_aggregation() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "99999")],
            region_totals: vec![("A".to_string(), 10)],
        };

        let err = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap_err();
        assert_eq!(err.kind(), "attribution_failure");
    }

    #[test]
    fn unknown_filter_region_is_ignored_not_fatal() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "11111")],
            region_totals: vec![("A".to_string(), 10), ("Atlantis".to_string(), 5)],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();
        assert_eq!(result.national_total(), 10);
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let reference = reference();
        let outcome = CrawlOutcome {
            listings: vec![raw("/a/1", "11111"), raw("/b/1", "22222")],
            region_totals: vec![("A".to_string(), 100), ("B".to_string(), 50)],
        };

        let result = RegionalAggregator::new(&reference)
            .aggregate(key(), outcome)
            .unwrap();
        let matrix = result.correlation.expect("matrix should be available");
        assert_eq!(matrix.columns.len(), CORRELATION_COLUMNS.len());
        for i in 0..matrix.columns.len() {
            assert_eq!(matrix.values[i][i], 1.0);
            for j in 0..matrix.columns.len() {
                let a = matrix.values[i][j];
                let b = matrix.values[j][i];
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
    }
}
