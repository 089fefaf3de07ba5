//! End-to-end pipeline tests against a synthetic listing source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use adatlas::config::Settings;
use adatlas::models::{JobRequest, RawListing, Region};
use adatlas::quota::QuotaTracker;
use adatlas::reference::{PostalEntry, ReferenceData};
use adatlas::scrapers::{
    Crawler, FetchError, FetchedPage, NoopSleeper, PageFetcher, RetryPolicy,
};
use adatlas::services::JobRunner;

fn region(name: &str, code: &str, population: u64) -> Region {
    Region {
        name: name.to_string(),
        code: code.to_string(),
        population,
        area_km2: 10_000.0,
        household_income: 23_000.0,
        mean_age: 44.0,
        age_0_17: 16.0,
        age_18_65: 62.0,
        age_66_100: 22.0,
        population_weight: 0.0,
    }
}

fn reference() -> ReferenceData {
    let mut postal = HashMap::new();
    postal.insert(
        "11111".to_string(),
        PostalEntry {
            region: "Ahrland".to_string(),
            latitude: 50.1,
            longitude: 9.8,
        },
    );
    postal.insert(
        "22222".to_string(),
        PostalEntry {
            region: "Beckgau".to_string(),
            latitude: 52.4,
            longitude: 11.2,
        },
    );
    ReferenceData::from_parts(
        vec![
            region("Ahrland", "AH", 600_000),
            region("Beckgau", "BG", 400_000),
        ],
        postal,
    )
    .unwrap()
}

/// Serves one fixed first page and empty pages thereafter.
struct SyntheticSource {
    listings: Vec<RawListing>,
    totals: Vec<(String, u64)>,
}

impl SyntheticSource {
    fn new(listings: Vec<RawListing>, totals: Vec<(String, u64)>) -> Self {
        Self { listings, totals }
    }
}

#[async_trait]
impl PageFetcher for SyntheticSource {
    async fn fetch_page(
        &self,
        _term: &str,
        page_index: usize,
    ) -> Result<FetchedPage, FetchError> {
        if page_index == 0 {
            Ok(FetchedPage {
                listings: self.listings.clone(),
                blocked: false,
                region_totals: Some(self.totals.clone()),
            })
        } else {
            Ok(FetchedPage::default())
        }
    }
}

fn listing(href: &str, postal_code: &str) -> RawListing {
    RawListing {
        href: href.to_string(),
        price: "40 €".to_string(),
        location: format!("{postal_code} Kreisstadt"),
        posted: "Heute, 10:15".to_string(),
    }
}

fn runner_with(
    settings: Settings,
    listings: Vec<RawListing>,
    totals: Vec<(String, u64)>,
) -> JobRunner {
    let quota = QuotaTracker::new(
        &settings.database_path(),
        settings.quota_window_secs as u64,
        settings.quota_ceiling,
    )
    .unwrap();
    let crawler = Crawler::new(
        Arc::new(SyntheticSource::new(listings, totals)),
        RetryPolicy::default(),
        settings.delay_bounds(),
        Box::new(NoopSleeper),
    );
    JobRunner::new(settings, quota, crawler, reference())
}

fn test_settings(dir: &std::path::Path) -> Settings {
    Settings::with_data_dir(dir.to_path_buf())
}

#[tokio::test]
async fn search_job_produces_regional_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_with(
        test_settings(dir.path()),
        vec![
            listing("/anzeige/1", "11111"),
            listing("/anzeige/2", "11111"),
            listing("/anzeige/3", "22222"),
        ],
        vec![("Ahrland".to_string(), 100), ("Beckgau".to_string(), 50)],
    );

    let result = runner
        .run_job(JobRequest::new("  Fahrrad ", 25, 30))
        .await
        .unwrap();

    // Term normalization flows through to the result key.
    assert_eq!(result.key.term, "fahrrad");
    assert_eq!(result.listings.len(), 3);
    assert_eq!(result.national_total(), 150);

    // Enrichment attributed every listing and carried coordinates.
    assert!(result
        .listings
        .iter()
        .all(|l| l.latitude != 0.0 && !l.region.is_empty()));

    // Weights 0.6/0.4 against the 150 national total.
    let ahrland = &result.rows[0];
    let beckgau = &result.rows[1];
    assert_eq!(ahrland.sample_count, 2);
    assert_eq!(beckgau.sample_count, 1);
    assert!((ahrland.expected_total - 90.0).abs() < 1e-9);
    assert!((beckgau.expected_total - 60.0).abs() < 1e-9);

    let chi = result.chi_square.expect("chi-square should be defined");
    assert_eq!(chi.degrees_of_freedom, 1);
    assert!(chi.statistic.is_finite());
    assert!(chi.p_value > 0.0 && chi.p_value < 1.0);

    assert!(result.correlation.is_some());
}

#[tokio::test]
async fn completed_jobs_are_cached_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_with(
        test_settings(dir.path()),
        vec![listing("/anzeige/1", "11111")],
        vec![("Ahrland".to_string(), 10)],
    );

    let request = JobRequest::new("sofa", 25, 30);
    let result = runner.run_job(request.clone()).await.unwrap();

    let cached = runner.cached(&request.key()).await.unwrap();
    assert!(Arc::ptr_eq(&result, &cached));

    // A differently-parameterized job is a distinct cache entry.
    let other = JobRequest::new("sofa", 50, 30);
    assert!(runner.cached(&other.key()).await.is_none());
    runner.run_job(other.clone()).await.unwrap();

    // Cached keys enumerate in completion order, oldest first.
    let keys = runner.cached_keys().await;
    assert_eq!(keys, vec![request.key(), other.key()]);
}

#[tokio::test]
async fn quota_denial_surfaces_before_any_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.quota_ceiling = 40;

    let runner = runner_with(
        settings,
        vec![listing("/anzeige/1", "11111")],
        vec![("Ahrland".to_string(), 10)],
    );

    // First job consumes 25 of the 40-listing window.
    runner.run_job(JobRequest::new("sofa", 25, 30)).await.unwrap();

    let err = runner
        .run_job(JobRequest::new("regal", 25, 30))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "quota_exceeded");
    match err {
        adatlas::error::JobError::QuotaExceeded {
            remaining,
            retry_after_secs,
        } => {
            assert_eq!(remaining, 15);
            assert!(retry_after_secs > 0);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The denied job produced no cache entry.
    assert!(runner
        .cached(&JobRequest::new("regal", 25, 30).key())
        .await
        .is_none());
}

#[tokio::test]
async fn oversized_requests_are_clamped_to_policy_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.max_sample_size = 30;
    settings.max_age_ceiling_days = 60;

    let runner = runner_with(
        settings,
        vec![listing("/anzeige/1", "11111")],
        vec![("Ahrland".to_string(), 10)],
    );

    let result = runner
        .run_job(JobRequest::new("schrank", 500, 9_999))
        .await
        .unwrap();
    assert_eq!(result.key.sample_size, 30);
    assert_eq!(result.key.max_age_days, 60);

    // Quota was charged for the clamped size, not the requested one.
    let record = runner.quota().status().unwrap().unwrap();
    assert_eq!(record.window_count, 30);
}

#[tokio::test]
async fn zero_sample_request_yields_an_empty_sample() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_with(
        test_settings(dir.path()),
        vec![listing("/anzeige/1", "11111"), listing("/anzeige/2", "22222")],
        vec![("Ahrland".to_string(), 100), ("Beckgau".to_string(), 50)],
    );

    let result = runner
        .run_job(JobRequest::new("fahrrad", 0, 30))
        .await
        .unwrap();

    // Collected count never exceeds the requested sample size.
    assert!(result.listings.is_empty());
    assert!(result.rows.iter().all(|r| r.sample_count == 0));
    // Filter totals are independent of the sample and still aggregate.
    assert_eq!(result.national_total(), 150);

    // A zero-listing job charges nothing against the quota.
    let record = runner.quota().status().unwrap().unwrap();
    assert_eq!(record.window_count, 0);
}

#[tokio::test]
async fn empty_result_set_is_a_job_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_with(test_settings(dir.path()), vec![], vec![]);

    let err = runner
        .run_job(JobRequest::new("xyzzy", 25, 30))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "no_results");
}
