//! The job runner ties the quota gate, crawler, aggregator, and result
//! cache together into the single search operation.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::analysis::RegionalAggregator;
use crate::config::Settings;
use crate::error::{JobError, Result};
use crate::models::{JobKey, JobRequest, JobResult};
use crate::quota::{Admission, QuotaTracker};
use crate::reference::ReferenceData;
use crate::scrapers::Crawler;
use crate::services::ResultCache;

/// Owns all long-lived job state. The cache mutex is the only shared
/// mutable piece; the quota tracker serializes itself through its store.
pub struct JobRunner {
    settings: Settings,
    quota: QuotaTracker,
    crawler: Crawler,
    reference: ReferenceData,
    results: Mutex<ResultCache>,
}

impl JobRunner {
    pub fn new(
        settings: Settings,
        quota: QuotaTracker,
        crawler: Crawler,
        reference: ReferenceData,
    ) -> Self {
        Self {
            settings,
            quota,
            crawler,
            reference,
            results: Mutex::new(ResultCache::default()),
        }
    }

    /// Run one search job end to end.
    ///
    /// Admission is charged for the requested sample size before any source
    /// traffic; a failed crawl does not refund it. Nothing is cached unless
    /// the whole pipeline succeeds.
    pub async fn run_job(&self, request: JobRequest) -> Result<Arc<JobResult>> {
        let request = request.clamped(&self.settings);
        let key = request.key();

        match self.quota.try_admit(request.sample_size)? {
            Admission::Admitted => {}
            Admission::Denied {
                retry_after_secs,
                remaining,
            } => {
                return Err(JobError::QuotaExceeded {
                    retry_after_secs,
                    remaining,
                });
            }
        }

        tracing::info!(
            "job {} admitted, crawling up to {} listings",
            key,
            request.sample_size
        );

        let outcome = self
            .crawler
            .crawl(&request.term, request.sample_size, request.max_age_days)
            .await?;

        let result = RegionalAggregator::new(&self.reference).aggregate(key.clone(), outcome)?;
        let result = Arc::new(result);

        self.results.lock().await.insert(Arc::clone(&result));
        tracing::info!(
            "job {} complete: {} listings, national total {}",
            key,
            result.listings.len(),
            result.national_total()
        );
        Ok(result)
    }

    /// Look up a previously completed job by key.
    pub async fn cached(&self, key: &JobKey) -> Option<Arc<JobResult>> {
        self.results.lock().await.get(key)
    }

    /// Keys of all cached results, oldest first.
    pub async fn cached_keys(&self) -> Vec<JobKey> {
        self.results.lock().await.keys()
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
