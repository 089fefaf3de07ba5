//! Error taxonomy for the scraping and aggregation pipeline.
//!
//! Every expected failure mode maps to one variant so the presentation layer
//! can distinguish "denied" from "blocked" from "empty" from "partial".
//! Degenerate statistics are not errors; they surface as `None` fields on
//! the job result instead.

use thiserror::Error;

use crate::scrapers::FetchError;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, JobError>;

/// Failure modes of a single search job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The shared scraping budget is exhausted for the current window.
    #[error(
        "too many listings requested across all users; {remaining} remain in \
         the current window, retry in {retry_after_secs}s"
    )]
    QuotaExceeded {
        /// Seconds until the next lazy window reset would occur.
        retry_after_secs: i64,
        /// Listings still admissible in the current window.
        remaining: u32,
    },

    /// The source rejected the request outright (block marker in response).
    #[error("the source blocked the request; try again later")]
    SourceBlocked,

    /// The term matched nothing on the very first page.
    #[error("no listings found for \"{term}\"")]
    NoResults { term: String },

    /// A listing's postal code is missing from the reference table. Counts
    /// would be corrupted by dropping it, so the job aborts instead.
    #[error("postal code {postal_code} not found in reference data")]
    Attribution { postal_code: String },

    /// First-page fetch failed after all attempts. Later pages degrade to a
    /// graceful stop and never surface this.
    #[error("page fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Quota persistence failed irrecoverably; the request is denied rather
    /// than over-admitted.
    #[error("quota store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Reference data could not be loaded or is internally inconsistent.
    #[error("reference data: {0}")]
    Reference(String),
}

impl JobError {
    /// Stable machine-readable category for the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::QuotaExceeded { .. } => "quota_exceeded",
            JobError::SourceBlocked => "source_blocked",
            JobError::NoResults { .. } => "no_results",
            JobError::Attribution { .. } => "attribution_failure",
            JobError::Fetch(_) => "fetch_failure",
            JobError::Store(_) => "store_failure",
            JobError::Reference(_) => "reference_data",
        }
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::QuotaExceeded { .. }
                | JobError::SourceBlocked
                | JobError::Fetch(_)
                | JobError::Store(_)
        )
    }
}
