//! Paginated crawl state machine.
//!
//! Walks search-result pages until one of three independent terminal
//! conditions fires: the sample is full, a listing falls past the age
//! cutoff, or the source runs out of pages. All three are checked on every
//! page. The age cutoff relies on the fetcher's descending-recency ordering
//! contract, so the interior loop short-circuits on the first over-age
//! listing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::error::{JobError, Result};
use crate::models::RawListing;
use crate::scrapers::{DelayBounds, FetchError, FetchedPage, PageFetcher, RetryPolicy, Sleeper};

/// Listings per result page on the source.
pub const PAGE_SIZE: usize = 25;

const SECONDS_PER_DAY: i64 = 86_400;
const TODAY_MARKER: &str = "Heute";
const YESTERDAY_MARKER: &str = "Gestern";
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Raw output of one crawl: deduplicated listings in collection order plus
/// the source's per-region totals for the term.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub listings: Vec<RawListing>,
    pub region_totals: Vec<(String, u64)>,
}

/// Drives pagination against a [`PageFetcher`] under retry and pacing
/// policy. Stateless between crawls; safe to share across concurrent jobs.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    retry: RetryPolicy,
    delay: DelayBounds,
    sleeper: Box<dyn Sleeper>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        retry: RetryPolicy,
        delay: DelayBounds,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            fetcher,
            retry,
            delay,
            sleeper,
        }
    }

    /// Collect up to `sample_size` listings newer than `max_age_days`,
    /// plus the per-region totals from the first page's filter data.
    pub async fn crawl(
        &self,
        term: &str,
        sample_size: u32,
        max_age_days: u32,
    ) -> Result<CrawlOutcome> {
        let midnight = today_midnight();
        let max_age_secs = i64::from(max_age_days) * SECONDS_PER_DAY;

        let mut listings: Vec<RawListing> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut region_totals = Vec::new();
        let mut done = false;
        let mut last_page = false;

        // Pages hold ~PAGE_SIZE listings, so this bound always covers the
        // requested sample with slack for duplicates.
        let page_bound = (sample_size as usize).div_ceil(PAGE_SIZE) + 2;

        for page_index in 0..page_bound {
            let page = match self.fetch_with_retry(term, page_index).await {
                Ok(page) => page,
                // A first-page failure fails the job; later pages degrade to
                // a graceful stop with partial results kept.
                Err(err) if page_index == 0 => return Err(JobError::Fetch(err)),
                Err(err) => {
                    tracing::debug!(
                        "page {} failed after {} attempts, stopping crawl: {}",
                        page_index,
                        self.retry.max_attempts,
                        err
                    );
                    last_page = true;
                    FetchedPage::default()
                }
            };

            if page_index == 0 {
                if page.blocked {
                    return Err(JobError::SourceBlocked);
                }
                if page.listings.is_empty() {
                    return Err(JobError::NoResults {
                        term: term.to_string(),
                    });
                }
                region_totals = page.region_totals.unwrap_or_default();
            }

            if page.listings.is_empty() {
                // Normal terminal condition: the source ran out of pages.
                last_page = true;
            }

            for raw in &page.listings {
                // Checked before recording so the collected count never
                // exceeds the requested sample, including a zero sample.
                if listings.len() >= sample_size as usize {
                    done = true;
                    break;
                }
                let posted_ts = parse_posted(&raw.posted, midnight);
                if midnight - posted_ts > max_age_secs {
                    // Results are sorted by recency; everything after this
                    // listing is older still.
                    done = true;
                    break;
                }
                if seen.insert(raw.href.clone()) {
                    listings.push(raw.clone());
                }
                if listings.len() >= sample_size as usize {
                    done = true;
                    break;
                }
            }

            if done || last_page {
                break;
            }
            self.sleeper.sleep(self.delay.sample()).await;
        }

        tracing::info!(
            "crawl for \"{}\" collected {} listings ({} region totals)",
            term,
            listings.len(),
            region_totals.len()
        );
        Ok(CrawlOutcome {
            listings,
            region_totals,
        })
    }

    /// Fetch one page with bounded attempts. An empty page after all
    /// attempts is returned as-is (the caller decides whether that means
    /// "no results" or "last page reached"); a transport error on every
    /// attempt propagates.
    async fn fetch_with_retry(
        &self,
        term: &str,
        page_index: usize,
    ) -> std::result::Result<FetchedPage, FetchError> {
        let mut empty: Option<FetchedPage> = None;
        let mut last_err: Option<FetchError> = None;

        for attempt in 0..self.retry.max_attempts {
            match self.fetcher.fetch_page(term, page_index).await {
                Ok(page) if !page.listings.is_empty() || page.blocked => return Ok(page),
                Ok(page) => {
                    empty = Some(page);
                }
                Err(err) => {
                    tracing::debug!(
                        "fetch attempt {}/{} for page {} failed: {}",
                        attempt + 1,
                        self.retry.max_attempts,
                        page_index,
                        err
                    );
                    last_err = Some(err);
                }
            }
        }

        match (empty, last_err) {
            (Some(page), _) => Ok(page),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(FetchedPage::default()),
        }
    }
}

/// Epoch seconds of today's local midnight.
fn today_midnight() -> i64 {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

/// Resolve a freshness marker to an absolute timestamp. An empty or
/// today-marked listing anchors to today's midnight, a yesterday-marked one
/// to the midnight before; anything else is an explicit date. Unparseable
/// markers count as fresh so a single odd page element cannot truncate a
/// crawl.
fn parse_posted(posted: &str, today_midnight: i64) -> i64 {
    let trimmed = posted.trim();
    if trimmed.is_empty() || trimmed.contains(TODAY_MARKER) {
        return today_midnight;
    }
    if trimmed.contains(YESTERDAY_MARKER) {
        return today_midnight - SECONDS_PER_DAY;
    }

    let date_part = trimmed.split(',').next().unwrap_or(trimmed).trim();
    match NaiveDate::parse_from_str(date_part, DATE_FORMAT) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_local_timezone(Local).earliest())
            .map(|dt| dt.timestamp())
            .unwrap_or(today_midnight),
        Err(_) => {
            tracing::warn!("unparseable freshness marker \"{}\", keeping listing", trimmed);
            today_midnight
        }
    }
}
