//! Scraping layer: page fetching and the paginated crawl state machine.

mod crawler;
mod fetcher;
mod retry;

pub use crawler::{CrawlOutcome, Crawler, PAGE_SIZE};
pub use fetcher::{FetchError, FetchedPage, HttpPageFetcher, PageFetcher, RegionTotals};
pub use retry::{DelayBounds, NoopSleeper, RetryPolicy, Sleeper, TokioSleeper};
