//! Job orchestration: quota admission, crawl, aggregation, result caching.

mod job;
mod results;

pub use job::JobRunner;
pub use results::{ResultCache, DEFAULT_CACHE_CAPACITY};
