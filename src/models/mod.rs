//! Data models for adatlas.

mod job;
mod listing;
mod region;

pub use job::{ChiSquare, CorrelationMatrix, JobKey, JobRequest, JobResult, RegionStats};
pub use listing::{Listing, RawListing};
pub use region::Region;
