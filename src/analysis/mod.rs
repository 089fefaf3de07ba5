//! Statistical aggregation of crawled listings against reference data.

mod aggregate;
mod stats;

pub use aggregate::RegionalAggregator;
pub use stats::{average_ranks, chi_square_gof, pearson, spearman};
