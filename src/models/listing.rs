//! Listing records, raw and enriched.

use serde::Serialize;

/// A listing as extracted from one search-result page, before any
/// reference-data enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    /// URL path of the listing; unique key within a crawl.
    pub href: String,
    /// Raw price text.
    pub price: String,
    /// Raw location text; the first whitespace-separated token is the
    /// postal code.
    pub location: String,
    /// Raw freshness marker: empty, a today/yesterday marker with a clock
    /// time, or an explicit `dd.mm.yyyy` date.
    pub posted: String,
}

/// A crawled listing enriched with its regional attribution. Exists only for
/// the duration of one job result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    /// URL path of the listing.
    pub href: String,
    /// Raw price text.
    pub price: String,
    /// Raw location text.
    pub location: String,
    /// Raw freshness marker.
    pub posted: String,
    /// Postal code extracted from the location text.
    pub postal_code: String,
    /// Region resolved from the postal code.
    pub region: String,
    /// Latitude of the postal code's centroid.
    pub latitude: f64,
    /// Longitude of the postal code's centroid.
    pub longitude: f64,
}
