//! AdAtlas - regional statistics over classified-listing markets.
//!
//! Crawls a classifieds source for a search term under a persistent rate
//! quota, attributes each listing to a region via its postal code, and
//! derives per-region counts, rates, correlations, and a chi-square test
//! against the population-share expectation.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod quota;
pub mod reference;
pub mod scrapers;
pub mod services;
