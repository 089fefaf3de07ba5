//! Page fetching: the capability the crawl state machine consumes.
//!
//! The HTTP implementation wraps reqwest plus CSS-selector extraction; tests
//! substitute synthetic fetchers through the [`PageFetcher`] trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use crate::models::RawListing;

/// Per-region totals reported by the source's own region filter. These cover
/// the entire corpus for the term, independent of sample size and age limit.
pub type RegionTotals = Vec<(String, u64)>;

/// One fetched search-result page.
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// Listing records in source order (source orders by descending recency).
    pub listings: Vec<RawListing>,
    /// The source rejected the request (block status on the response).
    pub blocked: bool,
    /// Filter totals; populated on the first page only.
    pub region_totals: Option<RegionTotals>,
}

/// Transport-level fetch failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Failure raised by a non-HTTP fetcher implementation.
    #[error("fetch failed: {0}")]
    Other(String),
}

/// Fetches one search-result page for a term.
///
/// Contract precondition: listings must be ordered by descending recency
/// within and across pages. The crawler's age cutoff short-circuits on the
/// first over-age listing and would silently truncate results if the source
/// violated this ordering.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, term: &str, page_index: usize)
        -> Result<FetchedPage, FetchError>;
}

/// HTTP status the source answers with when it blocks a scraper.
const BLOCKED_STATUS: u16 = 418;

const LISTING_SELECTOR: &str = "article.aditem";
const PRICE_SELECTOR: &str = "p.aditem-main--middle--price-shipping--price";
const LOCATION_SELECTOR: &str = "div.aditem-main--top--left";
const POSTED_SELECTOR: &str = "div.aditem-main--top > div.aditem-main--top--right";
const SECTION_SELECTOR: &str = "section";
const SECTION_HEADLINE_SELECTOR: &str = "h2.sectionheadline";
const FILTER_ENTRY_SELECTOR: &str = "li";

/// Headline of the filter section carrying the per-region totals.
const REGION_FILTER_HEADLINE: &str = "Ort";

struct Selectors {
    listing: Selector,
    price: Selector,
    location: Selector,
    posted: Selector,
    section: Selector,
    headline: Selector,
    filter_entry: Selector,
}

impl Selectors {
    fn new() -> Self {
        // Static selectors; a parse failure is a programming error.
        let parse = |s: &str| Selector::parse(s).expect("invalid listing selector");
        Self {
            listing: parse(LISTING_SELECTOR),
            price: parse(PRICE_SELECTOR),
            location: parse(LOCATION_SELECTOR),
            posted: parse(POSTED_SELECTOR),
            section: parse(SECTION_SELECTOR),
            headline: parse(SECTION_HEADLINE_SELECTOR),
            filter_entry: parse(FILTER_ENTRY_SELECTOR),
        }
    }
}

/// reqwest-backed page fetcher for the live marketplace.
pub struct HttpPageFetcher {
    client: Client,
    base_url: String,
    selectors: Selectors,
}

impl HttpPageFetcher {
    /// Create a fetcher for `base_url` (scheme + host, no trailing slash).
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            selectors: Selectors::new(),
        }
    }

    fn page_url(&self, term: &str, page_index: usize) -> String {
        let slug = term.replace(' ', "-");
        if page_index == 0 {
            format!("{}/s-{}/k0", self.base_url, slug)
        } else {
            // The source numbers result pages from 1 in its URLs.
            format!("{}/s-seite:{}/{}/k0", self.base_url, page_index + 1, slug)
        }
    }

    fn parse_page(&self, html: &str, first_page: bool) -> FetchedPage {
        let document = Html::parse_document(html);

        let listings = document
            .select(&self.selectors.listing)
            .filter_map(|article| self.extract_listing(article))
            .collect();

        let region_totals = first_page.then(|| self.extract_region_totals(&document));

        FetchedPage {
            listings,
            blocked: false,
            region_totals,
        }
    }

    fn extract_listing(&self, article: ElementRef<'_>) -> Option<RawListing> {
        let href = article.value().attr("data-href")?.to_string();
        let price = first_text(article, &self.selectors.price);
        let location = first_text(article, &self.selectors.location);
        let posted = first_text(article, &self.selectors.posted);
        Some(RawListing {
            href,
            price,
            location,
            posted,
        })
    }

    /// Pull the per-region counts out of the source's own region filter.
    fn extract_region_totals(&self, document: &Html) -> RegionTotals {
        let mut totals = Vec::new();

        for section in document.select(&self.selectors.section) {
            let is_region_filter = section
                .select(&self.selectors.headline)
                .any(|h| collapse_text(h) == REGION_FILTER_HEADLINE);
            if !is_region_filter {
                continue;
            }

            for entry in section.select(&self.selectors.filter_entry) {
                // Entries look like "Bayern (1.234)"; the thousands dot and
                // the parentheses go, leaving "<name> <count>".
                let text: String = collapse_text(entry)
                    .chars()
                    .filter(|c| !matches!(c, '.' | '(' | ')'))
                    .collect();
                if let Some((name, count)) = split_filter_entry(&text) {
                    totals.push((name, count));
                }
            }
            break;
        }

        totals
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(
        &self,
        term: &str,
        page_index: usize,
    ) -> Result<FetchedPage, FetchError> {
        let url = self.page_url(term, page_index);
        tracing::debug!("fetching page {} for \"{}\": {}", page_index, term, url);

        let response = self.client.get(&url).send().await?;
        if response.status().as_u16() == BLOCKED_STATUS {
            return Ok(FetchedPage {
                blocked: true,
                ..FetchedPage::default()
            });
        }

        let body = response.text().await?;
        Ok(self.parse_page(&body, page_index == 0))
    }
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .next()
        .map(collapse_text)
        .unwrap_or_default()
}

/// Element text with surrounding and internal line noise trimmed away.
fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split "<name> <count>" where the name itself never contains spaces but
/// may be hyphenated. The count is the last token.
fn split_filter_entry(text: &str) -> Option<(String, u64)> {
    let mut tokens = text.split_whitespace().collect::<Vec<_>>();
    let count = tokens.pop()?.parse::<u64>().ok()?;
    if tokens.is_empty() {
        return None;
    }
    Some((tokens.join(" "), count))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <section>
          <h2 class="sectionheadline">Ort</h2>
          <ul>
            <li>Bayern (1.234)</li>
            <li>Berlin (56)</li>
            <li>Nordrhein-Westfalen (7)</li>
          </ul>
        </section>
        <article class="aditem" data-href="/s-anzeige/stadtrad/111">
          <div class="aditem-main--top">
            <div class="aditem-main--top--left"> 80331 München </div>
            <div class="aditem-main--top--right"> Heute, 11:02 </div>
          </div>
          <p class="aditem-main--middle--price-shipping--price"> 120 € VB </p>
        </article>
        <article class="aditem" data-href="/s-anzeige/rennrad/222">
          <div class="aditem-main--top">
            <div class="aditem-main--top--left"> 10115 Berlin </div>
            <div class="aditem-main--top--right"> 03.01.2024 </div>
          </div>
          <p class="aditem-main--middle--price-shipping--price"> 300 € </p>
        </article>
        </body></html>
    "#;

    fn fetcher() -> HttpPageFetcher {
        HttpPageFetcher::new(
            "https://example.invalid",
            "adatlas-test",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn extracts_listings_in_source_order() {
        let page = fetcher().parse_page(PAGE, true);
        assert_eq!(page.listings.len(), 2);
        assert_eq!(page.listings[0].href, "/s-anzeige/stadtrad/111");
        assert_eq!(page.listings[0].price, "120 € VB");
        assert_eq!(page.listings[0].location, "80331 München");
        assert_eq!(page.listings[0].posted, "Heute, 11:02");
        assert_eq!(page.listings[1].posted, "03.01.2024");
    }

    #[test]
    fn extracts_region_totals_on_first_page_only() {
        let first = fetcher().parse_page(PAGE, true);
        let totals = first.region_totals.unwrap();
        assert_eq!(
            totals,
            vec![
                ("Bayern".to_string(), 1_234),
                ("Berlin".to_string(), 56),
                ("Nordrhein-Westfalen".to_string(), 7),
            ]
        );

        let later = fetcher().parse_page(PAGE, false);
        assert!(later.region_totals.is_none());
    }

    #[test]
    fn page_urls_follow_the_source_scheme() {
        let f = fetcher();
        assert_eq!(
            f.page_url("city bike", 0),
            "https://example.invalid/s-city-bike/k0"
        );
        assert_eq!(
            f.page_url("city bike", 1),
            "https://example.invalid/s-seite:2/city-bike/k0"
        );
    }

    #[test]
    fn filter_entry_split_takes_last_token_as_count() {
        assert_eq!(
            split_filter_entry("Nordrhein-Westfalen 7"),
            Some(("Nordrhein-Westfalen".to_string(), 7))
        );
        assert_eq!(split_filter_entry("123"), None);
        assert_eq!(split_filter_entry("Bayern abc"), None);
    }
}
