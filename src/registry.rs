//! Registry HTTP client for trial listings and per-trial detail pages.
//!
//! Every request is a single attempt. Rate limiting and upstream errors are
//! surfaced as typed errors; the caller decides whether a failure aborts the
//! query (listing fetch) or skips one trial (detail fetch).

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ApiGeneration, PipelineConfig};
use crate::error::{PiFinderError, Result};
use crate::schema;
use crate::types::TrialRecord;

/// Adapted listing, accumulated across however many pages were needed.
#[derive(Debug, Default)]
pub struct Listing {
    /// Records in listing order, capped at the requested maximum
    pub records: Vec<TrialRecord>,
    /// Malformed records dropped across all pages
    pub skipped: usize,
    /// Total matches the registry reports for the expression
    pub total_found: Option<u64>,
}

/// HTTP client bound to one registry generation.
pub struct RegistryClient {
    http: reqwest::Client,
    config: Arc<PipelineConfig>,
}

impl RegistryClient {
    pub fn new(config: Arc<PipelineConfig>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    /// Fetch up to `max_trials` records for a search expression, following
    /// the pagination scheme of the configured generation.
    pub async fn fetch_listing(&self, expression: &str, max_trials: usize) -> Result<Listing> {
        let listing = match self.config.generation {
            ApiGeneration::Modern => self.fetch_modern_listing(expression, max_trials).await?,
            ApiGeneration::Classic => self.fetch_classic_listing(expression, max_trials).await?,
        };
        info!(
            generation = self.config.generation.as_str(),
            fetched = listing.records.len(),
            skipped = listing.skipped,
            total_found = ?listing.total_found,
            "Listing fetch complete"
        );
        Ok(listing)
    }

    /// Modern generation: token-based pagination.
    async fn fetch_modern_listing(&self, expression: &str, max_trials: usize) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut page_token: Option<String> = None;

        while listing.records.len() < max_trials {
            let remaining = max_trials - listing.records.len();
            let page_size = self.config.page_size.min(remaining);
            let first_page = page_token.is_none();
            let url =
                self.modern_listing_url(expression, page_size, page_token.as_deref(), first_page)?;

            debug!(url = %url, "Fetching modern listing page");
            let body = self.get_text(url.as_str()).await?;
            let page = schema::parse_listing(&body)?;

            listing.skipped += page.skipped;
            if page.total_found.is_some() {
                listing.total_found = page.total_found;
            }
            if page.records.is_empty() {
                break;
            }
            listing.records.extend(page.records);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        listing.records.truncate(max_trials);
        Ok(listing)
    }

    /// Classic generation: rank-window pagination.
    async fn fetch_classic_listing(&self, expression: &str, max_trials: usize) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut start: usize = 1;

        while start <= max_trials {
            let end = (start + self.config.page_size - 1).min(max_trials);
            let url = format!(
                "{}/api/query/full_studies?expr={}&min_rnk={}&max_rnk={}&fmt=json",
                self.config.classic_base,
                urlencoding::encode(expression),
                start,
                end
            );

            debug!(url = %url, "Fetching classic listing page");
            let body = self.get_text(&url).await?;
            let page = schema::parse_listing(&body)?;

            listing.skipped += page.skipped;
            if page.total_found.is_some() {
                listing.total_found = page.total_found;
            }
            // An empty chunk means the rank window ran past the result set
            if page.records.is_empty() && page.skipped == 0 {
                break;
            }
            listing.records.extend(page.records);

            start = end + 1;
            if let Some(total) = listing.total_found {
                if start as u64 > total {
                    break;
                }
            }
        }

        listing.records.truncate(max_trials);
        Ok(listing)
    }

    /// Fetch the rendered detail page for one trial. Single attempt; the
    /// caller treats a failure as a skip, not a retry.
    pub async fn fetch_detail_page(&self, nct_id: &str) -> Result<String> {
        let url = self.detail_url(nct_id);
        debug!(nct_id = nct_id, url = %url, "Fetching detail page");
        self.get_text(&url).await
    }

    /// Public study page for a trial under the configured generation.
    pub fn detail_url(&self, nct_id: &str) -> String {
        match self.config.generation {
            ApiGeneration::Modern => format!("{}/study/{}", self.config.modern_base, nct_id),
            ApiGeneration::Classic => format!("{}/ct2/show/{}", self.config.classic_base, nct_id),
        }
    }

    fn modern_listing_url(
        &self,
        expression: &str,
        page_size: usize,
        page_token: Option<&str>,
        count_total: bool,
    ) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/api/v2/studies", self.config.modern_base))
            .map_err(|e| PiFinderError::Config(format!("invalid modern base URL: {}", e)))?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("query.term", expression);
            params.append_pair("pageSize", &page_size.to_string());
            if count_total {
                params.append_pair("countTotal", "true");
            }
            if let Some(token) = page_token {
                params.append_pair("pageToken", token);
            }
        }

        Ok(url)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return response.text().await.map_err(PiFinderError::Network);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = url, "Registry rate limited the request");
            return Err(PiFinderError::RateLimited(60));
        }

        Err(PiFinderError::Api {
            code: status.as_u16() as i32,
            message: format!("registry error: {}", status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn client(generation: ApiGeneration) -> RegistryClient {
        let config = PipelineConfig {
            generation,
            ..PipelineConfig::default()
        };
        RegistryClient::new(Arc::new(config)).expect("client")
    }

    #[test]
    fn test_modern_listing_url_first_page() {
        let client = client(ApiGeneration::Modern);
        let url = client
            .modern_listing_url("san diego cancer phase 2", 100, None, true)
            .expect("url");
        let url = url.as_str();
        assert!(url.starts_with("https://clinicaltrials.gov/api/v2/studies?"));
        assert!(url.contains("query.term=san+diego+cancer+phase+2"));
        assert!(url.contains("pageSize=100"));
        assert!(url.contains("countTotal=true"));
        assert!(!url.contains("pageToken"));
    }

    #[test]
    fn test_modern_listing_url_continuation_page() {
        let client = client(ApiGeneration::Modern);
        let url = client
            .modern_listing_url("cancer", 50, Some("tok42"), false)
            .expect("url");
        let url = url.as_str();
        assert!(url.contains("pageToken=tok42"));
        assert!(url.contains("pageSize=50"));
        assert!(!url.contains("countTotal"));
    }

    #[test]
    fn test_detail_url_per_generation() {
        assert_eq!(
            client(ApiGeneration::Modern).detail_url("NCT01234567"),
            "https://clinicaltrials.gov/study/NCT01234567"
        );
        assert_eq!(
            client(ApiGeneration::Classic).detail_url("NCT01234567"),
            "https://classic.clinicaltrials.gov/ct2/show/NCT01234567"
        );
    }

    #[test]
    fn test_classic_expression_is_percent_encoded() {
        let encoded = urlencoding::encode("san diego cancer");
        assert_eq!(encoded, "san%20diego%20cancer");
    }
}
