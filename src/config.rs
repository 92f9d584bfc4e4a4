//! Pipeline configuration.
//!
//! Role vocabulary, pacing interval, user agent, worker bound, and registry
//! endpoints are explicit values rather than module globals, passed into
//! [`crate::pipeline::Pipeline::new`] at construction.

use std::time::Duration;

/// Default user agent sent with every registry request
pub const DEFAULT_USER_AGENT: &str =
    "PI-Finder/1.0 (+contact: research use; email: you@example.com)";

/// Default base URL of the modern registry API
pub const DEFAULT_MODERN_BASE: &str = "https://clinicaltrials.gov";

/// Default base URL of the classic registry API
pub const DEFAULT_CLASSIC_BASE: &str = "https://classic.clinicaltrials.gov";

/// Default role vocabulary: the closed set of investigator-type roles.
///
/// Extending this list is a configuration change, not a design change.
pub const DEFAULT_ROLE_VOCABULARY: &[&str] = &[
    "principal investigator",
    "site principal investigator",
    "study chair",
    "study director",
    "sub-investigator",
];

/// Registry API generation to query.
///
/// Both generations flow through the same schema adapter; this only selects
/// which listing endpoint (and matching detail-page URL style) is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    /// Flat camelCase listing (`/api/v2/studies`)
    Modern,
    /// Nested Module-style listing (`/api/query/full_studies`)
    Classic,
}

impl ApiGeneration {
    /// Parse a CLI/query-string name ("modern" / "classic")
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "modern" | "v2" => Some(Self::Modern),
            "classic" | "v1" => Some(Self::Classic),
            _ => None,
        }
    }

    /// Name used in logs and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::Classic => "classic",
        }
    }
}

/// Configuration for one [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// User agent for listing and detail requests (default: [`DEFAULT_USER_AGENT`])
    pub user_agent: String,
    /// Modern API base URL (default: [`DEFAULT_MODERN_BASE`])
    pub modern_base: String,
    /// Classic API base URL (default: [`DEFAULT_CLASSIC_BASE`])
    pub classic_base: String,
    /// Which listing generation to query (default: modern)
    pub generation: ApiGeneration,
    /// Listing page size; the registry caps this server-side (default: 100)
    pub page_size: usize,
    /// Courtesy interval between detail-page fetch starts, enforced across
    /// the fallback worker pool (default: 600ms). Fixed, not adaptive.
    pub detail_pacing: Duration,
    /// Concurrent detail-page fetches (default: 3)
    pub fallback_workers: usize,
    /// Per-request timeout (default: 30s)
    pub request_timeout: Duration,
    /// Investigator-type role phrases (default: [`DEFAULT_ROLE_VOCABULARY`])
    pub role_vocabulary: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            modern_base: DEFAULT_MODERN_BASE.to_string(),
            classic_base: DEFAULT_CLASSIC_BASE.to_string(),
            generation: ApiGeneration::Modern,
            page_size: 100,
            detail_pacing: Duration::from_millis(600),
            fallback_workers: 3,
            request_timeout: Duration::from_secs(30),
            role_vocabulary: DEFAULT_ROLE_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_parse() {
        assert_eq!(ApiGeneration::parse("modern"), Some(ApiGeneration::Modern));
        assert_eq!(ApiGeneration::parse("V1"), Some(ApiGeneration::Classic));
        assert_eq!(ApiGeneration::parse("rest"), None);
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.generation, ApiGeneration::Modern);
        assert_eq!(config.page_size, 100);
        assert!(config.role_vocabulary.iter().any(|r| r == "study chair"));
    }
}
