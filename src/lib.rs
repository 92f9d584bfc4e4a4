//! # pifinder
//!
//! Clinical-trial principal investigator finder - multi-source extraction
//! pipeline
//!
//! ## Modules
//!
//! - [`registry`] - ClinicalTrials.gov listing and detail-page client
//! - [`schema`] - Adapter for both registry listing generations
//! - [`location`] - Site matching against the requested city/state
//! - [`roles`] - Investigator role vocabulary
//! - [`extract`] - Structured official extraction
//! - [`fallback`] - Heuristic detail-page text extraction
//! - [`dedup`] - Stable row deduplication
//! - [`pipeline`] - Query orchestration
//! - [`export`] - CSV output
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pifinder::config::PipelineConfig;
//! use pifinder::pipeline::Pipeline;
//! use pifinder::types::Query;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::default())?;
//!     let query = Query::for_city("San Diego").with_state("CA");
//!     let outcome = pipeline.search(&query).await?;
//!     println!("Found {} investigators", outcome.rows.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod extract;
pub mod fallback;
pub mod location;
pub mod pipeline;
pub mod registry;
pub mod roles;
pub mod schema;
pub mod types;

pub use error::{PiFinderError, Result};
pub use pipeline::{Pipeline, SearchOutcome, SearchSummary};
pub use types::{ExtractionSource, InvestigatorRow, Query};
