//! pifinder - Clinical Trial Principal Investigator Finder
//!
//! Searches a clinical-trial registry for trials near a city, extracts the
//! investigators running them, and exports the deduplicated result as CSV.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! pifinder search "San Diego" --state CA --condition cancer --phase "phase 2"
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! pifinder serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Query as UrlQuery, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use pifinder::config::{ApiGeneration, PipelineConfig};
use pifinder::pipeline::{Pipeline, SearchOutcome, SearchSummary};
use pifinder::types::{Query, DEFAULT_MAX_TRIALS};
use pifinder::{export, PiFinderError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Clinical Trial Principal Investigator Finder
#[derive(Parser)]
#[command(name = "pifinder")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a city for trial investigators and save them as CSV
    Search {
        /// Target city
        city: String,

        /// Target state/region (substring match against site states)
        #[arg(long)]
        state: Option<String>,

        /// Condition keywords added to the registry search
        #[arg(long)]
        condition: Option<String>,

        /// Trial phase filter
        #[arg(long, default_value = "any", value_parser = ["any", "phase 1", "phase 2", "phase 3", "phase 4"])]
        phase: String,

        /// Maximum number of trials to examine
        #[arg(long, default_value = "200")]
        max: usize,

        /// Registry API generation: modern or classic
        #[arg(long, default_value = "modern", value_parser = ["modern", "classic"])]
        source: String,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Stop after this many seconds and keep whatever was found
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Registry API generation: modern or classic
        #[arg(long, default_value = "modern", value_parser = ["modern", "classic"])]
        source: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Search {
            city,
            state,
            condition,
            phase,
            max,
            source,
            output,
            deadline_secs,
        } => {
            run_search(
                city,
                state,
                condition,
                phase,
                max,
                source,
                output,
                deadline_secs,
            )
            .await
        }
        Commands::Serve { port, host, source } => run_server(host, port, source).await,
    }
}

// ============================================================================
// Search Command
// ============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_search(
    city: String,
    state: Option<String>,
    condition: Option<String>,
    phase: String,
    max: usize,
    source: String,
    output_dir: PathBuf,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let generation = ApiGeneration::parse(&source)
        .with_context(|| format!("Unknown source '{}'", source))?;

    let config = PipelineConfig {
        generation,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

    let mut query = Query::for_city(city).with_phase(phase).with_max_trials(max);
    query.state = state.filter(|s| !s.trim().is_empty());
    query.condition = condition.filter(|c| !c.trim().is_empty());

    println!(
        "Searching {} trials for investigators in {}...",
        generation.as_str(),
        query.city
    );

    let outcome = search_with_deadline(&pipeline, &query, deadline_secs).await?;
    print_summary(&outcome.summary);

    if outcome.rows.is_empty() {
        println!("No investigators found.");
        return Ok(());
    }

    // Create output folder
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let safe_city: String = query
        .city
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    let output_folder = output_dir.join(format!("{}_{}", timestamp, safe_city));
    std::fs::create_dir_all(&output_folder).context("Failed to create output directory")?;

    let csv_path = output_folder.join(export::export_filename(&query));
    let file = std::fs::File::create(&csv_path).context("Failed to create CSV file")?;
    export::write_rows(file, &outcome.rows).context("Failed to write CSV")?;

    println!("Saved: {}", csv_path.display());
    Ok(())
}

/// Run a search, cancelling it when the optional deadline expires.
async fn search_with_deadline(
    pipeline: &Pipeline,
    query: &Query,
    deadline_secs: Option<u64>,
) -> Result<SearchOutcome> {
    let Some(secs) = deadline_secs else {
        return Ok(pipeline.search(query).await?);
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let deadline = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        let _ = cancel_tx.send(true);
    });

    let outcome = pipeline.search_with_cancel(query, cancel_rx).await;
    deadline.abort();
    Ok(outcome?)
}

fn print_summary(summary: &SearchSummary) {
    println!("\n=== Search Summary ===");
    println!("Trials fetched:  {}", summary.trials_fetched);
    println!("Trials matched:  {}", summary.trials_matched);
    println!("Rows produced:   {}", summary.rows_produced);
    if let Some(total) = summary.total_found {
        println!("Registry total:  {}", total);
    }
    if summary.records_skipped > 0 {
        println!("Records skipped: {}", summary.records_skipped);
    }
    if summary.detail_failures > 0 {
        println!("Detail failures: {}", summary.detail_failures);
    }
    if summary.aborted {
        println!("Deadline hit; partial results kept.");
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, source: String) -> Result<()> {
    let generation = ApiGeneration::parse(&source)
        .with_context(|| format!("Unknown source '{}'", source))?;
    let config = PipelineConfig {
        generation,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config).context("Failed to initialize pipeline")?;

    info!(host = %host, port = port, generation = generation.as_str(), "Starting HTTP server");
    println!("Starting server at http://{}:{}", host, port);

    let app_state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/export", get(export_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    /// One pipeline shared by all requests, so detail-fetch pacing holds
    /// across concurrent queries
    pipeline: Pipeline,
}

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>PI Finder</title></head>
<body>
  <h1>Clinical Trial PI Finder</h1>
  <form action="/export" method="get">
    <label>City: <input name="city" required></label><br>
    <label>State: <input name="state"></label><br>
    <label>Condition: <input name="condition"></label><br>
    <label>Phase:
      <select name="phase">
        <option value="any">any</option>
        <option value="phase 1">phase 1</option>
        <option value="phase 2">phase 2</option>
        <option value="phase 3">phase 3</option>
        <option value="phase 4">phase 4</option>
      </select>
    </label><br>
    <label>Max trials: <input name="max" type="number" value="200"></label><br>
    <button type="submit">Download CSV</button>
  </form>
  <p>JSON API: <code>/search?city=San+Diego&amp;state=CA</code></p>
</body>
</html>"#;

/// Landing page with the search form
async fn home_handler() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Search request parameters
#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    city: String,
    state: Option<String>,
    condition: Option<String>,
    phase: Option<String>,
    #[serde(default = "default_max_trials")]
    max: usize,
}

fn default_max_trials() -> usize {
    DEFAULT_MAX_TRIALS
}

impl SearchParams {
    /// Empty form fields arrive as empty strings; treat them as absent.
    fn into_query(self) -> Query {
        let mut query = Query::for_city(self.city).with_max_trials(self.max);
        query.state = self.state.filter(|s| !s.trim().is_empty());
        query.condition = self.condition.filter(|c| !c.trim().is_empty());
        query.phase = self.phase.filter(|p| !p.trim().is_empty());
        query
    }
}

/// Search response
#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    summary: Option<SearchSummary>,
    rows: Vec<pifinder::InvestigatorRow>,
}

/// JSON search endpoint handler
async fn search_handler(
    State(state): State<Arc<AppState>>,
    UrlQuery(params): UrlQuery<SearchParams>,
) -> Json<SearchResponse> {
    let query = params.into_query();
    info!(city = %query.city, state = ?query.state, "Search request");

    match state.pipeline.search(&query).await {
        Ok(outcome) => Json(SearchResponse {
            status: "success".to_string(),
            count: outcome.rows.len(),
            summary: Some(outcome.summary),
            rows: outcome.rows,
        }),
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                summary: None,
                rows: vec![],
            })
        }
    }
}

/// CSV download endpoint; the body is streamed row by row.
async fn export_handler(
    State(state): State<Arc<AppState>>,
    UrlQuery(params): UrlQuery<SearchParams>,
) -> Response {
    let query = params.into_query();
    info!(city = %query.city, state = ?query.state, "Export request");

    match state.pipeline.search(&query).await {
        Ok(outcome) => {
            let filename = export::export_filename(&query);
            let body = Body::from_stream(futures::stream::iter(export::csv_chunks(outcome.rows)));
            (
                [
                    (
                        header::CONTENT_TYPE,
                        "text/csv; charset=utf-8".to_string(),
                    ),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Export failed");
            (error_status(&e), format!("export failed: {}", e)).into_response()
        }
    }
}

fn error_status(error: &PiFinderError) -> StatusCode {
    match error {
        PiFinderError::Validation(_) => StatusCode::BAD_REQUEST,
        PiFinderError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    }
}
