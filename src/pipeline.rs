//! Query orchestration: fetch, match, extract, dedup.
//!
//! One [`Pipeline`] serves any number of queries; each query execution walks
//! the fixed stage sequence Fetching, Matching, Extracting, Deduplicating,
//! Done, or drops to Failed when the listing fetch itself fails. Per-trial
//! problems never fail a query; they are counted in the summary.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::dedup::dedup_rows;
use crate::error::Result;
use crate::extract::structured_officials;
use crate::fallback;
use crate::location::match_site;
use crate::registry::{Listing, RegistryClient};
use crate::roles::RoleLexicon;
use crate::types::{ExtractionSource, InvestigatorRow, Official, Query, Site, TrialRecord};

/// Stages of one query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Fetching,
    Matching,
    Extracting,
    Deduplicating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Fetching => "fetching",
            PipelineState::Matching => "matching",
            PipelineState::Extracting => "extracting",
            PipelineState::Deduplicating => "deduplicating",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

/// Diagnostic counters for one query execution.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SearchSummary {
    /// Trials examined (capped at the query's max_trials)
    pub trials_fetched: usize,
    /// Trials with at least one site matching the location
    pub trials_matched: usize,
    /// Rows returned after dedup
    pub rows_produced: usize,
    /// Malformed listing records dropped by the adapter
    pub records_skipped: usize,
    /// Detail-page fetches that failed and were skipped
    pub detail_failures: usize,
    /// Total matches the registry reports, when it says
    pub total_found: Option<u64>,
    /// Whether cancellation cut the execution short
    pub aborted: bool,
}

/// Rows plus the counters describing how they were produced.
#[derive(Debug)]
pub struct SearchOutcome {
    pub rows: Vec<InvestigatorRow>,
    pub summary: SearchSummary,
}

/// A matched trial whose structured pass came up empty; its detail page
/// still needs fetching.
struct FallbackJob {
    index: usize,
    trial: TrialRecord,
    site: Site,
}

/// Investigator search pipeline over one registry generation.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: RegistryClient,
    roles: RoleLexicon,
    /// Start time of the most recent detail fetch; held across the pacing
    /// sleep so the courtesy interval holds in aggregate across workers
    last_detail_fetch: Mutex<Option<Instant>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let config = Arc::new(config);
        let registry = RegistryClient::new(Arc::clone(&config))?;
        let roles = RoleLexicon::new(&config.role_vocabulary)?;
        Ok(Self {
            config,
            registry,
            roles,
            last_detail_fetch: Mutex::new(None),
        })
    }

    /// Run a query to completion.
    pub async fn search(&self, query: &Query) -> Result<SearchOutcome> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.search_with_cancel(query, cancel_rx).await
    }

    /// Run a query under a cancellation signal. When the signal fires,
    /// remaining detail fetches are abandoned and the rows accumulated so
    /// far are returned with `aborted` set.
    pub async fn search_with_cancel(
        &self,
        query: &Query,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<SearchOutcome> {
        query.validate()?;
        let expression = query.expression();

        enter(PipelineState::Fetching, query);
        let listing = tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancel) => {
                info!("Query cancelled before the listing arrived");
                return Ok(SearchOutcome {
                    rows: Vec::new(),
                    summary: SearchSummary {
                        aborted: true,
                        ..SearchSummary::default()
                    },
                });
            }
            fetched = self.registry.fetch_listing(&expression, query.max_trials) => {
                match fetched {
                    Ok(listing) => listing,
                    Err(e) => {
                        error!(state = PipelineState::Failed.as_str(), error = %e, "Listing fetch failed");
                        return Err(e);
                    }
                }
            }
        };

        Ok(self.process_listing(listing, query, cancel).await)
    }

    /// Everything past a successful listing fetch: match, extract, dedup.
    /// Infallible; per-trial problems end up in the summary counters.
    async fn process_listing(
        &self,
        listing: Listing,
        query: &Query,
        mut cancel: watch::Receiver<bool>,
    ) -> SearchOutcome {
        enter(PipelineState::Matching, query);
        let (structured, jobs, trials_matched) =
            collect_structured(&listing.records, query, &self.roles);

        enter(PipelineState::Extracting, query);
        let mut tagged = structured;
        let mut detail_failures = 0usize;
        let mut aborted = false;
        {
            let mut results = stream::iter(jobs)
                .map(|job| async move {
                    self.wait_for_pacing().await;
                    let fetched = self.registry.fetch_detail_page(&job.trial.nct_id).await;
                    (job, fetched)
                })
                .buffer_unordered(self.config.fallback_workers);

            loop {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(&mut cancel) => {
                        info!("Query cancelled, keeping rows accumulated so far");
                        aborted = true;
                        break;
                    }
                    next = results.next() => {
                        let (job, fetched) = match next {
                            Some(result) => result,
                            None => break,
                        };
                        match fetched {
                            Ok(body) => {
                                let text = fallback::page_text(&body);
                                let officials = fallback::extract_from_text(&text, &self.roles);
                                debug!(
                                    nct_id = %job.trial.nct_id,
                                    candidates = officials.len(),
                                    "Fallback extraction finished"
                                );
                                let rows = fallback_rows(&job, &officials);
                                if !rows.is_empty() {
                                    tagged.push((job.index, rows));
                                }
                            }
                            Err(e) => {
                                detail_failures += 1;
                                warn!(
                                    nct_id = %job.trial.nct_id,
                                    error = %e,
                                    "Detail fetch failed, skipping trial"
                                );
                            }
                        }
                    }
                }
            }
        }

        enter(PipelineState::Deduplicating, query);
        // Fallback results arrive in completion order; listing order is
        // restored before dedup so first-occurrence-wins is deterministic
        tagged.sort_by_key(|(index, _)| *index);
        let merged: Vec<InvestigatorRow> = tagged.into_iter().flat_map(|(_, rows)| rows).collect();
        let rows = dedup_rows(merged);

        let summary = SearchSummary {
            trials_fetched: listing.records.len(),
            trials_matched,
            rows_produced: rows.len(),
            records_skipped: listing.skipped,
            detail_failures,
            total_found: listing.total_found,
            aborted,
        };
        enter(PipelineState::Done, query);
        info!(
            trials_fetched = summary.trials_fetched,
            trials_matched = summary.trials_matched,
            rows_produced = summary.rows_produced,
            records_skipped = summary.records_skipped,
            detail_failures = summary.detail_failures,
            aborted = summary.aborted,
            "Search complete"
        );

        SearchOutcome { rows, summary }
    }

    /// Space detail fetches by the configured courtesy interval. The gate
    /// stays locked through the sleep, so concurrent workers line up behind
    /// it one at a time.
    async fn wait_for_pacing(&self) {
        let mut last = self.last_detail_fetch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.detail_pacing {
                sleep(self.config.detail_pacing - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// First extraction pass over the listing: match each trial's sites and
/// take structured officials where the registry provides them. Trials that
/// match on location but have no usable officials become fallback jobs.
fn collect_structured(
    records: &[TrialRecord],
    query: &Query,
    roles: &RoleLexicon,
) -> (Vec<(usize, Vec<InvestigatorRow>)>, Vec<FallbackJob>, usize) {
    let mut structured = Vec::new();
    let mut jobs = Vec::new();
    let mut trials_matched = 0usize;

    for (index, trial) in records.iter().enumerate() {
        let site = match match_site(trial, &query.city, query.state_text()) {
            Some(site) => site,
            None => continue,
        };
        trials_matched += 1;

        let officials = structured_officials(trial, roles);
        if officials.is_empty() {
            jobs.push(FallbackJob {
                index,
                trial: trial.clone(),
                site: site.clone(),
            });
            continue;
        }

        let rows = officials
            .iter()
            .map(|official| {
                InvestigatorRow::new(trial, site, official, ExtractionSource::Structured)
            })
            .collect();
        structured.push((index, rows));
    }

    (structured, jobs, trials_matched)
}

/// Rows for one fallback job's extracted candidates, tagged with the
/// fallback source.
fn fallback_rows(job: &FallbackJob, officials: &[Official]) -> Vec<InvestigatorRow> {
    officials
        .iter()
        .map(|official| {
            InvestigatorRow::new(&job.trial, &job.site, official, ExtractionSource::FallbackText)
        })
        .collect()
}

fn enter(state: PipelineState, query: &Query) {
    debug!(state = state.as_str(), city = %query.city, "Pipeline stage");
}

/// Resolve when the cancellation signal fires. Pends forever when the
/// sender is dropped without signalling, so `select!` arms using this never
/// fire spuriously.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    loop {
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *cancel.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ROLE_VOCABULARY;
    use std::time::Duration;

    fn lexicon() -> RoleLexicon {
        let vocabulary: Vec<String> = DEFAULT_ROLE_VOCABULARY
            .iter()
            .map(|s| s.to_string())
            .collect();
        RoleLexicon::new(&vocabulary).expect("default vocabulary")
    }

    fn san_diego_trial(officials: Vec<Official>) -> TrialRecord {
        TrialRecord {
            nct_id: "NCT01234567".to_string(),
            title: "A Study of Something".to_string(),
            status: "Recruiting".to_string(),
            phases: vec!["Phase 2".to_string()],
            sites: vec![Site {
                city: "San Diego".to_string(),
                state: "CA".to_string(),
                facility: "UCSD".to_string(),
            }],
            officials,
        }
    }

    fn jane_doe() -> Official {
        Official {
            name: "Jane Doe".to_string(),
            role: "Principal Investigator".to_string(),
            affiliation: "UCSD".to_string(),
        }
    }

    fn san_diego_query() -> Query {
        Query::for_city("San Diego")
            .with_state("CA")
            .with_max_trials(50)
    }

    #[test]
    fn test_structured_official_yields_one_row() {
        let records = vec![san_diego_trial(vec![jane_doe()])];
        let (structured, jobs, matched) =
            collect_structured(&records, &san_diego_query(), &lexicon());

        assert_eq!(matched, 1);
        assert!(jobs.is_empty());
        assert_eq!(structured.len(), 1);
        let rows = &structured[0].1;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pi_name, "Jane Doe");
        assert_eq!(rows[0].source, ExtractionSource::Structured);
        assert_eq!(rows[0].city, "San Diego");
    }

    #[test]
    fn test_structured_precedence_suppresses_fallback_jobs() {
        // A trial with a usable structured official never becomes a
        // detail-page fetch
        let records = vec![san_diego_trial(vec![jane_doe()])];
        let (_, jobs, _) = collect_structured(&records, &san_diego_query(), &lexicon());
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_empty_officials_become_a_fallback_job() {
        let records = vec![san_diego_trial(vec![])];
        let (structured, jobs, matched) =
            collect_structured(&records, &san_diego_query(), &lexicon());

        assert!(structured.is_empty());
        assert_eq!(matched, 1);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].index, 0);
        assert_eq!(jobs[0].trial.nct_id, "NCT01234567");
        assert_eq!(jobs[0].site.city, "San Diego");
    }

    #[test]
    fn test_non_investigator_officials_also_fall_back() {
        let records = vec![san_diego_trial(vec![Official {
            name: "Acme Pharma".to_string(),
            role: "Sponsor".to_string(),
            affiliation: String::new(),
        }])];
        let (structured, jobs, _) = collect_structured(&records, &san_diego_query(), &lexicon());
        assert!(structured.is_empty());
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_unmatched_city_is_excluded_entirely() {
        let mut trial = san_diego_trial(vec![jane_doe()]);
        trial.sites = vec![Site {
            city: "Boston".to_string(),
            state: "MA".to_string(),
            facility: "MGH".to_string(),
        }];
        let (structured, jobs, matched) =
            collect_structured(&[trial], &san_diego_query(), &lexicon());

        assert_eq!(matched, 0);
        assert!(structured.is_empty());
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_state_as_str_covers_all_stages() {
        assert_eq!(PipelineState::Fetching.as_str(), "fetching");
        assert_eq!(PipelineState::Done.as_str(), "done");
        assert_eq!(PipelineState::Failed.as_str(), "failed");
    }

    #[test]
    fn test_summary_serializes_counters() {
        let summary = SearchSummary {
            trials_fetched: 10,
            trials_matched: 3,
            rows_produced: 2,
            records_skipped: 1,
            detail_failures: 1,
            total_found: Some(42),
            aborted: false,
        };
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["trials_fetched"], 10);
        assert_eq!(value["total_found"], 42);
        assert_eq!(value["aborted"], false);
    }

    #[tokio::test]
    async fn test_invalid_query_fails_before_any_fetch() {
        let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
        let query = Query::for_city("   ");
        assert!(pipeline.search(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_pacing_spaces_consecutive_fetches() {
        let config = PipelineConfig {
            detail_pacing: Duration::from_millis(50),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).expect("pipeline");

        let started = Instant::now();
        pipeline.wait_for_pacing().await;
        pipeline.wait_for_pacing().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_cancel_before_fetch_returns_aborted_outcome() {
        let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        let outcome = pipeline
            .search_with_cancel(&san_diego_query(), rx)
            .await
            .expect("cancelled search still succeeds");
        assert!(outcome.rows.is_empty());
        assert!(outcome.summary.aborted);
    }

    #[test]
    fn test_fallback_candidates_become_tagged_rows() {
        let trial = san_diego_trial(vec![]);
        let site = trial.sites[0].clone();
        let job = FallbackJob {
            index: 0,
            trial,
            site,
        };

        let html =
            "<html><body><p>Name: John Smith Role: Study Chair Affiliation: UCSD</p></body></html>";
        let text = fallback::page_text(html);
        let officials = fallback::extract_from_text(&text, &lexicon());
        let rows = fallback_rows(&job, &officials);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pi_name, "John Smith");
        assert_eq!(rows[0].role, "Study Chair");
        assert_eq!(rows[0].affiliation, "UCSD");
        assert_eq!(rows[0].source, ExtractionSource::FallbackText);
        assert_eq!(rows[0].city, "San Diego");
        assert_eq!(rows[0].state, "CA");
        assert_eq!(rows[0].nct_id, "NCT01234567");
    }

    #[tokio::test]
    async fn test_cancel_during_extraction_keeps_structured_rows() {
        let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        let mut needs_detail = san_diego_trial(vec![]);
        needs_detail.nct_id = "NCT09999999".to_string();
        let listing = Listing {
            records: vec![san_diego_trial(vec![jane_doe()]), needs_detail],
            skipped: 0,
            total_found: Some(2),
        };

        let outcome = pipeline
            .process_listing(listing, &san_diego_query(), rx)
            .await;

        assert!(outcome.summary.aborted);
        assert_eq!(outcome.summary.trials_matched, 2);
        assert_eq!(outcome.summary.detail_failures, 0);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].pi_name, "Jane Doe");
        assert_eq!(outcome.rows[0].source, ExtractionSource::Structured);
    }

    #[tokio::test]
    async fn test_wait_cancelled_fires_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");
        tokio::time::timeout(Duration::from_millis(100), wait_cancelled(&mut rx))
            .await
            .expect("cancellation should resolve");
    }

    #[tokio::test]
    async fn test_wait_cancelled_pends_when_sender_drops() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited =
            tokio::time::timeout(Duration::from_millis(20), wait_cancelled(&mut rx)).await;
        assert!(waited.is_err());
    }
}
