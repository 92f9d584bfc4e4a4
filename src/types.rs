//! Canonical data model for the extraction pipeline.
//!
//! Everything downstream of the schema adapter works on these types; the two
//! registry generations are invisible past this point.

use serde::Serialize;

use crate::error::{PiFinderError, Result};

/// Fixed phase filter set accepted by [`Query::phase`]
pub const PHASES: &[&str] = &["any", "phase 1", "phase 2", "phase 3", "phase 4"];

/// Default cap on trials scanned per query
pub const DEFAULT_MAX_TRIALS: usize = 200;

/// One trial as adapted from either registry generation.
///
/// A record that reaches extraction always has a non-empty `nct_id`; the
/// adapter drops (and counts) records where it could not find one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrialRecord {
    /// Registry identifier (NCT number)
    pub nct_id: String,
    /// Official title, falling back to the brief title
    pub title: String,
    /// Free-text lifecycle label, e.g. "Recruiting"
    pub status: String,
    /// Phase labels in listing order, possibly empty
    pub phases: Vec<String>,
    /// Listed sites in listing order
    pub sites: Vec<Site>,
    /// Structured officials as supplied by the registry, unfiltered
    pub officials: Vec<Official>,
}

impl TrialRecord {
    /// Phase labels joined for display/export ("Phase 1;Phase 2")
    pub fn phases_text(&self) -> String {
        self.phases.join(";")
    }
}

/// One listed site. All fields free text, any may be empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Site {
    pub city: String,
    pub state: String,
    pub facility: String,
}

/// A name/role/affiliation triple.
///
/// Appears both raw (as `TrialRecord::officials`, straight from the registry)
/// and filtered (as extractor output, role already classified).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Official {
    pub name: String,
    pub role: String,
    pub affiliation: String,
}

/// One search request.
#[derive(Debug, Clone)]
pub struct Query {
    /// Target city (required, non-empty)
    pub city: String,
    /// Target state/region (optional; substring match)
    pub state: Option<String>,
    /// Condition keywords folded into the registry expression
    pub condition: Option<String>,
    /// Phase filter, one of [`PHASES`]; "any" and `None` are equivalent
    pub phase: Option<String>,
    /// Hard cap on trials scanned (not on rows returned)
    pub max_trials: usize,
}

impl Query {
    /// Query for a city with all defaults
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: None,
            condition: None,
            phase: None,
            max_trials: DEFAULT_MAX_TRIALS,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Check the invariants callers must uphold.
    pub fn validate(&self) -> Result<()> {
        if self.city.trim().is_empty() {
            return Err(PiFinderError::Validation("city must not be empty".into()));
        }
        if self.max_trials == 0 {
            return Err(PiFinderError::Validation(
                "max_trials must be positive".into(),
            ));
        }
        if let Some(phase) = &self.phase {
            let phase = phase.trim().to_lowercase();
            if !PHASES.contains(&phase.as_str()) {
                return Err(PiFinderError::Validation(format!(
                    "unknown phase '{}' (expected one of {:?})",
                    phase, PHASES
                )));
            }
        }
        Ok(())
    }

    /// Registry search expression: the non-empty of city, state, condition
    /// and phase joined with spaces; "any" drops the phase term. Falls back
    /// to the city alone.
    pub fn expression(&self) -> String {
        let phase = self
            .phase
            .as_deref()
            .filter(|p| !p.eq_ignore_ascii_case("any"));
        let parts = [
            Some(self.city.as_str()),
            self.state.as_deref(),
            self.condition.as_deref(),
            phase,
        ];
        let expr = parts
            .iter()
            .flatten()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if expr.is_empty() {
            self.city.trim().to_string()
        } else {
            expr
        }
    }

    /// Requested state, empty string when absent (wildcard)
    pub fn state_text(&self) -> &str {
        self.state.as_deref().unwrap_or("")
    }
}

/// How a row's investigator was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionSource {
    /// Registry supplied an explicit official record
    Structured,
    /// Heuristic scan of the rendered detail page
    FallbackText,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::FallbackText => "fallback-text",
        }
    }
}

impl std::fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical output row: one investigator at one matched site of one trial.
///
/// Created once during extraction, immutable thereafter; dropped only by the
/// deduplicator. Field order is the export column order.
#[derive(Debug, Clone, Serialize)]
pub struct InvestigatorRow {
    pub pi_name: String,
    pub role: String,
    pub affiliation: String,
    /// City of the matched site
    pub city: String,
    /// State of the matched site
    pub state: String,
    pub nct_id: String,
    pub status: String,
    /// Joined phase labels
    pub phases: String,
    pub study_title: String,
    pub source: ExtractionSource,
}

impl InvestigatorRow {
    /// Build a row for one (trial, matched site, official) triple.
    pub fn new(
        trial: &TrialRecord,
        site: &Site,
        official: &Official,
        source: ExtractionSource,
    ) -> Self {
        Self {
            pi_name: official.name.clone(),
            role: official.role.clone(),
            affiliation: official.affiliation.clone(),
            city: site.city.clone(),
            state: site.state.clone(),
            nct_id: trial.nct_id.clone(),
            status: trial.status.clone(),
            phases: trial.phases_text(),
            study_title: trial.title.clone(),
            source,
        }
    }
}
