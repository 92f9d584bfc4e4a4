//! Schema adaptation for the registry's two listing generations.
//!
//! The modern API returns flat camelCase modules; the classic API returns
//! nested Module-style keys with list wrappers and a few historical field
//! aliases. Both shapes are detected from the top-level key and adapted into
//! [`TrialRecord`]s here, so nothing downstream knows which generation a
//! record came from.
//!
//! Missing intermediate containers are treated as empty rather than as
//! failures. A single malformed record never fails the page; it is dropped
//! and counted.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PiFinderError, Result};
use crate::types::{Official, Site, TrialRecord};

/// One adapted listing page.
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Adapted records in listing order
    pub records: Vec<TrialRecord>,
    /// Malformed records dropped from this page
    pub skipped: usize,
    /// Continuation token (modern generation only)
    pub next_page_token: Option<String>,
    /// Total studies the registry reports for the expression, when present
    pub total_found: Option<u64>,
}

/// Listing payload with its generation resolved.
enum ListingPayload {
    Modern(ModernListing),
    Classic(ClassicListing),
}

/// Parse a raw listing body of either generation.
///
/// # Errors
///
/// Fails only when the body is not JSON or matches neither generation's
/// top-level shape; per-record problems are counted in
/// [`ListingPage::skipped`] instead.
pub fn parse_listing(body: &str) -> Result<ListingPage> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    match detect(value)? {
        ListingPayload::Modern(listing) => Ok(adapt_modern_listing(listing)),
        ListingPayload::Classic(listing) => Ok(adapt_classic_listing(listing)),
    }
}

/// Resolve the listing generation from the top-level key.
fn detect(value: serde_json::Value) -> Result<ListingPayload> {
    if value.get("studies").is_some() {
        let listing = serde_json::from_value(value)
            .map_err(|e| PiFinderError::Parse(format!("modern listing: {}", e)))?;
        Ok(ListingPayload::Modern(listing))
    } else if value.get("FullStudiesResponse").is_some() {
        let listing = serde_json::from_value(value)
            .map_err(|e| PiFinderError::Parse(format!("classic listing: {}", e)))?;
        Ok(ListingPayload::Classic(listing))
    } else {
        Err(PiFinderError::Parse(
            "unrecognized listing shape (expected 'studies' or 'FullStudiesResponse')".to_string(),
        ))
    }
}

// === Modern generation (flat camelCase) ===

#[derive(Debug, Deserialize)]
struct ModernListing {
    /// Kept raw so one bad study cannot fail the page
    #[serde(default)]
    studies: Vec<serde_json::Value>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "totalCount")]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModernStudy {
    #[serde(rename = "protocolSection")]
    protocol: Option<ModernProtocol>,
}

#[derive(Debug, Deserialize)]
struct ModernProtocol {
    #[serde(rename = "identificationModule")]
    identification: Option<ModernIdentification>,
    #[serde(rename = "statusModule")]
    status: Option<ModernStatus>,
    #[serde(rename = "designModule")]
    design: Option<ModernDesign>,
    #[serde(rename = "contactsLocationsModule")]
    contacts: Option<ModernContacts>,
}

#[derive(Debug, Deserialize)]
struct ModernIdentification {
    #[serde(rename = "nctId")]
    nct_id: Option<String>,
    #[serde(rename = "officialTitle")]
    official_title: Option<String>,
    #[serde(rename = "briefTitle")]
    brief_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModernStatus {
    #[serde(rename = "overallStatus")]
    overall_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModernDesign {
    #[serde(default)]
    phases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModernContacts {
    #[serde(rename = "overallOfficials", default)]
    officials: Vec<ModernOfficial>,
    #[serde(default)]
    locations: Vec<ModernLocation>,
}

#[derive(Debug, Deserialize)]
struct ModernOfficial {
    name: Option<String>,
    role: Option<String>,
    affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModernLocation {
    facility: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

fn adapt_modern_listing(listing: ModernListing) -> ListingPage {
    let mut page = ListingPage {
        next_page_token: listing.next_page_token,
        total_found: listing.total_count,
        ..Default::default()
    };

    for raw in listing.studies {
        let study: ModernStudy = match serde_json::from_value(raw) {
            Ok(study) => study,
            Err(e) => {
                debug!(error = %e, "Skipping undeserializable modern study");
                page.skipped += 1;
                continue;
            }
        };
        match adapt_modern_study(study) {
            Some(record) => page.records.push(record),
            None => page.skipped += 1,
        }
    }

    if page.skipped > 0 {
        warn!(
            skipped = page.skipped,
            kept = page.records.len(),
            "Dropped malformed records from modern listing page"
        );
    }
    page
}

fn adapt_modern_study(study: ModernStudy) -> Option<TrialRecord> {
    let protocol = study.protocol?;
    let ident = protocol.identification?;

    let nct_id = ident.nct_id.unwrap_or_default();
    if nct_id.trim().is_empty() {
        return None;
    }

    let title = ident
        .official_title
        .filter(|t| !t.trim().is_empty())
        .or(ident.brief_title)
        .unwrap_or_default();
    let status = protocol
        .status
        .and_then(|s| s.overall_status)
        .unwrap_or_default();
    let phases = protocol
        .design
        .map(|d| d.phases)
        .unwrap_or_default()
        .iter()
        .map(|p| normalize_phase_code(p))
        .collect();

    let (officials, sites) = match protocol.contacts {
        Some(contacts) => {
            let officials = contacts
                .officials
                .into_iter()
                .map(|o| Official {
                    name: o.name.unwrap_or_default(),
                    role: normalize_role_code(&o.role.unwrap_or_default()),
                    affiliation: o.affiliation.unwrap_or_default(),
                })
                .collect();
            let sites = contacts
                .locations
                .into_iter()
                .map(|l| Site {
                    city: l.city.unwrap_or_default(),
                    state: l.state.unwrap_or_default(),
                    facility: l.facility.unwrap_or_default(),
                })
                .collect();
            (officials, sites)
        }
        None => (Vec::new(), Vec::new()),
    };

    Some(TrialRecord {
        nct_id,
        title,
        status,
        phases,
        sites,
        officials,
    })
}

// === Classic generation (nested Module-style) ===

#[derive(Debug, Deserialize)]
struct ClassicListing {
    #[serde(rename = "FullStudiesResponse")]
    response: Option<ClassicResponse>,
}

#[derive(Debug, Deserialize)]
struct ClassicResponse {
    #[serde(rename = "NStudiesFound")]
    n_studies_found: Option<u64>,
    #[serde(rename = "FullStudies", default)]
    full_studies: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ClassicFullStudy {
    #[serde(rename = "Study")]
    study: Option<ClassicStudy>,
}

#[derive(Debug, Deserialize)]
struct ClassicStudy {
    #[serde(rename = "ProtocolSection")]
    protocol: Option<ClassicProtocol>,
}

#[derive(Debug, Deserialize)]
struct ClassicProtocol {
    #[serde(rename = "IdentificationModule")]
    identification: Option<ClassicIdentification>,
    #[serde(rename = "StatusModule")]
    status: Option<ClassicStatus>,
    #[serde(rename = "DesignModule")]
    design: Option<ClassicDesign>,
    #[serde(rename = "ContactsLocationsModule")]
    contacts: Option<ClassicContacts>,
}

#[derive(Debug, Deserialize)]
struct ClassicIdentification {
    #[serde(rename = "NCTId")]
    nct_id: Option<String>,
    #[serde(rename = "OfficialTitle")]
    official_title: Option<String>,
    #[serde(rename = "BriefTitle")]
    brief_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassicStatus {
    #[serde(rename = "OverallStatus")]
    overall_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassicDesign {
    #[serde(rename = "PhaseList")]
    phase_list: Option<ClassicPhaseList>,
}

#[derive(Debug, Deserialize)]
struct ClassicPhaseList {
    #[serde(rename = "Phase", default)]
    phase: PhaseField,
}

/// The classic API serialized a lone phase as a bare string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhaseField {
    One(String),
    Many(Vec<String>),
}

impl Default for PhaseField {
    fn default() -> Self {
        PhaseField::Many(Vec::new())
    }
}

impl PhaseField {
    fn into_vec(self) -> Vec<String> {
        match self {
            PhaseField::One(phase) => vec![phase],
            PhaseField::Many(phases) => phases,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassicContacts {
    #[serde(rename = "LocationList")]
    location_list: Option<ClassicLocationList>,
    #[serde(rename = "OverallOfficialList")]
    official_list: Option<ClassicOfficialList>,
    /// Flat alias some responses used instead of the wrapped list
    #[serde(rename = "OverallOfficials", default)]
    flat_officials: Vec<ClassicOfficial>,
}

#[derive(Debug, Deserialize)]
struct ClassicLocationList {
    #[serde(rename = "Location", default)]
    location: Vec<ClassicLocation>,
}

#[derive(Debug, Deserialize)]
struct ClassicLocation {
    #[serde(rename = "LocationCity")]
    city: Option<String>,
    #[serde(rename = "LocationState")]
    state: Option<String>,
    #[serde(rename = "LocationFacility")]
    facility: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassicOfficialList {
    #[serde(rename = "OverallOfficial", default)]
    overall_official: Vec<ClassicOfficial>,
}

#[derive(Debug, Deserialize)]
struct ClassicOfficial {
    #[serde(rename = "OverallOfficialName", alias = "OfficialName")]
    name: Option<String>,
    #[serde(rename = "OverallOfficialRole", alias = "OfficialRole")]
    role: Option<String>,
    #[serde(rename = "OverallOfficialAffiliation", alias = "OfficialAffiliation")]
    affiliation: Option<String>,
}

fn adapt_classic_listing(listing: ClassicListing) -> ListingPage {
    let response = match listing.response {
        Some(response) => response,
        None => return ListingPage::default(),
    };

    let mut page = ListingPage {
        total_found: response.n_studies_found,
        ..Default::default()
    };

    for raw in response.full_studies {
        let full: ClassicFullStudy = match serde_json::from_value(raw) {
            Ok(full) => full,
            Err(e) => {
                debug!(error = %e, "Skipping undeserializable classic study");
                page.skipped += 1;
                continue;
            }
        };
        match full.study.and_then(adapt_classic_study) {
            Some(record) => page.records.push(record),
            None => page.skipped += 1,
        }
    }

    if page.skipped > 0 {
        warn!(
            skipped = page.skipped,
            kept = page.records.len(),
            "Dropped malformed records from classic listing page"
        );
    }
    page
}

fn adapt_classic_study(study: ClassicStudy) -> Option<TrialRecord> {
    let protocol = study.protocol?;
    let ident = protocol.identification?;

    let nct_id = ident.nct_id.unwrap_or_default();
    if nct_id.trim().is_empty() {
        return None;
    }

    let title = ident
        .official_title
        .filter(|t| !t.trim().is_empty())
        .or(ident.brief_title)
        .unwrap_or_default();
    let status = protocol
        .status
        .and_then(|s| s.overall_status)
        .unwrap_or_default();
    let phases = protocol
        .design
        .and_then(|d| d.phase_list)
        .map(|p| p.phase.into_vec())
        .unwrap_or_default();

    let (officials, sites) = match protocol.contacts {
        Some(contacts) => {
            let raw_officials = match contacts.official_list {
                Some(list) if !list.overall_official.is_empty() => list.overall_official,
                _ => contacts.flat_officials,
            };
            let officials = raw_officials
                .into_iter()
                .map(|o| Official {
                    name: o.name.unwrap_or_default(),
                    role: o.role.unwrap_or_default(),
                    affiliation: o.affiliation.unwrap_or_default(),
                })
                .collect();
            let sites = contacts
                .location_list
                .map(|l| l.location)
                .unwrap_or_default()
                .into_iter()
                .map(|l| Site {
                    city: l.city.unwrap_or_default(),
                    state: l.state.unwrap_or_default(),
                    facility: l.facility.unwrap_or_default(),
                })
                .collect();
            (officials, sites)
        }
        None => (Vec::new(), Vec::new()),
    };

    Some(TrialRecord {
        nct_id,
        title,
        status,
        phases,
        sites,
        officials,
    })
}

// === Code normalization (modern generation) ===

/// Humanize a modern role code ("PRINCIPAL_INVESTIGATOR" → "Principal
/// Investigator"). Text that is not an all-caps code passes through.
fn normalize_role_code(role: &str) -> String {
    let trimmed = role.trim();
    if !looks_like_code(trimmed) {
        return trimmed.to_string();
    }
    trimmed
        .split('_')
        .filter(|w| !w.is_empty())
        .map(title_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Humanize a modern phase code ("PHASE2" → "Phase 2", "EARLY_PHASE1" →
/// "Early Phase 1", "NA" → "N/A").
fn normalize_phase_code(phase: &str) -> String {
    let trimmed = phase.trim();
    if trimmed == "NA" || trimmed == "N/A" {
        return "N/A".to_string();
    }
    if !looks_like_code(trimmed) {
        return trimmed.to_string();
    }
    trimmed
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| match word.find(|c: char| c.is_ascii_digit()) {
            Some(i) if i > 0 => format!("{} {}", title_word(&word[..i]), &word[i..]),
            _ => title_word(word),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn looks_like_code(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn title_word(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
