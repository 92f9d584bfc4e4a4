//! Structured extraction of investigators from a trial's listing record.

use tracing::debug;

use crate::roles::RoleLexicon;
use crate::types::{Official, TrialRecord};

/// Pull the investigator-role officials out of a record's structured
/// official list.
///
/// An official counts only when both a name and a role are present and the
/// role classifies as an investigator role. Affiliation may be empty.
pub fn structured_officials(trial: &TrialRecord, roles: &RoleLexicon) -> Vec<Official> {
    let officials: Vec<Official> = trial
        .officials
        .iter()
        .filter(|o| !o.name.trim().is_empty() && !o.role.trim().is_empty())
        .filter(|o| roles.is_investigator(&o.role))
        .cloned()
        .collect();

    if !officials.is_empty() {
        debug!(
            nct_id = %trial.nct_id,
            count = officials.len(),
            "Structured officials carry investigator roles"
        );
    }
    officials
}
