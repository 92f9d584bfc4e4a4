//! Row deduplication.
//!
//! Two rows are duplicates iff their case-insensitive (name, city, state)
//! triples are equal. First occurrence wins; order is otherwise preserved.

use std::collections::HashSet;

use crate::types::InvestigatorRow;

/// Collapse duplicate rows, keeping the first of each triple.
pub fn dedup_rows(rows: Vec<InvestigatorRow>) -> Vec<InvestigatorRow> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            seen.insert((
                row.pi_name.to_lowercase(),
                row.city.to_lowercase(),
                row.state.to_lowercase(),
            ))
        })
        .collect()
}
