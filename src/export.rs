//! CSV export of investigator rows.
//!
//! Two forms: [`write_rows`] serializes a whole result set to any writer,
//! and [`csv_chunks`] yields one encoded line at a time so an HTTP response
//! can stream rows without materializing the full document first.

use crate::error::Result;
use crate::types::{InvestigatorRow, Query};

/// Fixed export column order. Matches the field order of
/// [`InvestigatorRow`], which the serializing writer derives headers from.
pub const CSV_COLUMNS: &[&str] = &[
    "pi_name",
    "role",
    "affiliation",
    "city",
    "state",
    "nct_id",
    "status",
    "phases",
    "study_title",
    "source",
];

/// Write header plus all rows to `writer`. Zero rows still produce the
/// header line.
pub fn write_rows<W: std::io::Write>(writer: W, rows: &[InvestigatorRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);

    if rows.is_empty() {
        // serialize() never runs for an empty set, so the automatic header
        // would be skipped
        wtr.write_record(CSV_COLUMNS)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Iterator of encoded CSV lines: the header first, then one line per row.
pub fn csv_chunks(rows: Vec<InvestigatorRow>) -> impl Iterator<Item = Result<String>> {
    let header: Vec<String> = CSV_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    std::iter::once(encode_record(&header))
        .chain(rows.into_iter().map(|row| encode_record(&row_fields(&row))))
}

/// Download filename for a query, e.g. `pi_san_diego_ca.csv`.
pub fn export_filename(query: &Query) -> String {
    format!(
        "pi_{}_{}.csv",
        filename_part(&query.city),
        filename_part(query.state_text())
    )
}

fn encode_record(fields: &[String]) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);
        wtr.write_record(fields)?;
        wtr.flush()?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn row_fields(row: &InvestigatorRow) -> Vec<String> {
    vec![
        row.pi_name.clone(),
        row.role.clone(),
        row.affiliation.clone(),
        row.city.clone(),
        row.state.clone(),
        row.nct_id.clone(),
        row.status.clone(),
        row.phases.clone(),
        row.study_title.clone(),
        row.source.as_str().to_string(),
    ]
}

fn filename_part(part: &str) -> String {
    let joined = part
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if joined.is_empty() {
        "all".to_string()
    } else {
        joined
    }
}
