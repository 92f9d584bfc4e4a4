//! Fallback extraction of investigators from rendered detail-page text.
//!
//! Registry detail pages are not machine-structured, so this module scans
//! their visible text with layered heuristics, from precise to permissive:
//!
//! 1. Labeled-field scan ("Name: ... Role: ... Affiliation: ...")
//! 2. Role-phrase proximity scan inside the investigator detail section
//! 3. The same proximity scan under a "Contacts and Locations" heading
//! 4. The proximity scan over the whole page
//!
//! A stage runs only while earlier stages found nothing, so cheap matches
//! never drown out precise ones. Later stages carry a real false-positive
//! risk; that imprecision is part of the contract, not a defect to engineer
//! away.

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::roles::RoleLexicon;
use crate::types::Official;

/// Bytes scanned after a "Name:" anchor for its companion labels
const LABEL_WINDOW: usize = 240;
/// Bytes scanned on each side of a role-phrase mention
const PROXIMITY_WINDOW: usize = 120;
/// Slice length taken from an investigator detail heading
const DETAIL_SECTION_SPAN: usize = 2500;
/// Slice length taken from a "Contacts and Locations" heading
const CONTACTS_SECTION_SPAN: usize = 6000;

const NAME_CAP: usize = 80;
const ROLE_CAP: usize = 60;
const AFFILIATION_CAP: usize = 120;

/// Capitalized 2-4 token run with an optional trailing academic suffix.
const NAME_PATTERN: &str = r"\b[A-Z](?:[a-z]+|\.)(?:['-][A-Z][a-z]+)?(?: [A-Z](?:[a-z]+|\.)(?:['-][A-Z][a-z]+)?){1,3}(?:,? (?:Pharm\.?D\.?|Ph\.?D\.?|Dr\.?P\.?H\.?|M\.?P\.?H\.?|MBBS|M\.?Sc\.?|M\.?B\.?A\.?|M\.?S\.?|M\.?D\.?|D\.?O\.?|R\.?N\.?))?";

/// Tokens that disqualify a capitalized run from being a personal name.
const NAME_STOPLIST: &[&str] = &[
    "name",
    "role",
    "affiliation",
    "contact",
    "contacts",
    "phone",
    "email",
    "principal",
    "investigator",
    "study",
    "chair",
    "director",
    "locations",
    "information",
    "officials",
    "overall",
    "site",
    "sub",
];

/// Reduce a detail page's HTML to visible text, one text node per line.
///
/// Script, style and noscript bodies are stripped first; the parser exposes
/// their contents as text nodes otherwise. Line boundaries are kept because
/// the labeled-field scan uses them to terminate values.
pub fn page_text(html: &str) -> String {
    let mut cleaned = html.to_string();
    for pattern in [
        r"(?is)<script.*?</script>",
        r"(?is)<style.*?</style>",
        r"(?is)<noscript.*?</noscript>",
    ] {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
    }

    let document = Html::parse_document(&cleaned);
    let nodes: Vec<&str> = match Selector::parse("body") {
        Ok(selector) => match document.select(&selector).next() {
            Some(body) => body.text().collect(),
            None => document.root_element().text().collect(),
        },
        Err(_) => document.root_element().text().collect(),
    };

    let mut lines = Vec::new();
    for node in nodes {
        let line = node.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Scan page text for investigator candidates, one stage at a time.
///
/// Stages are ordered precise-to-permissive and each later stage runs only
/// when nothing has been found yet. Candidates found within one page are
/// de-duplicated by name and role.
pub fn extract_from_text(text: &str, roles: &RoleLexicon) -> Vec<Official> {
    let mut found: Vec<Official> = Vec::new();
    let detail = detail_section(text);

    // Label syntax is unambiguous wherever it appears, so pages without a
    // recognizable detail heading still get the labeled scan over the whole
    // text.
    append_candidates(&mut found, labeled_scan(detail.unwrap_or(text), roles));

    if found.is_empty() {
        if let Some(section) = detail {
            append_candidates(&mut found, proximity_scan(section, roles));
        }
    }
    if found.is_empty() {
        if let Some(section) = contacts_section(text) {
            append_candidates(&mut found, proximity_scan(section, roles));
        }
    }
    if found.is_empty() {
        append_candidates(&mut found, proximity_scan(text, roles));
    }

    debug!(candidates = found.len(), "Fallback text scan finished");
    found
}

/// Stage 1: explicit "Name: ... Role: ... Affiliation: ..." blocks.
///
/// Each value ends at the next label in the window or at its line break,
/// whichever comes first. A block without a role label is skipped, and the
/// captured role must classify as an investigator role.
fn labeled_scan(text: &str, roles: &RoleLexicon) -> Option<Vec<Official>> {
    let name_re = Regex::new(r"(?i)\bname\s*:").ok()?;
    let role_re = Regex::new(r"(?i)\brole\s*:").ok()?;
    let affiliation_re = Regex::new(r"(?i)\baffiliation\s*:").ok()?;

    let mut found = Vec::new();
    for anchor in name_re.find_iter(text) {
        let window_end = clamp_ceil(text, anchor.end() + LABEL_WINDOW);
        let window = &text[anchor.end()..window_end];

        let role_label = match role_re.find(window) {
            Some(label) => label,
            None => continue,
        };
        let next_anchor = name_re.find(window).map(|m| m.start()).unwrap_or(window.len());
        if next_anchor < role_label.start() {
            // The role label belongs to the following block
            continue;
        }

        let name = clean_value(&window[..role_label.start()], NAME_CAP);

        let affiliation_label = affiliation_re
            .find(window)
            .filter(|label| label.start() >= role_label.end() && label.start() <= next_anchor);
        let (role_end, affiliation) = match affiliation_label {
            Some(label) => (
                label.start(),
                clean_value(&window[label.end()..next_anchor], AFFILIATION_CAP),
            ),
            None => (next_anchor, String::new()),
        };
        let role = clean_value(&window[role_label.end()..role_end], ROLE_CAP);

        if name.is_empty() || !roles.is_investigator(&role) {
            continue;
        }
        found.push(Official {
            name,
            role,
            affiliation,
        });
    }
    Some(found)
}

/// Stages 2-4: pair each investigator-role mention with the nearest
/// capitalized name run inside a symmetric window around the mention.
fn proximity_scan(text: &str, roles: &RoleLexicon) -> Option<Vec<Official>> {
    let name_re = Regex::new(NAME_PATTERN).ok()?;

    let mut found = Vec::new();
    for mention in roles.find_mentions(text) {
        let window_start = clamp_floor(text, mention.start().saturating_sub(PROXIMITY_WINDOW));
        let window_end = clamp_ceil(text, mention.end() + PROXIMITY_WINDOW);
        let window = &text[window_start..window_end];
        let mention_mid = (mention.start() + mention.end()) / 2 - window_start;

        let mut best: Option<(usize, &str)> = None;
        for candidate in name_re.find_iter(window) {
            if is_stoplisted(candidate.as_str()) {
                continue;
            }
            let candidate_mid = (candidate.start() + candidate.end()) / 2;
            let distance = candidate_mid.abs_diff(mention_mid);
            if best.map_or(true, |(closest, _)| distance < closest) {
                best = Some((distance, candidate.as_str()));
            }
        }

        if let Some((_, name)) = best {
            found.push(Official {
                name: clean_value(name, NAME_CAP),
                role: mention.as_str().to_string(),
                affiliation: String::new(),
            });
        }
    }
    Some(found)
}

/// Slice starting at the first investigator detail heading, if any.
fn detail_section(text: &str) -> Option<&str> {
    section_from(
        text,
        r"(?i)\b(?:investigator information|study officials?|overall officials?|investigators?)\b",
        DETAIL_SECTION_SPAN,
    )
}

/// Slice starting at a "Contacts and Locations" heading, if any.
fn contacts_section(text: &str) -> Option<&str> {
    section_from(text, r"(?i)\bcontacts?\s+and\s+locations?\b", CONTACTS_SECTION_SPAN)
}

fn section_from<'t>(text: &'t str, heading: &str, span: usize) -> Option<&'t str> {
    let re = Regex::new(heading).ok()?;
    let m = re.find(text)?;
    let end = clamp_ceil(text, m.start() + span);
    Some(&text[m.start()..end])
}

fn append_candidates(found: &mut Vec<Official>, candidates: Option<Vec<Official>>) {
    for candidate in candidates.unwrap_or_default() {
        let duplicate = found.iter().any(|o| {
            o.name.eq_ignore_ascii_case(&candidate.name)
                && o.role.eq_ignore_ascii_case(&candidate.role)
        });
        if !duplicate {
            found.push(candidate);
        }
    }
}

/// Trim a captured value to its first line, cap its length, and strip list
/// punctuation from the ends.
fn clean_value(raw: &str, cap: usize) -> String {
    let first_line = raw.trim().split('\n').next().unwrap_or("");
    truncate_chars(first_line, cap)
        .trim()
        .trim_matches(|c| matches!(c, ',' | ';' | ':'))
        .trim()
        .to_string()
}

fn is_stoplisted(candidate: &str) -> bool {
    candidate
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|token| !token.is_empty())
        .any(|token| NAME_STOPLIST.contains(&token.to_ascii_lowercase().as_str()))
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Largest char boundary at or below `index`.
fn clamp_floor(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary at or above `index`.
fn clamp_ceil(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ROLE_VOCABULARY;

    fn lexicon() -> RoleLexicon {
        let vocabulary: Vec<String> = DEFAULT_ROLE_VOCABULARY
            .iter()
            .map(|s| s.to_string())
            .collect();
        RoleLexicon::new(&vocabulary).expect("default vocabulary")
    }

    #[test]
    fn test_page_text_strips_scripts_and_keeps_lines() {
        let html = r#"<html><head><style>.x{color:red}</style></head>
            <body><script>var hidden = "secret";</script>
            <h2>Investigator Information</h2>
            <p>Name: Jane Doe</p></body></html>"#;
        let text = page_text(html);
        assert!(text.contains("Investigator Information"));
        assert!(text.contains("Name: Jane Doe"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn test_labeled_scan_on_headerless_page() {
        let text = "Trial overview follows.\nName: John Smith Role: Study Chair Affiliation: UCSD\nEligibility: adults 18 and older.";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "John Smith");
        assert_eq!(found[0].role, "Study Chair");
        assert_eq!(found[0].affiliation, "UCSD");
    }

    #[test]
    fn test_labeled_scan_multiline_block() {
        let text = "Investigator Information\nName: Jane Doe\nRole: Principal Investigator\nAffiliation: Scripps Clinic\nStatus: Recruiting";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Jane Doe");
        assert_eq!(found[0].role, "Principal Investigator");
        assert_eq!(found[0].affiliation, "Scripps Clinic");
    }

    #[test]
    fn test_labeled_scan_rejects_non_investigator_role() {
        let text = "Name: Bob Jones Role: Research Coordinator Affiliation: Somewhere";
        assert!(extract_from_text(text, &lexicon()).is_empty());
    }

    #[test]
    fn test_proximity_scan_pairs_nearest_name() {
        let text = "Study Officials\nThe site principal investigator for this trial is Maria Garcia, MD of Scripps Clinic.";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Maria Garcia, MD");
        assert!(found[0].role.eq_ignore_ascii_case("site principal investigator"));
        assert!(found[0].affiliation.is_empty());
    }

    #[test]
    fn test_labeled_stage_suppresses_later_stages() {
        let text = "Investigator Information\nName: Jane Doe Role: Principal Investigator Affiliation: Scripps\nElsewhere the study director Tom Hardy oversees enrollment.";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Jane Doe");
    }

    #[test]
    fn test_contacts_section_scopes_the_scan() {
        let text = "A press release mentions study director Alice Warner in passing, far from any heading.\nContacts and Locations\nPrincipal Investigator: Brian Chen, MD";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Brian Chen, MD");
    }

    #[test]
    fn test_whole_page_scan_is_the_last_resort() {
        let text = "No familiar headings anywhere on this page. Enrollment questions go to the study chair, Dana Whitfield, at the front desk.";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Dana Whitfield");
        assert!(found[0].role.eq_ignore_ascii_case("study chair"));
    }

    #[test]
    fn test_no_candidates_on_plain_text() {
        let text = "This page describes parking arrangements and visiting hours only.";
        assert!(extract_from_text(text, &lexicon()).is_empty());
    }

    #[test]
    fn test_stoplist_rejects_layout_words() {
        assert!(is_stoplisted("Overall Officials"));
        assert!(is_stoplisted("Principal Investigator"));
        assert!(is_stoplisted("Contact Phone"));
        assert!(!is_stoplisted("Maria Garcia"));
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "Étude clinique à Montréal. Позвоните нам. The principal investigator coordinates la sécurité des données étude étude étude.";
        let found = extract_from_text(text, &lexicon());
        assert!(found.is_empty());
    }

    #[test]
    fn test_duplicate_candidates_collapse_within_page() {
        let text = "Name: Jane Doe Role: Study Chair Affiliation: Scripps\nName: Jane Doe Role: Study Chair Affiliation: Scripps";
        let found = extract_from_text(text, &lexicon());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].affiliation, "Scripps");
    }
}
