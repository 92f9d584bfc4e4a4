//! Role classification.
//!
//! Decides whether a free-text role string denotes an investigator-type role.
//! The vocabulary is a closed set supplied by configuration; matching is
//! case-insensitive and tolerant of the separators the registry generations
//! use between words ("Sub-Investigator", "sub investigator",
//! "PRINCIPAL_INVESTIGATOR" all classify).

use regex::Regex;

use crate::error::{PiFinderError, Result};

/// Compiled role vocabulary.
#[derive(Debug)]
pub struct RoleLexicon {
    phrase_regex: Regex,
}

impl RoleLexicon {
    /// Compile a vocabulary of role phrases.
    ///
    /// # Errors
    ///
    /// Returns a config error for an empty vocabulary or a phrase that
    /// produces an invalid pattern.
    pub fn new(vocabulary: &[String]) -> Result<Self> {
        let mut phrases: Vec<&str> = vocabulary
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Err(PiFinderError::Config(
                "role vocabulary must not be empty".to_string(),
            ));
        }
        // Longest first so overlapping phrases resolve to the fuller match
        phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let alternatives: Vec<String> = phrases.iter().map(|p| phrase_pattern(p)).collect();
        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        let phrase_regex = Regex::new(&pattern)
            .map_err(|e| PiFinderError::Config(format!("invalid role vocabulary: {}", e)))?;

        Ok(Self { phrase_regex })
    }

    /// True if the role string contains an investigator-type phrase.
    pub fn is_investigator(&self, role: &str) -> bool {
        self.phrase_regex.is_match(role)
    }

    /// All role-phrase occurrences in a block of text, in order.
    pub fn find_mentions<'t>(&self, text: &'t str) -> Vec<regex::Match<'t>> {
        self.phrase_regex.find_iter(text).collect()
    }
}

/// One vocabulary phrase as a pattern: words separated by any run of
/// whitespace, underscores or hyphens.
fn phrase_pattern(phrase: &str) -> String {
    phrase
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_-]*")
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
        RoleLexicon::new(&vocabulary).expect("default vocabulary compiles")
    }

    #[test]
    fn test_accepts_investigator_roles() {
        let lex = lexicon();
        assert!(lex.is_investigator("Principal Investigator"));
        assert!(lex.is_investigator("site principal investigator"));
        assert!(lex.is_investigator("Sub-Investigator"));
        assert!(lex.is_investigator("Study Chair"));
        assert!(lex.is_investigator("Study Director"));
    }

    #[test]
    fn test_accepts_modern_role_codes() {
        let lex = lexicon();
        assert!(lex.is_investigator("PRINCIPAL_INVESTIGATOR"));
        assert!(lex.is_investigator("STUDY_CHAIR"));
    }

    #[test]
    fn test_rejects_non_investigator_roles() {
        let lex = lexicon();
        assert!(!lex.is_investigator("Co-Investigator"));
        assert!(!lex.is_investigator("Research Coordinator"));
        assert!(!lex.is_investigator("Sponsor"));
        assert!(!lex.is_investigator(""));
    }

    #[test]
    fn test_finds_mentions_in_text() {
        let lex = lexicon();
        let text = "The Principal Investigator is Jane Doe; the study director was not named.";
        let mentions = lex.find_mentions(text);
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].as_str(), "Principal Investigator");
        assert_eq!(mentions[1].as_str(), "study director");
    }

    #[test]
    fn test_rejects_empty_vocabulary() {
        assert!(RoleLexicon::new(&[]).is_err());
        assert!(RoleLexicon::new(&["  ".to_string()]).is_err());
    }
}
