//! Location matching.
//!
//! Case-insensitive substring containment against a trial's site list. The
//! requested city may also match a site's facility name, which keeps sparse
//! city fields usable; an empty requested city or state is a wildcard.

use crate::types::{Site, TrialRecord};

/// First site satisfying the requested city/state, in listing order.
///
/// Listing order is the deliberate tie-break: the registry usually lists the
/// primary recruiting site first.
pub fn match_site<'a>(trial: &'a TrialRecord, city: &str, state: &str) -> Option<&'a Site> {
    let want_city = city.trim().to_lowercase();
    let want_state = state.trim().to_lowercase();

    trial.sites.iter().find(|site| {
        let city_ok = want_city.is_empty()
            || site.city.to_lowercase().contains(&want_city)
            || site.facility.to_lowercase().contains(&want_city);
        let state_ok = want_state.is_empty() || site.state.to_lowercase().contains(&want_state);
        city_ok && state_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial_with_sites(sites: Vec<Site>) -> TrialRecord {
        TrialRecord {
            nct_id: "NCT00000001".to_string(),
            sites,
            ..Default::default()
        }
    }

    fn site(city: &str, state: &str, facility: &str) -> Site {
        Site {
            city: city.to_string(),
            state: state.to_string(),
            facility: facility.to_string(),
        }
    }

    #[test]
    fn test_matches_city_case_insensitively() {
        let trial = trial_with_sites(vec![site("San Diego", "California", "UCSD")]);
        let matched = match_site(&trial, "san diego", "").expect("match");
        assert_eq!(matched.city, "San Diego");
    }

    #[test]
    fn test_matches_on_facility_when_city_sparse() {
        let trial = trial_with_sites(vec![site("", "CA", "UCSD Medical Center San Diego")]);
        assert!(match_site(&trial, "San Diego", "CA").is_some());
    }

    #[test]
    fn test_state_substring_never_rejected_with_empty_city() {
        // Empty city is a wildcard; any site whose state contains the
        // requested substring must match.
        let trial = trial_with_sites(vec![site("Boston", "Massachusetts", "MGH")]);
        assert!(match_site(&trial, "", "massachusetts").is_some());
        assert!(match_site(&trial, "", "achuse").is_some());
        assert!(match_site(&trial, "", "CA").is_none());
    }

    #[test]
    fn test_empty_request_is_wildcard() {
        let trial = trial_with_sites(vec![site("Anywhere", "", "")]);
        assert!(match_site(&trial, "", "").is_some());
    }

    #[test]
    fn test_first_matching_site_wins() {
        let trial = trial_with_sites(vec![
            site("Boston", "MA", "MGH"),
            site("San Diego", "CA", "UCSD"),
            site("San Diego", "CA", "Scripps"),
        ]);
        let matched = match_site(&trial, "San Diego", "CA").expect("match");
        assert_eq!(matched.facility, "UCSD");
    }

    #[test]
    fn test_unmatched_city_excluded() {
        let trial = trial_with_sites(vec![site("Boston", "MA", "MGH")]);
        assert!(match_site(&trial, "San Diego", "").is_none());
    }

    #[test]
    fn test_state_filter_applies_alongside_city() {
        let trial = trial_with_sites(vec![site("Springfield", "IL", "Memorial")]);
        assert!(match_site(&trial, "Springfield", "MA").is_none());
        assert!(match_site(&trial, "Springfield", "IL").is_some());
    }
}
