//! Match evaluator: applies a filter predicate to one candidate.
//!
//! Pure, no I/O. Each present predicate field is evaluated independently and
//! AND-combined. A field missing on the candidate fails that clause -
//! unknown data never satisfies a constraint.

use chrono::{DateTime, Utc};

use crate::filter::FilterPredicate;
use crate::models::Candidate;

/// Evaluate `predicate` against `candidate` as of `now`.
///
/// `now` anchors the `completion_days_max` clause; everything else is
/// time-independent.
pub fn matches(predicate: &FilterPredicate, candidate: &Candidate, now: DateTime<Utc>) -> bool {
    if let Some(phase) = predicate.phase {
        if candidate.phase != Some(phase) {
            return false;
        }
    }

    if let Some(area) = &predicate.therapeutic_area {
        match &candidate.therapeutic_area {
            Some(candidate_area) => {
                if !candidate_area
                    .to_lowercase()
                    .contains(&area.to_lowercase())
                {
                    return false;
                }
            }
            None => return false,
        }
    }

    if let Some(min) = predicate.market_cap_min {
        match candidate.market_cap {
            Some(cap) if cap >= min => {}
            _ => return false,
        }
    }

    if let Some(max) = predicate.market_cap_max {
        match candidate.market_cap {
            Some(cap) if cap < max => {}
            _ => return false,
        }
    }

    if let Some(max_days) = predicate.completion_days_max {
        match candidate.completion_date {
            Some(date) => {
                let days = (date - now.date_naive()).num_days();
                // Past catalysts are not alertable.
                if days < 0 || days > max_days {
                    return false;
                }
            }
            None => return false,
        }
    }

    if let Some(sponsors) = &predicate.sponsor_in {
        match &candidate.sponsor {
            Some(sponsor) => {
                let sponsor = sponsor.to_lowercase();
                if !sponsors.iter().any(|s| s.to_lowercase() == sponsor) {
                    return false;
                }
            }
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn candidate() -> Candidate {
        let now = Utc::now();
        Candidate {
            id: Uuid::new_v4(),
            ticker: Some("ACME".to_string()),
            sponsor: Some("Acme Bio".to_string()),
            phase: Some(3),
            therapeutic_area: Some("Oncology".to_string()),
            market_cap: Some(1_500_000_000),
            completion_date: Some(now.date_naive() + Duration::days(60)),
            enrollment: Some(300),
            nct_id: Some("NCT00000001".to_string()),
            current_price: Some(8.25),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_phase_and_cap_match() {
        let predicate = FilterPredicate::new()
            .with_phase(3)
            .with_market_cap_max(2_000_000_000);
        assert!(matches(&predicate, &candidate(), Utc::now()));
    }

    #[test]
    fn test_wrong_phase_fails() {
        let predicate = FilterPredicate::new()
            .with_phase(3)
            .with_market_cap_max(2_000_000_000);
        let mut c = candidate();
        c.phase = Some(2);
        assert!(!matches(&predicate, &c, Utc::now()));
    }

    #[test]
    fn test_missing_market_cap_fails_cap_clause() {
        let predicate = FilterPredicate::new().with_market_cap_max(2_000_000_000);
        let mut c = candidate();
        c.market_cap = None;
        assert!(!matches(&predicate, &c, Utc::now()));
    }

    #[test]
    fn test_market_cap_max_is_exclusive() {
        let predicate = FilterPredicate::new().with_market_cap_max(1_500_000_000);
        assert!(!matches(&predicate, &candidate(), Utc::now()));

        let predicate = FilterPredicate::new().with_market_cap_max(1_500_000_001);
        assert!(matches(&predicate, &candidate(), Utc::now()));
    }

    #[test]
    fn test_market_cap_min_is_inclusive() {
        let predicate = FilterPredicate::new().with_market_cap_min(1_500_000_000);
        assert!(matches(&predicate, &candidate(), Utc::now()));

        let predicate = FilterPredicate::new().with_market_cap_min(1_500_000_001);
        assert!(!matches(&predicate, &candidate(), Utc::now()));
    }

    #[test]
    fn test_therapeutic_area_substring_case_insensitive() {
        let predicate = FilterPredicate::new().with_therapeutic_area("ONCO");
        assert!(matches(&predicate, &candidate(), Utc::now()));

        let predicate = FilterPredicate::new().with_therapeutic_area("cardiology");
        assert!(!matches(&predicate, &candidate(), Utc::now()));
    }

    #[test]
    fn test_sponsor_in_case_insensitive_exact() {
        let predicate = FilterPredicate::new()
            .with_sponsors(vec!["ACME BIO".to_string(), "Other Pharma".to_string()]);
        assert!(matches(&predicate, &candidate(), Utc::now()));

        // Substring is not enough for sponsor matching.
        let predicate = FilterPredicate::new().with_sponsors(vec!["Acme".to_string()]);
        assert!(!matches(&predicate, &candidate(), Utc::now()));
    }

    #[test]
    fn test_missing_sponsor_fails_sponsor_clause() {
        let predicate = FilterPredicate::new().with_sponsors(vec!["Acme Bio".to_string()]);
        let mut c = candidate();
        c.sponsor = None;
        assert!(!matches(&predicate, &c, Utc::now()));
    }

    #[test]
    fn test_completion_days_window() {
        let now = Utc::now();
        let predicate = FilterPredicate::new().with_completion_days_max(90);
        assert!(matches(&predicate, &candidate(), now));

        let predicate = FilterPredicate::new().with_completion_days_max(30);
        assert!(!matches(&predicate, &candidate(), now));
    }

    #[test]
    fn test_past_completion_date_fails() {
        let now = Utc::now();
        let predicate = FilterPredicate::new().with_completion_days_max(90);
        let mut c = candidate();
        c.completion_date = Some(now.date_naive() - Duration::days(5));
        assert!(!matches(&predicate, &c, now));
    }

    #[test]
    fn test_clauses_are_conjunctive() {
        let predicate = FilterPredicate::new()
            .with_phase(3)
            .with_therapeutic_area("oncology")
            .with_market_cap_max(2_000_000_000);
        let mut c = candidate();
        assert!(matches(&predicate, &c, Utc::now()));

        // One failing clause fails the whole predicate.
        c.therapeutic_area = Some("immunology".to_string());
        assert!(!matches(&predicate, &c, Utc::now()));
    }
}
