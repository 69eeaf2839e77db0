//! Coverage gap detection: which mandatory perspectives have no accepted
//! review yet. Deterministic given its inputs.

use crate::config::EngineConfig;
use crate::models::Review;
use crate::ontology::OntologySnapshot;
use std::collections::BTreeSet;

/// The configured core-domain set, defaulting to every ontology domain.
pub fn core_domains(config: &EngineConfig, snapshot: &OntologySnapshot) -> BTreeSet<String> {
    match &config.core_domains {
        Some(list) => list.iter().cloned().collect(),
        None => snapshot.domain_ids().into_iter().collect(),
    }
}

/// Core domains with no accepted review (human or synthetic) assigned.
pub fn gaps(accepted_reviews: &[&Review], core: &BTreeSet<String>) -> BTreeSet<String> {
    let covered: BTreeSet<&str> = accepted_reviews
        .iter()
        .filter_map(|r| r.annotation.domain.as_deref())
        .collect();

    core.iter()
        .filter(|domain| !covered.contains(domain.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Review, ReviewStatus};

    fn accepted_review(domain: &str) -> Review {
        let mut review = Review::new("proj_1", "Ada", "text body", 80).unwrap();
        review.status = ReviewStatus::Accepted;
        review.annotation.domain = Some(domain.to_string());
        review
    }

    #[test]
    fn all_core_domains_missing_without_reviews() {
        let core: BTreeSet<String> =
            ["technical", "clinical", "business"].iter().map(|s| s.to_string()).collect();
        let result = gaps(&[], &core);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn covered_domains_are_not_gaps() {
        let core: BTreeSet<String> =
            ["technical", "clinical", "business"].iter().map(|s| s.to_string()).collect();
        let clinical = accepted_review("clinical");
        let result = gaps(&[&clinical], &core);
        assert!(!result.contains("clinical"));
        assert!(result.contains("technical"));
        assert!(result.contains("business"));
    }

    #[test]
    fn non_core_coverage_changes_nothing() {
        let core: BTreeSet<String> = ["technical"].iter().map(|s| s.to_string()).collect();
        let design = accepted_review("design");
        let result = gaps(&[&design], &core);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn default_core_set_is_every_domain() {
        let snapshot = crate::ontology::OntologySnapshot::builtin();
        let core = core_domains(&EngineConfig::default(), &snapshot);
        assert_eq!(core.len(), 6);
    }
}
