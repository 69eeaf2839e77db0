//! Reviewer profiling: expertise level from the self-reported confidence
//! band, and a relevance score from how much of the assigned domain's
//! dimension set the review text actually touches. Pure function of
//! (text, confidence, snapshot).

use crate::ontology::{Dimension, OntologySnapshot};
use std::collections::HashSet;
use strsim::jaro_winkler;

const TERM_MATCH_THRESHOLD: f64 = 0.90;

const STOPWORDS: [&str; 18] = [
    "the", "is", "to", "of", "how", "with", "or", "a", "an", "on", "in", "its", "their", "much",
    "what", "for", "and", "relative",
];

#[derive(Debug, Clone)]
pub struct ReviewerProfile {
    pub expertise_level: String,
    /// Fraction of the domain's relevant dimensions covered by the text,
    /// in 0.0..=1.0.
    pub relevance_score: f64,
    /// Dimension ids the review text actually touches.
    pub covered_dimensions: Vec<String>,
}

pub struct ReviewerProfiler;

impl ReviewerProfiler {
    /// Profile a review against its assigned domain.
    ///
    /// The confidence score is validated (0-100) before the pipeline runs;
    /// band lookup here cannot fail for valid input.
    pub fn profile(
        text: &str,
        confidence_score: u8,
        domain_id: &str,
        snapshot: &OntologySnapshot,
    ) -> ReviewerProfile {
        let expertise_level = snapshot.expertise_level_for(confidence_score).id.clone();

        let relevant = snapshot.relevant_dimensions(domain_id);
        if relevant.is_empty() {
            return ReviewerProfile {
                expertise_level,
                relevance_score: 0.0,
                covered_dimensions: Vec::new(),
            };
        }

        let tokens = significant_tokens(text);
        let covered_dimensions: Vec<String> = relevant
            .iter()
            .filter(|dim| dimension_covered(dim, &tokens))
            .map(|dim| dim.id.clone())
            .collect();

        let relevance_score = covered_dimensions.len() as f64 / relevant.len() as f64;
        ReviewerProfile {
            expertise_level,
            relevance_score,
            covered_dimensions,
        }
    }
}

/// A dimension counts as covered when any significant term from its name or
/// description shows up in the review text (with light fuzzy matching so
/// "scalable" still hits "scalability").
fn dimension_covered(dimension: &Dimension, review_tokens: &HashSet<String>) -> bool {
    let mut terms = significant_tokens(&dimension.name);
    terms.extend(significant_tokens(&dimension.description));

    terms.iter().any(|term| {
        review_tokens.iter().any(|token| {
            token == term
                || (token.len() > 4
                    && term.len() > 4
                    && jaro_winkler(token, term) >= TERM_MATCH_THRESHOLD)
        })
    })
}

fn significant_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}
