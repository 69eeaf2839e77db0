//! Acceptance filter: threshold policy deciding whether a profiled review
//! contributes to aggregation. Pure decision function; the pipeline stamps
//! the outcome onto the review.

use crate::config::EngineConfig;
use crate::models::RejectReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(Vec<RejectReason>),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

pub struct AcceptanceFilter {
    min_relevance: f64,
    min_confidence: u8,
}

impl AcceptanceFilter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_relevance: config.min_relevance,
            min_confidence: config.min_confidence,
        }
    }

    /// Reject when relevance or confidence sits below its floor; both
    /// reasons are reported when both apply.
    pub fn decide(&self, relevance_score: f64, confidence_score: u8) -> Decision {
        let mut reasons = Vec::new();
        if relevance_score < self.min_relevance {
            reasons.push(RejectReason::LowRelevance);
        }
        if confidence_score < self.min_confidence {
            reasons.push(RejectReason::LowConfidence);
        }
        if reasons.is_empty() {
            Decision::Accepted
        } else {
            Decision::Rejected(reasons)
        }
    }
}
