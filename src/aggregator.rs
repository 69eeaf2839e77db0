//! Weighted aggregation of accepted review scores into per-dimension and
//! overall project scores. Review weight is relevance x confidence x a
//! human/synthetic discount; dimensions nobody scored are reported as
//! uncovered, never defaulted.

use crate::config::EngineConfig;
use crate::models::Review;
use crate::ontology::{Dimension, OntologySnapshot};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AggregatedScores {
    /// Weighted mean per dimension, one decimal, clamped to the 1-5 scale.
    pub dimension_scores: HashMap<String, f64>,
    /// Dimensions with no contributing review, in deterministic order.
    pub uncovered_dimensions: Vec<String>,
    /// Unweighted mean of the covered dimensions; 0.0 when nothing is
    /// covered (the synthesizer states that case explicitly).
    pub overall_score: f64,
}

impl AggregatedScores {
    pub fn is_empty(&self) -> bool {
        self.dimension_scores.is_empty()
    }
}

pub struct ScoreAggregator {
    synthetic_discount: f64,
}

impl ScoreAggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            synthetic_discount: config.synthetic_discount,
        }
    }

    pub fn aggregate(&self, accepted: &[&Review], snapshot: &OntologySnapshot) -> AggregatedScores {
        // dimension -> (weighted sum, total weight, plain sum, count)
        let mut buckets: BTreeMap<&str, (f64, f64, f64, usize)> = BTreeMap::new();

        for review in accepted {
            let relevance = review.annotation.relevance_score.unwrap_or(0.0);
            let confidence = f64::from(review.confidence_score) / 100.0;
            let discount = if review.is_artificial {
                self.synthetic_discount
            } else {
                1.0
            };
            let weight = relevance * confidence * discount;

            for (dimension, score) in &review.annotation.sentiment_scores {
                let entry = buckets.entry(dimension.as_str()).or_insert((0.0, 0.0, 0.0, 0));
                entry.0 += score * weight;
                entry.1 += weight;
                entry.2 += score;
                entry.3 += 1;
            }
        }

        let mut dimension_scores = HashMap::new();
        for (dimension, (weighted_sum, total_weight, plain_sum, count)) in &buckets {
            // Zero total weight can only come from zero-relevance reviews;
            // fall back to the unweighted mean rather than dividing by zero.
            let mean = if *total_weight > 0.0 {
                weighted_sum / total_weight
            } else {
                plain_sum / *count as f64
            };
            dimension_scores.insert(dimension.to_string(), round1(mean.clamp(Dimension::SCALE_MIN, Dimension::SCALE_MAX)));
        }

        let uncovered_dimensions: Vec<String> = snapshot
            .dimensions()
            .filter(|d| !dimension_scores.contains_key(&d.id))
            .map(|d| d.id.clone())
            .collect();

        let overall_score = if dimension_scores.is_empty() {
            0.0
        } else {
            let sum: f64 = dimension_scores.values().sum();
            round1((sum / dimension_scores.len() as f64).clamp(Dimension::SCALE_MIN, Dimension::SCALE_MAX))
        };

        debug!(
            "Aggregated {} dimensions, {} uncovered, overall {}",
            dimension_scores.len(),
            uncovered_dimensions.len(),
            overall_score
        );

        AggregatedScores {
            dimension_scores,
            uncovered_dimensions,
            overall_score,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Review, ReviewStatus};
    use crate::ontology::OntologySnapshot;

    fn review(domain: &str, confidence: i64, relevance: f64, scores: &[(&str, f64)], artificial: bool) -> Review {
        let mut r = Review::new("proj_1", "Ada", "body", confidence).unwrap();
        r.status = ReviewStatus::Accepted;
        r.is_artificial = artificial;
        r.annotation.domain = Some(domain.to_string());
        r.annotation.relevance_score = Some(relevance);
        r.annotation.sentiment_scores =
            scores.iter().map(|(d, s)| (d.to_string(), *s)).collect();
        r
    }

    fn aggregator() -> ScoreAggregator {
        ScoreAggregator::new(&EngineConfig::default())
    }

    #[test]
    fn weighted_mean_favors_confident_relevant_reviews() {
        let snapshot = OntologySnapshot::builtin();
        let strong = review("technical", 100, 1.0, &[("impact", 5.0)], false);
        let weak = review("technical", 25, 0.4, &[("impact", 1.0)], false);
        let result = aggregator().aggregate(&[&strong, &weak], &snapshot);
        // Weight 1.0 vs 0.1: mean = (5*1.0 + 1*0.1) / 1.1 = 4.64 -> 4.6
        assert_eq!(result.dimension_scores["impact"], 4.6);
    }

    #[test]
    fn synthetic_discount_pulls_score_toward_human_reviews() {
        let snapshot = OntologySnapshot::builtin();
        let human_low = review("technical", 80, 0.8, &[("impact", 2.0)], false);
        let high_as_synthetic = review("technical", 80, 0.8, &[("impact", 5.0)], true);
        let high_as_human = review("technical", 80, 0.8, &[("impact", 5.0)], false);

        let with_synthetic = aggregator().aggregate(&[&human_low, &high_as_synthetic], &snapshot);
        let all_human = aggregator().aggregate(&[&human_low, &high_as_human], &snapshot);

        assert!(
            with_synthetic.dimension_scores["impact"] <= all_human.dimension_scores["impact"],
            "synthetic high score must not outweigh the same score from a human"
        );
    }

    #[test]
    fn unscored_dimensions_are_uncovered_not_defaulted() {
        let snapshot = OntologySnapshot::builtin();
        let only_impact = review("clinical", 90, 1.0, &[("impact", 4.0)], false);
        let result = aggregator().aggregate(&[&only_impact], &snapshot);
        assert_eq!(result.dimension_scores.len(), 1);
        assert_eq!(result.uncovered_dimensions.len(), 5);
        assert!(!result.dimension_scores.contains_key("scalability"));
    }

    #[test]
    fn no_accepted_reviews_means_everything_uncovered() {
        let snapshot = OntologySnapshot::builtin();
        let result = aggregator().aggregate(&[], &snapshot);
        assert!(result.is_empty());
        assert_eq!(result.uncovered_dimensions.len(), 6);
        assert_eq!(result.overall_score, 0.0);
    }

    #[test]
    fn scores_stay_inside_scale() {
        let snapshot = OntologySnapshot::builtin();
        let r = review("technical", 100, 1.0, &[("impact", 5.0), ("innovation", 1.0)], false);
        let result = aggregator().aggregate(&[&r], &snapshot);
        for score in result.dimension_scores.values() {
            assert!((1.0..=5.0).contains(score));
        }
        assert!((1.0..=5.0).contains(&result.overall_score));
    }

    #[test]
    fn overall_is_unweighted_mean_of_covered_dimensions() {
        let snapshot = OntologySnapshot::builtin();
        let r = review("technical", 100, 1.0, &[("impact", 5.0), ("innovation", 2.0)], false);
        let result = aggregator().aggregate(&[&r], &snapshot);
        assert_eq!(result.overall_score, 3.5);
    }

    #[test]
    fn zero_relevance_reviews_fall_back_to_plain_mean() {
        let snapshot = OntologySnapshot::builtin();
        let r = review("technical", 50, 0.0, &[("impact", 4.0)], false);
        let result = aggregator().aggregate(&[&r], &snapshot);
        assert_eq!(result.dimension_scores["impact"], 4.0);
    }
}
