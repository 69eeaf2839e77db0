//! Feedback synthesis: the final report assembled from aggregated scores
//! and per-domain review groups. Every sentence traces back to a score or
//! an insight; nothing is invented independently of the data.

use crate::aggregator::AggregatedScores;
use crate::config::EngineConfig;
use crate::models::{DomainInsight, FeedbackReport, Project, Review};
use crate::ontology::OntologySnapshot;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// Filler appended after domain-specific recommendations when the list has
/// room left.
const GENERAL_RECOMMENDATIONS: [&str; 3] = [
    "Validate regulatory and data-privacy requirements before a wider rollout",
    "Add a security review covering authentication and data handling",
    "Collect structured user feedback during the next iteration to confirm assumptions",
];

pub struct FeedbackSynthesizer {
    concern_threshold: f64,
    strength_threshold: f64,
    weakness_threshold: f64,
    max_recommendations: usize,
}

impl FeedbackSynthesizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            concern_threshold: config.concern_threshold,
            strength_threshold: config.strength_threshold,
            weakness_threshold: config.weakness_threshold,
            max_recommendations: config.max_recommendations,
        }
    }

    pub fn synthesize(
        &self,
        project: &Project,
        accepted: &[&Review],
        aggregated: &AggregatedScores,
        snapshot: &OntologySnapshot,
    ) -> FeedbackReport {
        let insights = self.domain_insights(accepted, snapshot);
        let recommendations = self.recommendations(aggregated, &insights, snapshot);
        let narrative = self.narrative(project, accepted, aggregated, &insights, &recommendations, snapshot);

        let human = accepted.iter().filter(|r| !r.is_artificial).count();
        let synthetic = accepted.len() - human;

        let mut report = FeedbackReport::new(&project.project_id);
        report.feedback_scores = aggregated.dimension_scores.clone();
        report.uncovered_dimensions = aggregated.uncovered_dimensions.clone();
        report.overall_score = aggregated.overall_score;
        report.final_review = narrative;
        report.domain_insights = insights;
        report.recommendations = recommendations;
        report.metadata.insert("accepted_reviews".to_string(), accepted.len().into());
        report.metadata.insert("human_reviews".to_string(), human.into());
        report.metadata.insert("artificial_reviews".to_string(), synthetic.into());
        report
    }

    /// Group accepted reviews by assigned domain; per domain, strengths are
    /// the dimensions averaging at or above the strength threshold and
    /// concerns those at or below the weakness threshold.
    fn domain_insights(&self, accepted: &[&Review], snapshot: &OntologySnapshot) -> Vec<DomainInsight> {
        let mut by_domain: BTreeMap<&str, Vec<&Review>> = BTreeMap::new();
        for review in accepted {
            if let Some(domain) = review.annotation.domain.as_deref() {
                by_domain.entry(domain).or_default().push(review);
            }
        }

        by_domain
            .into_iter()
            .map(|(domain, reviews)| {
                let domain_name = snapshot
                    .domain(domain)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| domain.to_string());
                let averages = dimension_averages(&reviews);

                let key_strengths: Vec<String> = averages
                    .iter()
                    .filter(|(_, avg)| **avg >= self.strength_threshold)
                    .sorted_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal))
                    .take(3)
                    .map(|(dim, _)| display_name(dim, snapshot))
                    .collect();

                let concerns: Vec<String> = averages
                    .iter()
                    .filter(|(_, avg)| **avg <= self.weakness_threshold)
                    .sorted_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .take(2)
                    .map(|(dim, _)| display_name(dim, snapshot))
                    .collect();

                DomainInsight {
                    domain: domain.to_string(),
                    domain_name,
                    review_count: reviews.len(),
                    synthetic_count: reviews.iter().filter(|r| r.is_artificial).count(),
                    key_strengths,
                    concerns,
                }
            })
            .collect()
    }

    /// Domain-specific recommendations first (worst dimension first), then
    /// domain concern callouts, then general filler, capped.
    fn recommendations(
        &self,
        aggregated: &AggregatedScores,
        insights: &[DomainInsight],
        snapshot: &OntologySnapshot,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        let low_dimensions = aggregated
            .dimension_scores
            .iter()
            .filter(|(_, score)| **score < self.concern_threshold)
            .sorted_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        for (dimension, score) in low_dimensions {
            recommendations.push(dimension_recommendation(dimension, *score, snapshot));
        }

        for insight in insights {
            if !insight.concerns.is_empty() {
                recommendations.push(format!(
                    "Address {} concerns raised by reviewers: {}",
                    insight.domain_name.to_lowercase(),
                    insight.concerns.join(", ")
                ));
            }
        }

        for general in GENERAL_RECOMMENDATIONS {
            if recommendations.len() >= self.max_recommendations {
                break;
            }
            recommendations.push(general.to_string());
        }

        recommendations.truncate(self.max_recommendations);
        recommendations
    }

    fn narrative(
        &self,
        project: &Project,
        accepted: &[&Review],
        aggregated: &AggregatedScores,
        insights: &[DomainInsight],
        recommendations: &[String],
        snapshot: &OntologySnapshot,
    ) -> String {
        let human = accepted.iter().filter(|r| !r.is_artificial).count();
        let synthetic = accepted.len() - human;

        let mut sections = Vec::new();

        // Overview
        let mut overview = format!(
            "# Multi-Perspective Review: {}\n\n## Overview\n\n",
            project.name
        );
        if aggregated.is_empty() {
            overview.push_str(&format!(
                "No accepted review scored any evaluation dimension for this project \
                 ({} review(s) considered). All dimensions are reported as uncovered; \
                 the project needs additional qualified reviews before a score can be given.",
                accepted.len()
            ));
        } else {
            overview.push_str(&format!(
                "Based on {} accepted review(s) ({} human, {} AI-generated) across {} domain \
                 perspective(s), the project scores {:.1}/5.0 overall.",
                accepted.len(),
                human,
                synthetic,
                insights.len(),
                aggregated.overall_score
            ));
        }
        sections.push(overview);

        // Strengths
        let strengths: Vec<(String, f64)> = aggregated
            .dimension_scores
            .iter()
            .filter(|(_, s)| **s >= self.strength_threshold)
            .sorted_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(d, s)| (display_name(d, snapshot), *s))
            .collect();
        let mut strengths_text = "## Strengths\n\n".to_string();
        if strengths.is_empty() {
            strengths_text.push_str("No dimension reached the strength threshold.");
        } else {
            for (name, score) in &strengths {
                strengths_text.push_str(&format!("- {} ({:.1}/5.0)\n", name, score));
            }
        }
        sections.push(strengths_text);

        // Weaknesses and coverage gaps
        let weaknesses: Vec<(String, f64)> = aggregated
            .dimension_scores
            .iter()
            .filter(|(_, s)| **s < self.concern_threshold)
            .sorted_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(d, s)| (display_name(d, snapshot), *s))
            .collect();
        let mut weaknesses_text = "## Weaknesses\n\n".to_string();
        if weaknesses.is_empty() {
            weaknesses_text.push_str("No scored dimension fell below the concern threshold.\n");
        } else {
            for (name, score) in &weaknesses {
                weaknesses_text.push_str(&format!("- {} ({:.1}/5.0)\n", name, score));
            }
        }
        if !aggregated.uncovered_dimensions.is_empty() {
            let names: Vec<String> = aggregated
                .uncovered_dimensions
                .iter()
                .map(|d| display_name(d, snapshot))
                .collect();
            weaknesses_text.push_str(&format!(
                "\nUncovered dimensions (no accepted review scored them): {}.",
                names.join(", ")
            ));
        }
        sections.push(weaknesses_text);

        // Domain perspectives
        if !insights.is_empty() {
            let mut domains_text = "## Domain Perspectives\n\n".to_string();
            for insight in insights {
                domains_text.push_str(&format!(
                    "- {}: {} review(s), {} AI-generated.",
                    insight.domain_name, insight.review_count, insight.synthetic_count
                ));
                if !insight.key_strengths.is_empty() {
                    domains_text.push_str(&format!(" Strengths: {}.", insight.key_strengths.join(", ")));
                }
                if !insight.concerns.is_empty() {
                    domains_text.push_str(&format!(" Concerns: {}.", insight.concerns.join(", ")));
                }
                domains_text.push('\n');
            }
            sections.push(domains_text);
        }

        // Recommendations
        let mut rec_text = "## Recommendations\n\n".to_string();
        for (i, rec) in recommendations.iter().enumerate() {
            rec_text.push_str(&format!("{}. {}\n", i + 1, rec));
        }
        sections.push(rec_text);

        sections.join("\n")
    }
}

fn dimension_averages(reviews: &[&Review]) -> HashMap<String, f64> {
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    for review in reviews {
        for (dimension, score) in &review.annotation.sentiment_scores {
            let entry = sums.entry(dimension.clone()).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(dim, (sum, count))| (dim, sum / count as f64))
        .collect()
}

fn display_name(dimension_id: &str, snapshot: &OntologySnapshot) -> String {
    snapshot
        .dimension(dimension_id)
        .map(|d| d.name.clone())
        .unwrap_or_else(|| dimension_id.replace('_', " "))
}

fn dimension_recommendation(dimension_id: &str, score: f64, snapshot: &OntologySnapshot) -> String {
    let action = match dimension_id {
        "technical_feasibility" => "De-risk the technical approach with a focused prototype".to_string(),
        "implementation_complexity" => "Simplify the implementation approach for easier adoption".to_string(),
        "scalability" => "Develop a clear scaling strategy".to_string(),
        "return_on_investment" => "Clarify the value proposition and ROI metrics".to_string(),
        "innovation" => "Sharpen what differentiates this from existing solutions".to_string(),
        "impact" => "Strengthen the evidence for real-world impact".to_string(),
        other => format!("Improve {}", display_name(other, snapshot).to_lowercase()),
    };
    format!("{} (currently {:.1}/5.0)", action, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ScoreAggregator;
    use crate::models::{Review, ReviewStatus};

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

    fn synthesize(reviews: Vec<Review>) -> FeedbackReport {
        let snapshot = OntologySnapshot::builtin();
        let config = EngineConfig::default();
        let project = Project::new("TriageBot", "AI triage", "intake flow");
        let refs: Vec<&Review> = reviews.iter().collect();
        let aggregated = ScoreAggregator::new(&config).aggregate(&refs, &snapshot);
        FeedbackSynthesizer::new(&config).synthesize(&project, &refs, &aggregated, &snapshot)
    }

    #[test]
    fn insights_count_humans_and_synthetics_per_domain() {
        let report = synthesize(vec![
            review("clinical", 90, 1.0, &[("impact", 4.5)], false),
            review("clinical", 90, 0.8, &[("impact", 4.0)], true),
            review("technical", 80, 0.7, &[("scalability", 2.0)], false),
        ]);
        assert_eq!(report.domain_insights.len(), 2);
        let clinical = report.domain_insights.iter().find(|i| i.domain == "clinical").unwrap();
        assert_eq!(clinical.review_count, 2);
        assert_eq!(clinical.synthetic_count, 1);
        assert!(clinical.key_strengths.contains(&"Impact".to_string()));
    }

    #[test]
    fn low_dimensions_drive_ranked_recommendations() {
        let report = synthesize(vec![
            review("technical", 90, 1.0, &[("scalability", 1.5), ("innovation", 2.5), ("impact", 4.5)], false),
        ]);
        // Worst dimension first.
        assert!(report.recommendations[0].contains("scaling strategy"));
        assert!(report.recommendations[1].contains("differentiates"));
        assert!(report.recommendations.len() <= 5);
    }

    #[test]
    fn general_recommendations_only_fill_remaining_slots() {
        let report = synthesize(vec![
            review("technical", 90, 1.0, &[("impact", 5.0)], false),
        ]);
        // No concerns: the list is entirely general filler.
        assert!(!report.recommendations.is_empty());
        assert!(report.recommendations[0].contains("regulatory"));
    }

    #[test]
    fn narrative_names_uncovered_dimensions() {
        let report = synthesize(vec![
            review("clinical", 90, 1.0, &[("impact", 4.0)], false),
        ]);
        assert!(report.final_review.contains("Uncovered dimensions"));
        assert!(report.final_review.contains("Scalability"));
    }

    #[test]
    fn empty_aggregation_is_stated_not_scored() {
        let report = synthesize(vec![]);
        assert!(report.feedback_scores.is_empty());
        assert_eq!(report.uncovered_dimensions.len(), 6);
        assert!(report.final_review.contains("No accepted review scored"));
    }

    #[test]
    fn every_narrative_claim_traces_to_scores() {
        let report = synthesize(vec![
            review("business", 85, 1.0, &[("return_on_investment", 4.2), ("scalability", 2.1)], false),
        ]);
        assert!(report.final_review.contains("Return on Investment (4.2/5.0)"));
        assert!(report.final_review.contains("Scalability (2.1/5.0)"));
    }
}
