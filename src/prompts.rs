//! Prompt construction. Every prompt is assembled from the ontology
//! snapshot at call time (domain descriptions, keyword bags, dimension
//! scales), so new domains and dimensions flow into generation without
//! code changes.

use crate::models::Project;
use crate::ontology::{Dimension, Domain};

fn dimension_block(dimensions: &[&Dimension]) -> String {
    let mut parts = Vec::new();
    for dim in dimensions {
        parts.push(format!("{} ({}):\n{}", dim.name, dim.id, dim.description));
        let mut scale_lines = Vec::new();
        for point in 1..=5u8 {
            if let Some(meaning) = dim.scale.get(&point) {
                scale_lines.push(format!("  {}: {}", point, meaning));
            }
        }
        parts.push(format!("Scale:\n{}", scale_lines.join("\n")));
    }
    parts.join("\n")
}

fn score_template(dimensions: &[&Dimension]) -> String {
    let fields: Vec<String> = dimensions
        .iter()
        .map(|d| format!("  \"{}\": 3.0", d.id))
        .collect();
    format!("{{\n{}\n}}", fields.join(",\n"))
}

/// Prompt asking the backend to review a project from one domain's
/// perspective, scoring the domain's relevant dimensions.
pub fn artificial_review_prompt(
    project: &Project,
    domain: &Domain,
    dimensions: &[&Dimension],
) -> String {
    format!(
        r#"You are an expert reviewer with deep expertise in {domain_name}.

Domain context: {domain_desc}
Your expertise encompasses: {keywords}

You are reviewing a hackathon project:

Project: {project_name}
Description: {description}
Work done: {work_done}

Write a detailed review of this project from your {domain_name} perspective.
Your review should:
1. Assess the project from your specific domain perspective
2. Consider practical implications for {domain_name} stakeholders
3. Provide constructive criticism and suggestions
4. Be thorough but concise (around 300-400 words)

Focus on these evaluation dimensions and their scales:
{dimension_block}

Also provide a confidence score between 0-100 reflecting how confident you
are in your assessment, and a numeric score for each dimension above.

Structure your response exactly as:
REVIEW: [your detailed review text]
CONFIDENCE: [0-100]
SCORES: {score_template}"#,
        domain_name = domain.name,
        domain_desc = domain.description,
        keywords = domain.keywords.join(", "),
        project_name = project.name,
        description = project.description,
        work_done = project.work_done,
        dimension_block = dimension_block(dimensions),
        score_template = score_template(dimensions),
    )
}

/// Prompt asking the backend to rate an existing review's project on each
/// of the given dimensions, returning bare JSON.
pub fn score_extraction_prompt(review_text: &str, dimensions: &[&Dimension]) -> String {
    format!(
        r#"Analyze the following project review and rate what it indicates about
the project on each evaluation dimension.

Review text:
{review_text}

Evaluation dimensions:
{dimension_block}

For each dimension, give a score from 1.0 to 5.0 based on what the review
indicates. If a dimension is not addressed, infer a reasonable score from
the overall tone.

You MUST respond with ONLY a valid JSON object in this exact format:
{score_template}

Replace the example values with your actual ratings. Use only numbers
between 1.0 and 5.0. Do not include any other text."#,
        review_text = review_text,
        dimension_block = dimension_block(dimensions),
        score_template = score_template(dimensions),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use crate::ontology::OntologySnapshot;

    #[test]
    fn review_prompt_embeds_ontology_and_project() {
        let snapshot = OntologySnapshot::builtin();
        let domain = snapshot.domain("clinical").unwrap();
        let dims = snapshot.relevant_dimensions("clinical");
        let project = Project::new("TriageBot", "AI triage assistant", "Built the intake flow");

        let prompt = artificial_review_prompt(&project, domain, &dims);
        assert!(prompt.contains("Clinical"));
        assert!(prompt.contains("TriageBot"));
        assert!(prompt.contains("Built the intake flow"));
        assert!(prompt.contains("\"impact\": 3.0"));
        assert!(prompt.contains("Transformative impact"));
        assert!(prompt.contains("CONFIDENCE:"));
    }

    #[test]
    fn score_prompt_lists_every_requested_dimension() {
        let snapshot = OntologySnapshot::builtin();
        let dims = snapshot.relevant_dimensions("business");
        let prompt = score_extraction_prompt("great market fit", &dims);
        for dim in &dims {
            assert!(prompt.contains(&format!("\"{}\"", dim.id)));
        }
    }
}
