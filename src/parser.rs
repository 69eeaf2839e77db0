//! Parsing of generative-backend replies into structured scores. The
//! parser returns a tagged result and never lets a malformed reply escape
//! the generation step as an error.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref CONFIDENCE_LINE: Regex = Regex::new(r"(?im)^\s*CONFIDENCE:\s*(\d{1,3})").unwrap();
    static ref REVIEW_SECTION: Regex =
        Regex::new(r"(?is)REVIEW:\s*(.+?)\s*(?:CONFIDENCE:|SCORES:|$)").unwrap();
}

/// Outcome of extracting dimension scores from a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreParse {
    /// Every expected dimension was scored.
    Parsed(HashMap<String, f64>),
    /// Some expected dimensions were missing from the reply.
    PartiallyParsed {
        scores: HashMap<String, f64>,
        missing: Vec<String>,
    },
    /// No usable score object found.
    Unparseable,
}

impl ScoreParse {
    /// Scores with every missing dimension defaulted to the scale midpoint.
    /// `Unparseable` yields the midpoint for every expected dimension.
    pub fn with_midpoint_defaults(self, expected: &[String], midpoint: f64) -> HashMap<String, f64> {
        match self {
            ScoreParse::Parsed(scores) => scores,
            ScoreParse::PartiallyParsed { mut scores, missing } => {
                for dim in missing {
                    scores.insert(dim, midpoint);
                }
                scores
            }
            ScoreParse::Unparseable => {
                expected.iter().map(|d| (d.clone(), midpoint)).collect()
            }
        }
    }

    pub fn missing(&self) -> &[String] {
        match self {
            ScoreParse::PartiallyParsed { missing, .. } => missing,
            _ => &[],
        }
    }
}

/// A generated review reply split into its parts.
#[derive(Debug, Clone)]
pub struct ParsedReviewReply {
    pub review_text: String,
    pub confidence: Option<u8>,
    pub scores: ScoreParse,
}

/// Parse a reply in the REVIEW:/CONFIDENCE:/SCORES: layout. Tolerates
/// missing sections: absent review text falls back to the whole reply,
/// absent confidence is left for the caller to default.
pub fn parse_review_reply(reply: &str, expected_dimensions: &[String]) -> ParsedReviewReply {
    let review_text = REVIEW_SECTION
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| reply.trim().to_string());

    let confidence = CONFIDENCE_LINE
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .filter(|n| *n <= 100)
        .map(|n| n as u8);

    ParsedReviewReply {
        review_text,
        confidence,
        scores: parse_score_block(reply, expected_dimensions),
    }
}

/// Extract a JSON score object from anywhere in the text and match it
/// against the expected dimension set. Scores clamp into [1.0, 5.0].
pub fn parse_score_block(text: &str, expected_dimensions: &[String]) -> ScoreParse {
    let Some(object) = find_json_object(text) else {
        return ScoreParse::Unparseable;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(object) else {
        return ScoreParse::Unparseable;
    };
    let Some(map) = value.as_object() else {
        return ScoreParse::Unparseable;
    };

    let mut scores = HashMap::new();
    for dim in expected_dimensions {
        if let Some(score) = map.get(dim).and_then(json_number) {
            scores.insert(dim.clone(), score.clamp(1.0, 5.0));
        }
    }

    if scores.is_empty() {
        return ScoreParse::Unparseable;
    }

    let missing: Vec<String> = expected_dimensions
        .iter()
        .filter(|d| !scores.contains_key(*d))
        .cloned()
        .collect();

    if missing.is_empty() {
        ScoreParse::Parsed(scores)
    } else {
        ScoreParse::PartiallyParsed { scores, missing }
    }
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        // Models sometimes quote their numbers.
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First balanced `{...}` object in the text, skipping prose and fences.
fn find_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
