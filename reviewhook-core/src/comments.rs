//! Review comments proposed by the model: parsing, validation and
//! deduplication against what is already on the pull request.

use std::collections::HashSet;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewComment {
    pub body: String,
    pub path: String,
    pub line: u32,
}

/// How candidate comments are checked against earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeduplicationPolicy {
    /// Rely on the prompt telling the model not to repeat itself.
    PromptOnly,
    /// Additionally drop candidates whose normalised body matches an earlier
    /// comment or an earlier candidate.
    #[default]
    ExactMatch,
}

impl FromStr for DeduplicationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt-only" => Ok(DeduplicationPolicy::PromptOnly),
            "exact-match" => Ok(DeduplicationPolicy::ExactMatch),
            other => Err(format!(
                "unknown deduplication policy '{}', expected prompt-only or exact-match",
                other
            )),
        }
    }
}

/// Parse the model's text output into validated comments.
///
/// Only an output that is not a JSON array at all is an error; individual
/// elements missing `comment`, `filePath` or a positive `lineNumber` are
/// dropped.
pub fn parse_review_comments(response: &str) -> Result<Vec<ReviewComment>, PipelineError> {
    let json = strip_code_fence(response);

    let value: Value = serde_json::from_str(json)
        .map_err(|e| PipelineError::ModelResponseUnparseable(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(PipelineError::ModelResponseUnparseable(
            "top-level value is not an array".to_string(),
        ));
    };

    let total = items.len();
    let comments: Vec<ReviewComment> = items.iter().filter_map(validate_item).collect();

    if comments.len() < total {
        debug!(
            "Dropped {} of {} model comments with missing or invalid fields",
            total - comments.len(),
            total
        );
    }

    Ok(comments)
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn validate_item(item: &Value) -> Option<ReviewComment> {
    let body = non_empty_str(item.get("comment")?)?;
    let path = non_empty_str(item.get("filePath")?)?;
    let line = line_number(item.get("lineNumber")?)?;

    Some(ReviewComment {
        body: body.to_string(),
        path: path.to_string(),
        line,
    })
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn line_number(value: &Value) -> Option<u32> {
    let line = match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse::<u32>().ok()?,
        _ => return None,
    };
    (line > 0).then_some(line)
}

/// Case- and whitespace-insensitive form used for duplicate detection.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep only candidates that are new with respect to `previous_bodies`.
pub fn filter_new(
    candidates: Vec<ReviewComment>,
    previous_bodies: &[String],
    policy: DeduplicationPolicy,
) -> Vec<ReviewComment> {
    if policy == DeduplicationPolicy::PromptOnly {
        return candidates;
    }

    let mut seen: HashSet<String> = previous_bodies.iter().map(|b| normalize(b)).collect();

    candidates
        .into_iter()
        .filter(|candidate| {
            let fresh = seen.insert(normalize(&candidate.body));
            if !fresh {
                debug!(
                    "Dropping duplicate comment for {}:{}",
                    candidate.path, candidate.line
                );
            }
            fresh
        })
        .collect()
}
