//! Pulls the structured result out of the format stage's free text.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("valid regex")
});

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Could not extract JSON from agent output")]
    JsonNotFound,

    #[error("malformed JSON in agent output: {0}")]
    MalformedJson(String),
}

/// Final answer returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub diagnosis: String,
    #[serde(default, deserialize_with = "text")]
    pub cost: String,
    #[serde(default, deserialize_with = "text_list")]
    pub parts: Vec<String>,
    /// Always rebuilt from `parts`; whatever the model wrote is ignored.
    #[serde(default, skip_deserializing)]
    pub links: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "text")]
    pub guide: String,
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_text(Value::deserialize(d)?))
}

fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(value_to_text).collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        other => vec![other.to_string()],
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Top-level `{...}` spans, skipping braces inside JSON strings.
fn top_level_objects(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, i + 1));
                }
            }
            '"' if depth > 0 => in_string = true,
            _ => {}
        }
    }
    spans
}

/// The JSON object text in `output`.
///
/// A fenced ```json block wins; otherwise the output must end with an object.
pub fn find_json_object(output: &str) -> Result<&str, ExtractError> {
    if let Some(caps) = FENCED_JSON.captures(output) {
        if let Some(m) = caps.get(1) {
            return Ok(m.as_str());
        }
    }

    let trimmed = output.trim_end();
    if !trimmed.ends_with('}') {
        return Err(ExtractError::JsonNotFound);
    }
    if let Some(&(start, end)) = top_level_objects(trimmed)
        .iter()
        .rev()
        .find(|(_, end)| *end == trimmed.len())
    {
        return Ok(&trimmed[start..end]);
    }
    // Unbalanced braces: hand the widest candidate to the parser
    match trimmed.find('{') {
        Some(start) => Ok(&trimmed[start..]),
        None => Err(ExtractError::JsonNotFound),
    }
}

pub fn parse_result(output: &str) -> Result<PipelineResult, ExtractError> {
    let json = find_json_object(output)?;
    serde_json::from_str(json).map_err(|e| ExtractError::MalformedJson(e.to_string()))
}

/// Strips a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}
