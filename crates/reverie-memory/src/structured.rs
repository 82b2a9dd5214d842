// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured-output requests and tolerant JSON recovery.
//!
//! Providers may honor the requested schema, return the JSON as plain text,
//! wrap it in a code fence, or ignore the schema entirely. Callers get a
//! [`StructuredOutcome`] and decide whether a second pass is worth it.

use std::sync::LazyLock;

use regex::Regex;
use reverie_core::{ProviderAdapter, ProviderRequest, ReverieError};
use serde::de::DeserializeOwned;
use serde_json::Value;

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("bullet pattern is valid")
});

/// Result of a structured-output request.
#[derive(Debug)]
pub enum StructuredOutcome<T> {
    /// The response parsed into `T`.
    Structured(T),
    /// The provider answered, but not in the requested shape.
    RawText(String),
    /// The call failed or returned nothing.
    Failed(ReverieError),
}

/// Send `request` and try to read the response as `T`.
///
/// The provider's structured payload is preferred; otherwise the text
/// content is parsed as JSON (code fences stripped).
pub async fn request_structured<T: DeserializeOwned>(
    provider: &dyn ProviderAdapter,
    request: ProviderRequest,
) -> StructuredOutcome<T> {
    let response = match provider.complete(request).await {
        Ok(response) => response,
        Err(e) => return StructuredOutcome::Failed(e),
    };

    if let Some(value) = response.structured
        && let Ok(parsed) = serde_json::from_value::<T>(value)
    {
        return StructuredOutcome::Structured(parsed);
    }

    let content = response.content.trim();
    if content.is_empty() {
        return StructuredOutcome::Failed(ReverieError::provider("empty structured response"));
    }
    match serde_json::from_str::<T>(strip_code_fence(content)) {
        Ok(parsed) => StructuredOutcome::Structured(parsed),
        Err(_) => StructuredOutcome::RawText(content.to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// Recover a list of strings from free-form model output.
///
/// Accepts a JSON array of strings or of `{"content": ...}` objects, an
/// object with a `facts` array, or such JSON embedded in prose or a code
/// fence. Falls back to markdown bullet or numbered lines. Returns `None`
/// when nothing list-like is found; `Some(vec![])` for an explicit `[]`.
pub fn extract_json_array(text: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(text);

    if let Ok(value) = serde_json::from_str::<Value>(body)
        && let Some(items) = list_items(&value)
    {
        return Some(items);
    }

    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&body[start..=end])
        && let Some(items) = list_items(&value)
    {
        return Some(items);
    }

    let bullets: Vec<String> = body
        .lines()
        .filter_map(|line| BULLET.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .filter(|item| !item.is_empty())
        .collect();
    if bullets.is_empty() { None } else { Some(bullets) }
}

/// Recover the first JSON object embedded in `text`.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let body = strip_code_fence(text);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if start >= end {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn list_items(value: &Value) -> Option<Vec<String>> {
    let array = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("facts")?.as_array()?,
        _ => return None,
    };
    Some(
        array
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(obj) => obj
                    .get("content")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
    )
}
