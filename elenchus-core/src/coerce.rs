//! JSON coercion: pull the first valid JSON value out of model chatter
//!
//! Agents instruct models to answer with JSON only, and models routinely
//! answer with "Here are the claims:\n{...}\nLet me know if...". This
//! module selects the first syntactically valid top-level JSON object (or
//! array) from such text. It never repairs invalid JSON: a selected span
//! that fails to parse is a reported failure, retried at the agent layer.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Error type for coercion failures
#[derive(Debug, Error, Clone)]
pub enum CoerceError {
    /// No JSON object or array found anywhere in the text. Carries the
    /// original text for audit.
    #[error("no JSON object found in model output (text starts with: {preview:?})")]
    NoJsonFound { preview: String, original: String },

    /// A candidate span was found but is not valid JSON
    #[error("model output contains malformed JSON: {0}")]
    Invalid(String),

    /// Empty input
    #[error("empty model output")]
    Empty,
}

impl CoerceError {
    fn not_found(original: &str) -> Self {
        CoerceError::NoJsonFound {
            preview: original.chars().take(120).collect(),
            original: original.to_string(),
        }
    }
}

/// Extract the first syntactically valid top-level JSON value from `text`.
///
/// Order of attempts: markdown code fences stripped, whole text parsed
/// directly, then candidate spans located by a bracket-depth scan that
/// respects string boundaries and escape sequences, outermost first.
pub fn coerce_json(text: &str) -> Result<serde_json::Value, CoerceError> {
    if text.trim().is_empty() {
        return Err(CoerceError::Empty);
    }

    let input = strip_code_fences(text.trim());

    // Fast path: the model obeyed.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&input) {
        return Ok(value);
    }

    let mut last_parse_error = None;
    let mut search_from = 0;
    while let Some(candidate) = next_balanced_span(&input, search_from) {
        match serde_json::from_str::<serde_json::Value>(candidate.text) {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_parse_error = Some(e.to_string());
                search_from = candidate.start + 1;
            }
        }
    }

    match last_parse_error {
        Some(e) => Err(CoerceError::Invalid(e)),
        None => Err(CoerceError::not_found(text)),
    }
}

struct BalancedSpan<'a> {
    start: usize,
    text: &'a str,
}

/// Find the next balanced `{...}` or `[...]` span at or after `from`,
/// tracking string state so braces inside string literals don't count.
fn next_balanced_span(input: &str, from: usize) -> Option<BalancedSpan<'_>> {
    let tail = &input[from..];
    let rel_start = tail.find(['{', '['])?;
    let start = from + rel_start;
    let open = input[start..].chars().next()?;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in input[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    if c == close {
                        return Some(BalancedSpan {
                            start,
                            text: &input[start..start + i + c.len_utf8()],
                        });
                    }
                    // Mismatched closer; give up on this opener.
                    return next_balanced_span(input, start + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Strip a markdown code fence wrapper, if present.
fn strip_code_fences(input: &str) -> String {
    static CODE_FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").unwrap());

    if let Some(caps) = CODE_FENCE_RE.captures(input) {
        if let Some(content) = caps.get(1) {
            return content.as_str().to_string();
        }
    }
    input.to_string()
}
