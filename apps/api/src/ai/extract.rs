//! JSON recovery from free-form model output.
//!
//! Model output is treated as unreliable text, never as trusted JSON:
//! even with a strict-JSON response mode requested, providers emit
//! explanatory prose, fenced code blocks, or near-JSON with minor
//! syntax slips. Four strategies are attempted in order; the winning
//! strategy is reported so the repair path stays observable.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("no JSON value could be extracted from model output")]
pub struct ExtractError;

/// Which parse strategy produced the value. `Repair` is heuristic and
/// can accept wrong-but-parseable input, so callers flag it in
/// telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    ObjectSpan,
    ArraySpan,
    Repair,
}

/// Attempts all four strategies in order; first success wins. Only
/// exhaustion of all four yields an error.
pub fn extract_json(text: &str) -> Result<(Value, Strategy), ExtractError> {
    let stripped = strip_fences(text);

    if let Ok(value) = serde_json::from_str(stripped) {
        return Ok((value, Strategy::Direct));
    }

    if let Some(span) = delimited_span(stripped, '{', '}') {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok((value, Strategy::ObjectSpan));
        }
    }

    if let Some(span) = delimited_span(stripped, '[', ']') {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok((value, Strategy::ArraySpan));
        }
    }

    // Last resort: repair the most plausible span (or the whole text).
    let candidate = delimited_span(stripped, '{', '}')
        .or_else(|| delimited_span(stripped, '[', ']'))
        .unwrap_or(stripped);
    if let Ok(value) = serde_json::from_str(&repair(candidate)) {
        return Ok((value, Strategy::Repair));
    }

    Err(ExtractError)
}

/// Strips ```json ... ``` or ``` ... ``` code fences and surrounding
/// whitespace.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Greedy span from the first `open` to the last `close`, inclusive.
fn delimited_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("Failed to compile regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#",\s*([}\]])"#).expect("Failed to compile regex"));

/// Best-effort repair of near-JSON: single quotes to double quotes,
/// bare object keys quoted, trailing commas stripped. Heuristic — may
/// mangle pathological input, which is why it runs last and is flagged.
fn repair(text: &str) -> String {
    let requoted = text.replace('\'', "\"");
    let keyed = BARE_KEY.replace_all(&requoted, "$1\"$2\":");
    TRAILING_COMMA.replace_all(&keyed, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_fenced_json() {
        let (value, strategy) = extract_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert_eq!(strategy, Strategy::Direct);
    }

    #[test]
    fn test_extract_plain_fence() {
        let (value, strategy) = extract_json("```\n[1, 2, 3]\n```").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
        assert_eq!(strategy, Strategy::Direct);
    }

    #[test]
    fn test_extract_object_embedded_in_prose() {
        let (value, strategy) = extract_json("Here you go: {\"a\":1} thanks!").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert_eq!(strategy, Strategy::ObjectSpan);
    }

    #[test]
    fn test_extract_array_embedded_in_prose() {
        let (value, strategy) = extract_json("The list is [1, 2] as requested.").unwrap();
        assert_eq!(value, json!([1, 2]));
        assert_eq!(strategy, Strategy::ArraySpan);
    }

    #[test]
    fn test_extract_repairs_single_quotes_and_trailing_comma() {
        let (value, strategy) = extract_json("{'a':1,}").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert_eq!(strategy, Strategy::Repair);
    }

    #[test]
    fn test_extract_repairs_bare_keys() {
        let (value, strategy) = extract_json("{score: 85, verdict: \"good\"}").unwrap();
        assert_eq!(value, json!({"score": 85, "verdict": "good"}));
        assert_eq!(strategy, Strategy::Repair);
    }

    #[test]
    fn test_extract_fails_on_non_json() {
        assert!(extract_json("not json at all").is_err());
    }

    #[test]
    fn test_extract_prefers_direct_over_repair() {
        // Valid JSON must never take the repair path.
        let (_, strategy) = extract_json("{\"a\": \"it's fine\"}").unwrap();
        assert_eq!(strategy, Strategy::Direct);
    }

    #[test]
    fn test_span_requires_close_after_open() {
        assert!(delimited_span("} nothing {", '{', '}').is_none());
    }
}
