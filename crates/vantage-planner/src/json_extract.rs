//! Tolerant JSON extraction from model output: accepts a bare JSON value, a
//! fenced ```-block, or the first balanced `{...}` object found anywhere in
//! the text. Ported from `tandem_core::engine_loop`'s
//! `extract_first_json_object`/fenced-block handling, which this kernel's
//! Planner and Direct Executor both need for parsing model responses.

use serde_json::Value;

pub fn parse_json_response(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    if let Some(fenced) = strip_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&fenced) {
            return Some(value);
        }
    }
    if let Some(block) = extract_first_json_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            return Some(value);
        }
    }
    None
}

/// Strips a leading/trailing ```-fence (optionally tagged, e.g. ```json).
fn strip_fence(input: &str) -> Option<String> {
    let without_prefix = input.strip_prefix("```")?;
    let after_tag = without_prefix
        .find('\n')
        .map(|i| &without_prefix[i + 1..])
        .unwrap_or(without_prefix);
    let body = after_tag.strip_suffix("```").unwrap_or(after_tag);
    Some(body.trim().to_string())
}

fn extract_first_json_object(input: &str) -> Option<String> {
    let mut start = None;
    let mut depth = 0usize;
    for (idx, ch) in input.char_indices() {
        if ch == '{' {
            if start.is_none() {
                start = Some(idx);
            }
            depth += 1;
        } else if ch == '}' {
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                let begin = start?;
                let block = input.get(begin..=idx)?;
                return Some(block.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        let parsed = parse_json_response(r#"{"goal": "x"}"#).unwrap();
        assert_eq!(parsed, json!({"goal": "x"}));
    }

    #[test]
    fn parses_fenced_json() {
        let parsed = parse_json_response("```json\n{\"goal\": \"x\"}\n```").unwrap();
        assert_eq!(parsed, json!({"goal": "x"}));
    }

    #[test]
    fn parses_embedded_json_with_surrounding_prose() {
        let parsed = parse_json_response("Sure, here you go: {\"goal\": \"x\"} hope that helps").unwrap();
        assert_eq!(parsed, json!({"goal": "x"}));
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert!(parse_json_response("not json at all").is_none());
    }
}
