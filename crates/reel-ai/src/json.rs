//! Tolerant JSON extraction from chatty model output.
//!
//! Models wrap JSON in prose or code fences, break lines inside strings and
//! emit stray backslashes. The object between the first `{` and the last `}`
//! is taken, line breaks are dropped, and any backslash that does not start a
//! valid JSON escape is doubled before parsing.

use serde::de::DeserializeOwned;

use crate::error::{AiError, AiResult};

/// Parse the outermost JSON object in `response` into `T`.
pub fn extract_json<T: DeserializeOwned>(response: &str) -> AiResult<T> {
    let cleaned = clean_json_object(response)?;
    serde_json::from_str(&cleaned).map_err(|e| AiError::invalid_json(format!("{}: {}", e, truncate(&cleaned, 200))))
}

/// Slice out and repair the outermost object without parsing it.
pub fn clean_json_object(response: &str) -> AiResult<String> {
    let start = response
        .find('{')
        .ok_or_else(|| AiError::invalid_json("no '{' in model output"))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AiError::invalid_json("no closing '}' in model output"))?;

    let body: String = response[start..=end]
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect();
    Ok(escape_stray_backslashes(&body))
}

fn escape_stray_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TitleAndScript {
        title: String,
        script: String,
    }

    #[test]
    fn test_extracts_from_code_fence_and_prose() {
        let raw = "Sure! Here you go:\n```json\n{\n  \"title\": \"Lisbon\",\n  \"script\": \"Narrator: hi\"\n}\n```\nEnjoy.";
        let parsed: TitleAndScript = extract_json(raw).unwrap();
        assert_eq!(parsed.title, "Lisbon");
        assert_eq!(parsed.script, "Narrator: hi");
    }

    #[test]
    fn test_line_breaks_inside_strings_are_dropped() {
        let raw = "{\"title\": \"A\", \"script\": \"Narrator: one\nCut to: two\"}";
        let parsed: TitleAndScript = extract_json(raw).unwrap();
        assert_eq!(parsed.script, "Narrator: oneCut to: two");
    }

    #[test]
    fn test_stray_backslashes_are_doubled() {
        let raw = r#"{"title": "C:\Films", "script": "say \"hi\" \d"}"#;
        let parsed: TitleAndScript = extract_json(raw).unwrap();
        assert_eq!(parsed.title, r"C:\Films");
        assert_eq!(parsed.script, r#"say "hi" \d"#);
    }

    #[test]
    fn test_valid_escapes_survive() {
        assert_eq!(escape_stray_backslashes(r#"a\\b\/c\u00e9"#), r#"a\\b\/c\u00e9"#);
        assert_eq!(escape_stray_backslashes(r"\x"), r"\\x");
        assert_eq!(escape_stray_backslashes("end\\"), "end\\\\");
    }

    #[test]
    fn test_no_object_is_an_error() {
        assert!(matches!(
            extract_json::<TitleAndScript>("no json here"),
            Err(AiError::InvalidJson(_))
        ));
        assert!(extract_json::<TitleAndScript>("} backwards {").is_err());
    }
}
