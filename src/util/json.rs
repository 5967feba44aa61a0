//! Helpers for carving JSON objects out of HTML/JS soup.

/// Extract a complete JSON object starting at (or after) the first `{` of
/// `input`. Balances braces and brackets while skipping string contents and
/// escape sequences, so it survives `}` inside string values.
pub fn json_object(input: &str) -> Option<&str> {
    let trimmed = input.trim_start_matches(|c| c != '{');
    if trimmed.is_empty() {
        return None;
    }

    let bytes = trimmed.as_bytes();
    let mut stack: Vec<u8> = vec![b'{'];
    let mut skip = false;

    for (i, &c) in bytes.iter().enumerate().skip(1) {
        if skip {
            skip = false;
            continue;
        }
        let context = *stack.last()?;
        match c {
            b'}' if context == b'{' => {
                stack.pop();
            }
            b']' if context == b'[' => {
                stack.pop();
            }
            b'"' if context == b'"' => {
                stack.pop();
            }
            b'\\' if context == b'"' => skip = true,
            b'{' if context != b'"' => stack.push(b'{'),
            b'[' if context != b'"' => stack.push(b'['),
            b'"' if context != b'"' => stack.push(b'"'),
            _ => {}
        }
        if stack.is_empty() {
            return trimmed.get(..=i);
        }
    }

    None
}

/// Collect the concatenated text of a YouTube text node, which is either
/// `{"simpleText": "..."}` or `{"runs": [{"text": "..."}, ...]}`.
pub fn text_node(value: &serde_json::Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    if let Some(simple) = value.get("simpleText").and_then(|v| v.as_str()) {
        return Some(simple.to_string());
    }
    if let Some(runs) = value.get("runs").and_then(|v| v.as_array()) {
        let mut text = String::new();
        for run in runs {
            if let Some(t) = run.get("text").and_then(|v| v.as_str()) {
                text.push_str(t);
            }
        }
        return Some(text);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nested_object() {
        let html = r#"garbage ytcfg.set({"a": {"b": [1, 2]}, "c": "}"}); more"#;
        let obj = json_object(html).unwrap();
        assert_eq!(obj, r#"{"a": {"b": [1, 2]}, "c": "}"}"#);
        let parsed: serde_json::Value = serde_json::from_str(obj).unwrap();
        assert_eq!(parsed["c"], "}");
    }

    #[test]
    fn survives_escaped_quotes() {
        let obj = json_object(r#"{"a": "he said \"}\""} trailing"#).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(obj).unwrap();
        assert_eq!(parsed["a"], "he said \"}\"");
    }

    #[test]
    fn unterminated_object_is_none() {
        assert!(json_object(r#"{"a": 1"#).is_none());
        assert!(json_object("no braces at all").is_none());
    }

    #[test]
    fn text_node_variants() {
        assert_eq!(
            text_node(&json!({"simpleText": "3:33"})).as_deref(),
            Some("3:33")
        );
        assert_eq!(
            text_node(&json!({"runs": [{"text": "a"}, {"text": "b"}]})).as_deref(),
            Some("ab")
        );
        assert_eq!(text_node(&json!({"other": 1})), None);
    }
}
