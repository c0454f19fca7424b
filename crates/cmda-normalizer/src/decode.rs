use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// Turn a raw payload into structured JSON, trying progressively more
/// forgiving decodings:
///
/// 1. the payload is JSON;
/// 2. the payload is base64 whose decoded bytes are JSON;
/// 3. the decoded bytes contain an embedded JSON object or array;
/// 4. the raw text itself contains an embedded JSON object or array.
pub fn decode_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(decoded) = decode_base64_text(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(decoded.trim()) {
            return Some(v);
        }
        if let Some(v) = extract_embedded_json(&decoded) {
            return Some(v);
        }
    }

    extract_embedded_json(trimmed)
}

/// Base64-decode after stripping whitespace; only accepted when the
/// result is valid UTF-8.
fn decode_base64_text(s: &str) -> Option<String> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 8 {
        return None;
    }
    let bytes = BASE64.decode(compact.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Find the longest parseable JSON object or array embedded in free text
/// (print dumps often carry a JSON block between markup rows).
pub fn extract_embedded_json(text: &str) -> Option<Value> {
    let mut best: Option<(usize, Value)> = None;
    for (start, ch) in text.char_indices() {
        let close = match ch {
            '{' => '}',
            '[' => ']',
            _ => continue,
        };
        let Some(end) = balanced_end(text, start, ch, close) else {
            continue;
        };
        let candidate = &text[start..=end];
        if best.as_ref().map_or(false, |(len, _)| candidate.len() <= *len) {
            continue;
        }
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            if v.is_object() || v.is_array() {
                best = Some((candidate.len(), v));
            }
        }
    }
    best.map(|(_, v)| v)
}

/// Index of the bracket closing the one at `start`, respecting string
/// literals and escapes.
fn balanced_end(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
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
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_passes_through() {
        let v = decode_payload(r#"{"id":"x1","total":10}"#).unwrap();
        assert_eq!(v["id"], "x1");
    }

    #[test]
    fn base64_wrapped_json_is_decoded() {
        let encoded = BASE64.encode(r#"{"id":"b64","items":[]}"#);
        let v = decode_payload(&encoded).unwrap();
        assert_eq!(v["id"], "b64");
    }

    #[test]
    fn base64_with_line_breaks_is_decoded() {
        let encoded = BASE64.encode(r#"{"id":"wrapped"}"#);
        let mid = encoded.len() / 2;
        let broken = format!("{}\n{}", &encoded[..mid], &encoded[mid..]);
        let v = decode_payload(&broken).unwrap();
        assert_eq!(v["id"], "wrapped");
    }

    #[test]
    fn embedded_json_block_is_extracted() {
        let text = "PRINT START\nsome header\n{\"id\":\"emb\",\"total\":\"19,90\"}\nPRINT END";
        let v = decode_payload(text).unwrap();
        assert_eq!(v["id"], "emb");
    }

    #[test]
    fn longest_embedded_block_wins() {
        let text = r#"x {"a":1} y {"b":{"c":2},"d":3} z"#;
        let v = extract_embedded_json(text).unwrap();
        assert_eq!(v, json!({"b":{"c":2},"d":3}));
    }

    #[test]
    fn garbage_yields_none() {
        assert!(decode_payload("just some receipt text").is_none());
        assert!(decode_payload("").is_none());
        assert!(decode_payload("{broken json").is_none());
    }

    #[test]
    fn braces_inside_strings_do_not_break_matching() {
        let text = r#"noise {"note":"use } sparingly","k":1} noise"#;
        let v = extract_embedded_json(text).unwrap();
        assert_eq!(v["k"], 1);
    }
}
