//! Response Sanitizer — extracts the JSON payload from raw model text.
//!
//! Models wrap JSON in markdown fences, narrate around it, or stop mid-object.
//! The extractor walks forward from each candidate `{` with a depth counter that
//! tracks string-literal and escape state, so a `}` inside a quoted value is never
//! taken as the closing brace. No balanced, parseable region means
//! `UnparsableOutput`; the sanitizer never guesses at a truncated payload.

use serde_json::Value;

use crate::contract::ContractError;

/// Strips a leading ```` ```json ```` / ```` ``` ```` fence and a trailing ```` ``` ```` fence.
pub fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag, if any (```json, ```JSON, ```javascript).
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let rest = rest.trim();
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

/// Returns the JSON object region of `raw` that holds the payload.
///
/// Scans top-level `{` candidates left to right. The first balanced region that
/// parses to a non-empty object wins; an empty `{}` is only used when nothing
/// better follows. A `{` that never closes ends the scan: every later brace
/// sits inside it, so the output was truncated.
///
/// Already-clean JSON is returned byte-identical.
pub fn extract_json(raw: &str) -> Result<&str, ContractError> {
    let text = strip_fences(raw);
    let bytes = text.as_bytes();

    let mut empty_object = None;
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        let Some(end) = balanced_end(bytes, start) else {
            return Err(ContractError::UnparsableOutput);
        };
        let candidate = &text[start..=end];
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) if !map.is_empty() => return Ok(candidate),
            Ok(_) => {
                if empty_object.is_none() {
                    empty_object = Some(candidate);
                }
                from = end + 1;
            }
            // Balanced but not JSON, e.g. `{name}` in narration.
            Err(_) => from = start + 1,
        }
    }

    empty_object.ok_or(ContractError::UnparsableOutput)
}

/// Extracts and parses the payload.
pub fn parse_payload(raw: &str) -> Result<Value, ContractError> {
    let json = extract_json(raw)?;
    serde_json::from_str(json).map_err(|_| ContractError::UnparsableOutput)
}

/// Index of the `}` closing the object that opens at `start`, if any.
///
/// Works on bytes: `{`, `}`, `"` and `\` are ASCII and never occur inside a
/// multi-byte UTF-8 sequence, so every returned index is a char boundary.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
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
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes markdown link syntax from every string in the payload:
/// `[text](url)` → `text`, `[text]` → `text`.
pub fn strip_markdown_artifacts(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('[') {
                *s = strip_markdown_links(s);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_markdown_artifacts),
        Value::Object(map) => map.values_mut().for_each(strip_markdown_artifacts),
        _ => {}
    }
}

fn strip_markdown_links(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(']') else {
            out.push_str(&rest[open..]);
            return out;
        };
        out.push_str(&after_open[..close]);
        rest = &after_open[close + 1..];
        if let Some(url_part) = rest.strip_prefix('(') {
            if let Some(url_end) = url_part.find(')') {
                rest = &url_part[url_end + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}
