//! Locate a JSON object inside free-form classifier output.
//!
//! Tried in order: the whole text, the first fenced code block, the first
//! balanced `{...}` span outside string literals.

use serde_json::{Map, Value};

pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    parse_object(text.trim())
        .or_else(|| fenced_block(text).and_then(parse_object))
        .or_else(|| first_balanced_object(text).and_then(parse_object))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Body of the first ``` fence, minus an optional `json` tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let close = rest.find("```")?;
    let body = rest[..close].trim();
    (body.starts_with('{') && body.ends_with('}')).then_some(body)
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut start = None;

    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
