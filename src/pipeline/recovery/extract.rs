//! Multi-stage extraction of a JSON object from noisy model text.
//!
//! Stages are strictly ordered; each later stage runs only when the
//! previous one produced no parseable object. Structural repair is
//! attempted inside stages 2 through 4 whenever a direct parse of the
//! extracted candidate fails.

use serde_json::{Map, Value};

use super::repair;
use super::RecoveryError;

/// Recover a JSON object from raw model output.
pub fn recover(raw: &str) -> Result<Map<String, Value>, RecoveryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RecoveryError::Unrecoverable("empty model output".into()));
    }

    // Stage 1: the whole reply is already a valid JSON object.
    if let Some(obj) = parse_object(trimmed) {
        return Ok(obj);
    }

    // Stage 2: first fenced code block, with or without a language tag.
    if let Some(inner) = fenced_block(trimmed) {
        if let Some(obj) = parse_or_repair(inner) {
            return Ok(obj);
        }
    }

    // Stage 3: first balanced top-level `{...}` span, string-state aware.
    if let Some(span) = balanced_object_span(trimmed) {
        if let Some(obj) = parse_or_repair(span) {
            return Ok(obj);
        }
    }

    // Stage 4: everything between the first `{` and the last `}`.
    if let Some(span) = first_to_last_brace(trimmed) {
        if let Some(obj) = parse_or_repair(span) {
            return Ok(obj);
        }
    }

    // Stage 5: emergency recovery from the first `{` onward, closing
    // whatever the model never closed.
    if let Some(candidate) = emergency_close(trimmed) {
        if let Some(obj) = parse_object(&candidate) {
            return Ok(obj);
        }
    }

    Err(RecoveryError::Unrecoverable(
        "no JSON object found after all extraction stages".into(),
    ))
}

/// Parse a candidate, accepting only a top-level object.
pub(crate) fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_or_repair(candidate: &str) -> Option<Map<String, Value>> {
    parse_object(candidate).or_else(|| repair::repair_and_parse(candidate))
}

/// Inner content of the first ``` fence, language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    let close = after_ticks.find("```")?;
    let inner = &after_ticks[..close];
    // A language tag occupies the rest of the opening line.
    let inner = match inner.find('\n') {
        Some(newline) if !inner[..newline].contains('{') => &inner[newline + 1..],
        _ => inner,
    };
    Some(inner.trim())
}

/// First top-level balanced `{...}` span, tracking string-literal state
/// and escape sequences.
fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Substring from the first `{` to the last `}` in the whole text.
fn first_to_last_brace(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    (last > first).then(|| &text[first..=last])
}

/// Everything from the first `{` onward, with unbalanced `{`/`[` closed
/// by appended closers counted while respecting string state.
fn emergency_close(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let tail = &text[start..];

    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in tail.chars() {
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
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut candidate = tail.trim_end().to_string();
    if in_string {
        candidate.push('"');
    } else if candidate.ends_with(',') {
        candidate.pop();
    }
    while let Some(closer) = closers.pop() {
        candidate.push(closer);
    }
    Some(candidate)
}
