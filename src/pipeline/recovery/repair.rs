//! Structural repair passes for almost-JSON text.
//!
//! Each pass is an independent, idempotent transformation over the
//! candidate. Passes run cumulatively in a fixed order, re-parsing after
//! each one and stopping at the first success so valid structure is
//! never over-corrected.

use serde_json::{Map, Value};

use super::extract::parse_object;

type RepairPass = fn(&str) -> String;

const PASSES: &[(&str, RepairPass)] = &[
    ("remove-trailing-commas", remove_trailing_commas),
    ("insert-missing-commas", insert_missing_commas),
    ("balance-closers", balance_closers),
    ("close-unterminated-string", close_unterminated_string),
];

/// Apply repair passes until one of them yields parseable JSON.
pub(crate) fn repair_and_parse(input: &str) -> Option<Map<String, Value>> {
    let mut current = input.trim().to_string();
    for (name, pass) in PASSES {
        let next = pass(&current);
        if next != current {
            tracing::trace!(pass = name, "applied structural repair");
            current = next;
        }
        if let Some(obj) = parse_object(&current) {
            return Some(obj);
        }
    }
    None
}

/// Tracks whether the scanner is inside a string literal.
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    fn new() -> Self {
        Self {
            in_string: false,
            escaped: false,
        }
    }

    /// Feed one char; returns true while inside a string literal
    /// (including the closing quote).
    fn step(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            true
        } else if ch == '"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

/// Drop commas that directly precede a `}` or `]`.
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = StringState::new();

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if state.step(ch) {
            out.push(ch);
            i += 1;
            continue;
        }
        if ch == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1; // drop the comma, keep the whitespace
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    out
}

/// Insert commas between adjacent values the model forgot to separate:
/// two quoted strings, `}{` / `][` pairs, and a closing string or
/// bracket followed by a quoted key.
fn insert_missing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut state = StringState::new();
    // Last structural char seen outside strings; '"' marks a string that
    // just closed.
    let mut prev: Option<char> = None;

    for ch in text.chars() {
        if state.in_string {
            let closing = ch == '"' && !state.escaped;
            state.step(ch);
            out.push(ch);
            if closing {
                prev = Some('"');
            }
            continue;
        }
        if ch.is_whitespace() {
            out.push(ch);
            continue;
        }
        if matches!(ch, '"' | '{' | '[') && matches!(prev, Some('"') | Some('}') | Some(']')) {
            out.push(',');
        }
        state.step(ch);
        out.push(ch);
        prev = if ch == '"' { None } else { Some(ch) };
    }
    out
}

/// Append closers for every `{` or `[` the text never closed, counting
/// while respecting string state. An unterminated trailing string is
/// closed first so the closers land outside it.
fn balance_closers(text: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut state = StringState::new();

    for ch in text.chars() {
        if state.step(ch) {
            continue;
        }
        match ch {
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if state.in_string {
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

/// Close a string literal the model left dangling at the end of output.
fn close_unterminated_string(text: &str) -> String {
    let mut state = StringState::new();
    for ch in text.chars() {
        state.step(ch);
    }
    if state.in_string {
        let mut out = text.to_string();
        out.push('"');
        out
    } else {
        text.to_string()
    }
}
