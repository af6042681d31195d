// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argument escaping for call-per-query requests.
//!
//! The serialized request travels as one command-line argument. Exactly two
//! characters are escaped, in a single pass: `\` becomes `\\` and `"` becomes
//! `\"`. A backslash already present in the JSON text is escaped again, so a
//! JSON `\"` becomes `\\\"`. Peers reverse it with [`unescape_argument`].

/// Escapes backslashes and double quotes.
pub fn escape_argument(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + raw.len() / 8);
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Reverses [`escape_argument`]. Any other backslash sequence is kept as-is.
pub fn unescape_argument(escaped: &str) -> String {
    let mut raw = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\\') | Some('"') => {
                    if let Some(next) = chars.next() {
                        raw.push(next);
                    }
                    continue;
                }
                _ => {}
            }
        }
        raw.push(c);
    }
    raw
}
