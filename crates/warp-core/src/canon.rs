//! Canonical JSON for domain-separated hashing.
//!
//! Trust-record ids and signatures are computed over a canonical JSON
//! rendering: compact (no insignificant whitespace), UTF-8, with object
//! keys sorted lexicographically at every nesting level. Two structurally
//! equal values always render to the same byte sequence, which is what
//! makes the renderings hashable.
//!
//! Canonical JSON is a hashing input only; nothing is ever stored in this
//! form.

use serde_json::Value;

/// Render `value` as canonical JSON.
#[must_use]
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    render(value, &mut out);
    out
}

/// Render `value` as canonical JSON bytes, ready for hashing.
#[must_use]
pub fn to_canonical_json_bytes(value: &Value) -> Vec<u8> {
    to_canonical_json(value).into_bytes()
}

fn render(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => render_string(text, out),
        Value::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push(',');
                }
                first = false;
                render(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut sorted_keys: Vec<&String> = map.keys().collect();
            sorted_keys.sort();
            out.push('{');
            let mut first = true;
            for key in sorted_keys {
                if !first {
                    out.push(',');
                }
                first = false;
                render_string(key, out);
                out.push(':');
                if let Some(item) = map.get(key) {
                    render(item, out);
                }
            }
            out.push('}');
        }
    }
}

fn render_string(text: &str, out: &mut String) {
    // serde_json's escaping is already minimal and deterministic.
    match serde_json::to_string(text) {
        Ok(escaped) => out.push_str(&escaped),
        // String serialization cannot fail; keep rendering total anyway.
        Err(_) => out.push_str("\"\""),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
