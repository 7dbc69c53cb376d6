//! Deterministic JSON serialization for integrity hashing.
//!
//! An audit entry's integrity hash must be reproducible by any verifier
//! from the entry's fields alone, so the bytes fed to the digest cannot
//! depend on field order, whitespace, or escaping choices. This module
//! implements RFC 8785 (JSON Canonicalization Scheme): object keys
//! sorted by UTF-16 code units, no insignificant whitespace, minimal
//! string escaping, and shortest-form number rendering.
//!
//! ## Why canonical form matters
//!
//! Two serializations of the same entry that differ only in key order
//! would produce different hashes, making every verification a coin
//! flip. Canonicalization removes that freedom: one value, one byte
//! sequence, one hash.
//!
//! ## References
//!
//! - RFC 8785: <https://www.rfc-editor.org/rfc/rfc8785>

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serializes a JSON value into its canonical RFC 8785 form.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use warden_audit::canonical::canonicalize;
///
/// let a = json!({"b": 1, "a": 2});
/// let b = json!({"a": 2, "b": 1});
/// assert_eq!(canonicalize(&a), canonicalize(&b));
/// assert_eq!(canonicalize(&a), r#"{"a":2,"b":1}"#);
/// ```
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Hashes a JSON value's canonical form with SHA-256, returning the
/// digest as lowercase hex.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use warden_audit::canonical::hash_hex;
///
/// let digest = hash_hex(&json!({"a": 1}));
/// assert_eq!(digest.len(), 64);
/// ```
#[must_use]
pub fn hash_hex(value: &Value) -> String {
    let canonical = canonicalize(value);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // RFC 8785 sorts keys by UTF-16 code units, which differs
            // from byte order for characters outside the BMP.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| compare_utf16(a, b));

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f == f.trunc() && f.abs() < 1e21 {
            // Whole-valued floats render without a fractional part.
            out.push_str(&format!("{}", f as i64));
        } else {
            out.push_str(&format!("{}", f));
        }
    } else {
        out.push_str("null");
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn compare_utf16(a: &str, b: &str) -> std::cmp::Ordering {
    let a_units: Vec<u16> = a.encode_utf16().collect();
    let b_units: Vec<u16> = b.encode_utf16().collect();
    a_units.cmp(&b_units)
}
