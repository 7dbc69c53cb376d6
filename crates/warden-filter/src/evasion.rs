//! Encoding-evasion analysis.
//!
//! Attackers wrap payloads in base64, hex, percent-encoding, unicode
//! escapes or HTML entities so that plain-text screening sees only an
//! opaque blob. This module extracts candidate blobs from raw text,
//! decodes them, and hands the decoded forms back to the caller for
//! re-screening against the same pattern battery.
//!
//! Decoding is conservative: a candidate is surfaced only when the
//! decoded bytes form plausible command text. Binary noise that happens
//! to sit in a base64-shaped run is discarded, which keeps findings
//! actionable instead of drowning them in garbage.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Minimum blob length considered worth decoding. Shorter runs are
/// overwhelmingly ordinary words or flags.
const MIN_BLOB_LEN: usize = 16;

/// A successfully decoded candidate payload.
pub(crate) struct Decoded {
    /// The decoded text, ready for re-screening.
    pub text: String,
    /// Which encoding produced it.
    pub encoding: &'static str,
}

/// Extracts and decodes every plausible encoded blob in `text`.
pub(crate) fn decode_candidates(text: &str) -> Vec<Decoded> {
    let mut out = Vec::new();

    for blob in scan_runs(text, is_base64_char) {
        let trimmed = blob.trim_end_matches('=');
        // Padding may legally add up to two '='; anything else is noise.
        if blob.len() < MIN_BLOB_LEN || blob.len() % 4 != 0 || blob.len() - trimmed.len() > 2 {
            continue;
        }
        if let Ok(bytes) = STANDARD.decode(blob) {
            if let Some(decoded) = plausible_text(bytes) {
                out.push(Decoded {
                    text: decoded,
                    encoding: "base64",
                });
            }
        }
    }

    for run in scan_runs(text, |c| c.is_ascii_hexdigit()) {
        if run.len() < MIN_BLOB_LEN || run.len() % 2 != 0 {
            continue;
        }
        if let Some(bytes) = decode_hex(run) {
            if let Some(decoded) = plausible_text(bytes) {
                out.push(Decoded {
                    text: decoded,
                    encoding: "hex",
                });
            }
        }
    }

    if let Some(decoded) = percent_decode(text) {
        out.push(Decoded {
            text: decoded,
            encoding: "url",
        });
    }

    if let Some(decoded) = unicode_unescape(text) {
        out.push(Decoded {
            text: decoded,
            encoding: "unicode-escape",
        });
    }

    if let Some(decoded) = html_unescape(text) {
        out.push(Decoded {
            text: decoded,
            encoding: "html-entity",
        });
    }

    out
}

/// Substring screen applied to decoded text in addition to the regular
/// pattern battery. Catches destructive verbs that carry no shell
/// metacharacters of their own.
pub(crate) fn looks_dangerous(text: &str) -> bool {
    const MARKERS: &[&str] = &[
        "rm -rf",
        "rm -fr",
        "del /f",
        "del /s",
        "format c:",
        "mkfs",
        "dd if=",
        "shutdown",
        "reboot",
        "invoke-expression",
        "iex(",
        "iex (",
        "-encodedcommand",
        "chmod 777",
        "/etc/passwd",
        "/etc/shadow",
    ];
    let lower = text.to_lowercase();
    MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Yields maximal runs of characters satisfying `pred`, skipping runs
/// shorter than [`MIN_BLOB_LEN`] early.
fn scan_runs(text: &str, pred: fn(char) -> bool) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        match (start, pred(ch)) {
            (None, true) => start = Some(idx),
            (Some(begin), false) => {
                if idx - begin >= MIN_BLOB_LEN {
                    runs.push(&text[begin..idx]);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        if text.len() - begin >= MIN_BLOB_LEN {
            runs.push(&text[begin..]);
        }
    }
    runs
}

/// Accepts decoded bytes only when they read as command-like text:
/// valid UTF-8 made of printable characters and ordinary whitespace.
fn plausible_text(bytes: Vec<u8>) -> Option<String> {
    let decoded = String::from_utf8(bytes).ok()?;
    if decoded.is_empty() {
        return None;
    }
    let ok = decoded
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'));
    ok.then_some(decoded)
}

fn decode_hex(run: &str) -> Option<Vec<u8>> {
    let digits = run.as_bytes();
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        bytes.push((hi * 16 + lo) as u8);
    }
    Some(bytes)
}

/// Decodes `%XX` escapes. Returns `None` unless at least two escapes
/// decoded, so ordinary percent signs in prose never produce a candidate.
fn percent_decode(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut decoded_count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                decoded_count += 1;
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    if decoded_count < 2 {
        return None;
    }
    String::from_utf8(out).ok()
}

/// Decodes `\uXXXX` escapes. Requires at least two escapes for the same
/// reason as [`percent_decode`].
fn unicode_unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut decoded_count = 0;
    let mut rest = text;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let hex: String = after.chars().take(4).collect();
        if hex.len() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let code = u32::from_str_radix(&hex, 16).ok()?;
            out.push(char::from_u32(code)?);
            decoded_count += 1;
            rest = &after[4..];
        } else {
            out.push_str("\\u");
            rest = after;
        }
    }
    out.push_str(rest);
    (decoded_count >= 2).then_some(out)
}

/// Decodes numeric HTML entities (`&#NN;` and `&#xNN;`). Requires at
/// least two entities.
fn html_unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut decoded_count = 0;
    let mut rest = text;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let (radix, body) = match after.strip_prefix('x').or_else(|| after.strip_prefix('X')) {
            Some(stripped) => (16, stripped),
            None => (10, after),
        };
        let digits: String = body
            .chars()
            .take_while(|c| c.is_digit(radix))
            .collect();
        let after_digits = &body[digits.len()..];
        if !digits.is_empty() && after_digits.starts_with(';') {
            if let Some(ch) = u32::from_str_radix(&digits, radix)
                .ok()
                .and_then(char::from_u32)
            {
                out.push(ch);
                decoded_count += 1;
                rest = &after_digits[1..];
                continue;
            }
        }
        out.push_str("&#");
        rest = after;
    }
    out.push_str(rest);
    (decoded_count >= 2).then_some(out)
}
