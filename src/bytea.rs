//! Text encodings of binary column values.

use crate::error::{Result, VtRsError};
use crate::types::LogicalType;

/// Escapes raw bytes for use inside a quoted binary literal.
///
/// Printable ASCII passes through; backslash is doubled and every other byte
/// becomes a three digit octal escape. Single quotes are left to the literal
/// quoting step.
pub fn escape_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

/// Recovers raw bytes from the server's text rendering of a binary value.
///
/// Accepts both the hex form (`\x0a1b`) and the octal escape form
/// (`ab\001\\`).
pub fn unescape_bytea(text: &str) -> Result<Vec<u8>> {
    if let Some(hex_digits) = text.strip_prefix("\\x") {
        return hex::decode(hex_digits).map_err(|_| malformed(text));
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            Some(_) => {
                let octal = bytes.get(i + 1..i + 4).ok_or_else(|| malformed(text))?;
                let octal = std::str::from_utf8(octal).map_err(|_| malformed(text))?;
                let byte = u8::from_str_radix(octal, 8).map_err(|_| malformed(text))?;
                out.push(byte);
                i += 4;
            }
            None => return Err(malformed(text)),
        }
    }
    Ok(out)
}

fn malformed(text: &str) -> VtRsError {
    VtRsError::malformed(LogicalType::Binary, text)
}
