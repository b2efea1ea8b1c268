//! Binary-safe string values.
//!
//! Wiki content can contain byte strings that are not valid UTF-8 (legacy
//! edit summaries, binary page properties). JSON cannot carry those, so they
//! are wrapped in a base64 data URI.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const BINARY_DATA_PREFIX: &str = "data:application/octet-stream;base64,";

/// Valid UTF-8 passes through unchanged; anything else becomes a base64 data URI.
pub fn binary_safe_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("{BINARY_DATA_PREFIX}{}", STANDARD.encode(bytes)),
    }
}

/// Reverse of `binary_safe_string` for wrapped values.
///
/// Returns `None` for plain strings or a malformed payload.
pub fn decode_binary_string(value: &str) -> Option<Vec<u8>> {
    let payload = value.strip_prefix(BINARY_DATA_PREFIX)?;
    STANDARD.decode(payload).ok()
}
