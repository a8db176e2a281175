//! Caption string codec
//!
//! Strings are stored as UTF-16 code units, little-endian, followed by a
//! single zero code unit. The directory length counts the terminator.

use crate::archive::error::{ArchiveError, ArchiveResult};

/// Encode a caption string as UTF-16LE with terminator
pub fn encode_caption(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity((text.len() + 1) * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

/// Encoded size of a caption string in bytes, terminator included
pub fn encoded_len(text: &str) -> usize {
    (text.encode_utf16().count() + 1) * 2
}

/// Decode a terminated UTF-16LE caption string
///
/// Decoding stops at the first zero code unit; a payload without one is
/// rejected.
pub fn decode_caption(data: &[u8]) -> ArchiveResult<String> {
    if !data.len().is_multiple_of(2) {
        return Err(ArchiveError::InvalidString(format!(
            "odd payload length {}",
            data.len()
        )));
    }

    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    if units.len() * 2 == data.len() {
        return Err(ArchiveError::InvalidString("missing terminator".into()));
    }

    String::from_utf16(&units).map_err(|e| ArchiveError::InvalidString(e.to_string()))
}
