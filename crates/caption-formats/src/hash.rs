//! Caption key hashing.
//!
//! Directory entries are keyed by a 32-bit hash of the caption key, so the
//! runtime never stores key strings. The hash is the standard CRC-32 (IEEE)
//! of the ASCII-lowercased key, the same keying used by existing `VCCD`
//! archives, which makes lookups case-insensitive (`"Door.Open"` and
//! `"door.open"` resolve to the same entry).

use crc32fast::Hasher;

/// Hash a caption key for directory lookup.
///
/// # Examples
///
/// ```
/// use caption_formats::hash::caption_hash;
///
/// assert_eq!(caption_hash("NPC.Greeting"), caption_hash("npc.greeting"));
/// ```
pub fn caption_hash(key: &str) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(key.to_ascii_lowercase().as_bytes());
    hasher.finalize()
}
