//! File format parser and builder for block-indexed closed caption archives
//!
#![allow(clippy::cast_possible_wrap)] // Intentional for i16 directory fields
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! A caption archive stores thousands of localized caption strings in fixed-size
//! blocks so that a runtime can stream only the blocks it needs. This crate
//! provides symmetric (parser and builder) support for the format.
//!
//! # Layout
//!
//! ```text
//! ┌───────────────┬────────────────────────┬─────────┬──────────────────────┐
//! │ Header (24 B) │ Directory (12 B × n)   │ padding │ Data (numBlocks × B) │
//! └───────────────┴────────────────────────┴─────────┴──────────────────────┘
//! ```
//!
//! - **Header**: magic, version, block count, block size, directory size, data offset
//! - **Directory**: `(hash, block, offset, length)` records sorted by hash
//! - **Data**: blocks of zero-terminated UTF-16LE strings, zero-padded
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Little-Endian on Disk**: Every field is decoded with explicit endianness,
//!   so big-endian hosts swap transparently
//! - **Round-Trip Guarantee**: parse(build(data)) == data

#![warn(missing_docs)]

/// Caption archive header, directory, string codec and builder
///
/// See the [`archive`] module for the binary layout and usage examples.
pub mod archive;

/// Case-insensitive caption key hashing
pub mod hash;

pub use archive::{
    ArchiveBuilder, ArchiveError, ArchiveHeader, ArchiveIndex, ArchiveResult, CaptionArchive,
    DirectoryEntry,
};
pub use hash::caption_hash;

/// Common format trait for whole-file archive representations
pub trait CaptionFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify round-trip correctness
    fn verify_round_trip(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if data != rebuilt.as_slice() {
            return Err("Round-trip verification failed".into());
        }
        Ok(())
    }
}
