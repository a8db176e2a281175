//! Caption archive format
//!
//! A caption archive maps case-insensitive caption keys to localized strings
//! stored in fixed-size blocks. The block is the unit of I/O and caching: a
//! runtime keeps the header and directory resident and streams blocks on
//! demand.
//!
//! # Binary Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! Header:    { magic:u32, version:u32, numBlocks:u32, blockSize:u32,
//!              directorySize:u32, dataOffset:u32 }
//! Directory: directorySize × { hash:u32, blockNum:u32, offset:i16, length:i16 }
//!            sorted by hash ascending
//! Padding:   zeroes up to dataOffset (512-byte aligned)
//! Data:      numBlocks × blockSize bytes of zero-terminated UTF-16LE strings,
//!            each block zero-padded
//! ```
//!
//! # Addressing
//!
//! A key yields at most one directory entry. An entry yields exactly the byte
//! range `[dataOffset + blockNum * blockSize + offset, + length)`, terminator
//! included. A missing key is not an error; callers treat it as "caption
//! missing".
//!
//! # Usage Examples
//!
//! ## Load an index and address a string
//!
//! ```rust
//! use caption_formats::archive::{ArchiveBuilder, ArchiveIndex};
//! use std::io::Cursor;
//!
//! let mut builder = ArchiveBuilder::new(256);
//! builder.add("npc.hello", "Hello there.")?;
//! let mut file = Cursor::new(Vec::new());
//! builder.write(&mut file)?;
//!
//! let index = ArchiveIndex::read(&mut file)?;
//! let entry = index.find_key("NPC.Hello").expect("present");
//! let range = entry.file_range(&index.header);
//! assert_eq!(range.start, u64::from(index.header.data_offset));
//! # Ok::<(), caption_formats::ArchiveError>(())
//! ```

mod builder;
mod directory;
mod error;
mod file;
mod header;
mod text;

pub use builder::{ArchiveBuilder, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
pub use directory::{ArchiveIndex, DirectoryEntry};
pub use error::{ArchiveError, ArchiveResult};
pub use file::CaptionArchive;
pub use header::{ArchiveHeader, CAPTION_MAGIC, CAPTION_VERSION, HEADER_SIZE, data_offset_for};
pub use text::{decode_caption, encode_caption, encoded_len};

/// Size of one encoded directory entry in bytes
pub const ENTRY_SIZE: usize = 12;

/// Alignment of the data section
pub const DATA_ALIGNMENT: u32 = 512;
