//! Caption archive builder
//!
//! Packs `(key, text)` pairs into fixed-size blocks in insertion order. A
//! string is never split across blocks: when appending it would overflow the
//! current block, the rest of the block is zero-padded and a new block starts,
//! even if the overflow is a single byte.
//!
//! # Example
//!
//! ```rust
//! use caption_formats::archive::ArchiveBuilder;
//!
//! let mut builder = ArchiveBuilder::new(64);
//! builder.add("door.open", "The door creaks open.")?;
//! builder.add("door.close", "<clr:200,200,200>The door slams.")?;
//! let archive = builder.build()?;
//!
//! assert_eq!(archive.lookup("DOOR.OPEN").as_deref(), Some("The door creaks open."));
//! # Ok::<(), caption_formats::ArchiveError>(())
//! ```

use std::collections::HashMap;
use std::io::{Seek, Write};

use crate::archive::directory::{ArchiveIndex, DirectoryEntry};
use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::file::CaptionArchive;
use crate::archive::header::ArchiveHeader;
use crate::archive::text::encode_caption;
use crate::hash::caption_hash;

/// Default block size used by shipping archives
pub const DEFAULT_BLOCK_SIZE: u32 = 8192;

/// Largest block size whose offsets fit a directory entry
pub const MAX_BLOCK_SIZE: u32 = i16::MAX as u32;

/// Builder for caption archives
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    /// Fixed block size in bytes
    block_size: u32,
    /// Directory entries in insertion order
    entries: Vec<DirectoryEntry>,
    /// Keys by hash, for collision reporting
    keys: HashMap<u32, String>,
    /// Completed, zero-padded blocks
    blocks: Vec<u8>,
    /// Block currently being filled
    current: Vec<u8>,
}

impl ArchiveBuilder {
    /// Create a builder with the given block size
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            entries: Vec::new(),
            keys: HashMap::new(),
            blocks: Vec::new(),
            current: Vec::with_capacity(block_size as usize),
        }
    }

    /// Number of strings added
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no strings have been added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a caption string under a key
    ///
    /// Returns the directory entry the string was assigned.
    pub fn add(&mut self, key: &str, text: &str) -> ArchiveResult<DirectoryEntry> {
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(ArchiveError::BlockSizeTooLarge {
                block_size: self.block_size,
                limit: MAX_BLOCK_SIZE,
            });
        }

        let hash = caption_hash(key);
        if let Some(existing) = self.keys.get(&hash) {
            return Err(ArchiveError::HashCollision {
                hash,
                existing: existing.clone(),
                key: key.to_string(),
            });
        }

        let encoded = encode_caption(text);
        let limit = self.block_size as usize;
        if encoded.len() > limit {
            return Err(ArchiveError::StringTooLarge {
                key: key.to_string(),
                length: encoded.len(),
                limit,
            });
        }

        if self.current.len() + encoded.len() > self.block_size as usize {
            self.seal_block();
        }

        let entry = DirectoryEntry {
            hash,
            block: self.sealed_blocks(),
            offset: self.current.len() as i16,
            length: encoded.len() as i16,
        };
        self.current.extend_from_slice(&encoded);
        self.entries.push(entry);
        self.keys.insert(hash, key.to_string());

        Ok(entry)
    }

    /// Finish packing and produce an in-memory archive
    pub fn build(mut self) -> ArchiveResult<CaptionArchive> {
        if !self.current.is_empty() {
            self.seal_block();
        }

        let num_blocks = self.sealed_blocks();
        let mut entries = self.entries;
        entries.sort_by_key(|e| e.hash);

        let header = ArchiveHeader::new(num_blocks, self.block_size, entries.len() as u32);
        let index = ArchiveIndex { header, entries };
        index.validate()?;

        Ok(CaptionArchive {
            index,
            data: self.blocks,
        })
    }

    /// Finish packing and write the archive
    ///
    /// Returns the index of the written archive.
    pub fn write<W: Write + Seek>(self, writer: &mut W) -> ArchiveResult<ArchiveIndex> {
        let archive = self.build()?;
        archive.write(writer)?;
        Ok(archive.index)
    }

    fn sealed_blocks(&self) -> u32 {
        (self.blocks.len() / self.block_size as usize) as u32
    }

    fn seal_block(&mut self) {
        self.current.resize(self.block_size as usize, 0);
        self.blocks.append(&mut self.current);
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}
