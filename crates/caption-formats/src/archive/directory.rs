//! Directory entries and the header + directory index
//!
//! Each directory entry is 12 bytes, little-endian:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Caption key hash |
//! | 0x04   | 4    | Block number |
//! | 0x08   | 2    | Byte offset within the block (i16) |
//! | 0x0A   | 2    | Encoded length including terminator (i16) |
//!
//! Entries are sorted by hash so lookups are a binary search.

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::header::ArchiveHeader;
use crate::hash::caption_hash;
use binrw::{BinRead, BinWrite};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

/// Single directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BinRead, BinWrite)]
#[brw(little)]
pub struct DirectoryEntry {
    /// Hash of the lowercased caption key
    pub hash: u32,
    /// Block holding the string
    pub block: u32,
    /// Byte offset of the string within its block
    pub offset: i16,
    /// Encoded length in bytes, terminator included
    pub length: i16,
}

impl DirectoryEntry {
    /// Byte range of the string within its block buffer
    pub fn block_range(&self) -> Range<usize> {
        let start = self.offset.max(0) as usize;
        start..start + self.length.max(0) as usize
    }

    /// Absolute file byte range of the string
    pub fn file_range(&self, header: &ArchiveHeader) -> Range<u64> {
        let start = header.block_offset(self.block) + self.offset.max(0) as u64;
        start..start + self.length.max(0) as u64
    }

    /// Check that the entry addresses whole bytes inside one block
    fn is_within(&self, header: &ArchiveHeader) -> bool {
        self.block < header.num_blocks
            && self.offset >= 0
            && self.length > 0
            && self.offset as u32 + self.length as u32 <= header.block_size
    }
}

/// Header plus sorted directory, loaded without the data section
///
/// This is all a runtime needs resident to translate keys into block reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIndex {
    /// Validated archive header
    pub header: ArchiveHeader,
    /// Directory entries sorted by hash
    pub entries: Vec<DirectoryEntry>,
}

impl ArchiveIndex {
    /// Read and validate header and directory from the start of an archive
    ///
    /// Fails closed: bad magic, version, ordering or bounds reject the whole
    /// archive.
    pub fn read<R: Read + Seek>(reader: &mut R) -> ArchiveResult<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = ArchiveHeader::read(reader)?;
        header.validate()?;

        let mut entries = Vec::with_capacity(header.directory_size as usize);
        for _ in 0..header.directory_size {
            entries.push(DirectoryEntry::read(reader)?);
        }

        let index = Self { header, entries };
        index.validate()?;
        Ok(index)
    }

    /// Write header and directory, zero-padding up to the data section
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> ArchiveResult<()> {
        writer.seek(SeekFrom::Start(0))?;
        self.header.write(writer)?;
        for entry in &self.entries {
            entry.write(writer)?;
        }

        let position = writer.stream_position()?;
        let data_offset = u64::from(self.header.data_offset);
        if position < data_offset {
            let padding = vec![0u8; (data_offset - position) as usize];
            writer.write_all(&padding)?;
        }
        Ok(())
    }

    /// Check directory ordering and entry bounds
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.entries.len() != self.header.directory_size as usize {
            return Err(ArchiveError::InvalidHeader(format!(
                "directory size {} does not match {} entries",
                self.header.directory_size,
                self.entries.len()
            )));
        }

        for (index, pair) in self.entries.windows(2).enumerate() {
            if pair[0].hash == pair[1].hash {
                return Err(ArchiveError::DuplicateHash(pair[0].hash));
            }
            if pair[0].hash > pair[1].hash {
                return Err(ArchiveError::UnsortedDirectory { index: index + 1 });
            }
        }

        if let Some(entry) = self.entries.iter().find(|e| !e.is_within(&self.header)) {
            return Err(ArchiveError::EntryOutOfBounds { hash: entry.hash });
        }

        Ok(())
    }

    /// Binary search the directory for a hash
    pub fn find(&self, hash: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&hash, |e| e.hash).ok()
    }

    /// Look up a caption key (case-insensitive)
    pub fn find_key(&self, key: &str) -> Option<&DirectoryEntry> {
        self.find(caption_hash(key)).map(|i| &self.entries[i])
    }

    /// Directory entry at an index
    pub fn entry(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// Number of directory entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the directory is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
