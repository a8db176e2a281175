//! Whole-file caption archive
//!
//! Holds the index and the complete data section in memory. Runtimes that
//! stream blocks only need [`ArchiveIndex`]; this type serves tooling, tests
//! and small archives.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::CaptionFormat;
use crate::archive::directory::{ArchiveIndex, DirectoryEntry};
use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::text::decode_caption;
use crate::hash::caption_hash;

/// Caption archive with its data section loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionArchive {
    /// Header and sorted directory
    pub index: ArchiveIndex,
    /// `num_blocks * block_size` bytes of block data
    pub data: Vec<u8>,
}

impl CaptionArchive {
    /// Read a complete archive
    pub fn read<R: Read + Seek>(reader: &mut R) -> ArchiveResult<Self> {
        let index = ArchiveIndex::read(reader)?;

        reader.seek(SeekFrom::Start(u64::from(index.header.data_offset)))?;
        let mut data = vec![0u8; index.header.data_len() as usize];
        reader.read_exact(&mut data)?;

        Ok(Self { index, data })
    }

    /// Write the complete archive
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> ArchiveResult<()> {
        self.index.write(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Bytes of one block
    pub fn block(&self, block: u32) -> Option<&[u8]> {
        let size = self.index.header.block_size as usize;
        let start = block as usize * size;
        self.data.get(start..start + size)
    }

    /// Decode the string addressed by a directory entry
    pub fn string_for(&self, entry: &DirectoryEntry) -> ArchiveResult<String> {
        let block = self
            .block(entry.block)
            .ok_or(ArchiveError::EntryOutOfBounds { hash: entry.hash })?;
        let bytes = block
            .get(entry.block_range())
            .ok_or(ArchiveError::EntryOutOfBounds { hash: entry.hash })?;
        decode_caption(bytes)
    }

    /// Resolve a caption key to its string
    ///
    /// A missing key is `None`, not an error.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let index = self.index.find(caption_hash(key))?;
        self.string_for(&self.index.entries[index]).ok()
    }
}

impl CaptionFormat for CaptionArchive {
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::read(&mut Cursor::new(data))?)
    }

    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut cursor = Cursor::new(Vec::with_capacity(
            self.index.header.file_len() as usize,
        ));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBuilder;
    use pretty_assertions::assert_eq;

    fn sample() -> CaptionArchive {
        let mut builder = ArchiveBuilder::new(64);
        builder.add("npc.hello", "Hello there.").expect("add");
        builder.add("npc.bye", "Goodbye!").expect("add");
        builder.add("sfx.door", "<sfx>[Door creaks]").expect("add");
        builder.build().expect("build")
    }

    #[test]
    fn test_lookup() {
        let archive = sample();
        assert_eq!(archive.lookup("npc.hello").as_deref(), Some("Hello there."));
        assert_eq!(archive.lookup("NPC.BYE").as_deref(), Some("Goodbye!"));
        assert_eq!(archive.lookup("npc.missing"), None);
    }

    #[test]
    fn test_round_trip() {
        let archive = sample();
        let bytes = archive.build().expect("build bytes");
        assert_eq!(bytes.len() as u64, archive.index.header.file_len());
        CaptionArchive::verify_round_trip(&bytes).expect("round trip");

        let parsed = CaptionArchive::parse(&bytes).expect("parse");
        assert_eq!(parsed, archive);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut bytes = sample().build().expect("build bytes");
        bytes[0..4].copy_from_slice(b"NOPE");
        assert!(CaptionArchive::parse(&bytes).is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_data() {
        let bytes = sample().build().expect("build bytes");
        let truncated = &bytes[..bytes.len() - 1];
        assert!(CaptionArchive::parse(truncated).is_err());
    }
}
