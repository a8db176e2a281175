//! Caption archive header
//!
//! The header is a 24-byte little-endian structure:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Magic (`VCCD`) |
//! | 0x04   | 4    | Version (1) |
//! | 0x08   | 4    | Number of data blocks |
//! | 0x0C   | 4    | Block size in bytes |
//! | 0x10   | 4    | Number of directory entries |
//! | 0x14   | 4    | Byte offset of the data section |

use crate::archive::error::{ArchiveError, ArchiveResult};
use crate::archive::{DATA_ALIGNMENT, ENTRY_SIZE};
use binrw::{BinRead, BinWrite};

/// Archive signature: "VCCD" as little-endian u32
pub const CAPTION_MAGIC: u32 = u32::from_le_bytes(*b"VCCD");

/// Only supported archive version
pub const CAPTION_VERSION: u32 = 1;

/// Size of the encoded header in bytes
pub const HEADER_SIZE: usize = 24;

/// Caption archive header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct ArchiveHeader {
    /// File signature, must be [`CAPTION_MAGIC`]
    pub magic: u32,
    /// Format version, must be [`CAPTION_VERSION`]
    pub version: u32,
    /// Number of fixed-size data blocks
    pub num_blocks: u32,
    /// Size of every data block in bytes
    pub block_size: u32,
    /// Number of directory entries following the header
    pub directory_size: u32,
    /// File offset of block 0
    pub data_offset: u32,
}

impl ArchiveHeader {
    /// Create a header for the given layout, computing the aligned data offset
    pub fn new(num_blocks: u32, block_size: u32, directory_size: u32) -> Self {
        Self {
            magic: CAPTION_MAGIC,
            version: CAPTION_VERSION,
            num_blocks,
            block_size,
            directory_size,
            data_offset: data_offset_for(directory_size),
        }
    }

    /// Validate signature, version and layout consistency
    ///
    /// Any failure rejects the archive as a whole.
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.magic != CAPTION_MAGIC {
            return Err(ArchiveError::BadMagic {
                expected: CAPTION_MAGIC,
                actual: self.magic,
            });
        }

        if self.version != CAPTION_VERSION {
            return Err(ArchiveError::UnsupportedVersion(self.version));
        }

        if self.block_size == 0 {
            return Err(ArchiveError::InvalidHeader("block size is zero".into()));
        }

        let directory_end = HEADER_SIZE as u64 + u64::from(self.directory_size) * ENTRY_SIZE as u64;
        if u64::from(self.data_offset) < directory_end {
            return Err(ArchiveError::InvalidHeader(format!(
                "data offset {} overlaps directory ending at {}",
                self.data_offset, directory_end
            )));
        }

        Ok(())
    }

    /// File offset of the first byte of a block
    pub fn block_offset(&self, block: u32) -> u64 {
        u64::from(self.data_offset) + u64::from(block) * u64::from(self.block_size)
    }

    /// Total size of the data section in bytes
    pub fn data_len(&self) -> u64 {
        u64::from(self.num_blocks) * u64::from(self.block_size)
    }

    /// Expected total file size
    pub fn file_len(&self) -> u64 {
        u64::from(self.data_offset) + self.data_len()
    }
}

/// Data section offset for a directory of `directory_size` entries
///
/// The data section starts on a [`DATA_ALIGNMENT`] boundary so block reads
/// are sector-aligned.
pub fn data_offset_for(directory_size: u32) -> u32 {
    let directory_end = HEADER_SIZE as u32 + directory_size * ENTRY_SIZE as u32;
    directory_end.div_ceil(DATA_ALIGNMENT) * DATA_ALIGNMENT
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::{BinRead, BinWrite};
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = ArchiveHeader::new(3, 8192, 10);
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).expect("write header");
        let bytes = cursor.into_inner();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"VCCD");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 3);
        assert_eq!(
            u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            8192
        );

        let parsed = ArchiveHeader::read(&mut Cursor::new(&bytes)).expect("read header");
        assert_eq!(parsed, header);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_data_offset_alignment() {
        assert_eq!(data_offset_for(0), 512);
        // 24 + 40 * 12 = 504
        assert_eq!(data_offset_for(40), 512);
        // 24 + 41 * 12 = 516
        assert_eq!(data_offset_for(41), 1024);
    }

    #[test]
    fn test_block_offset() {
        let header = ArchiveHeader::new(4, 64, 2);
        assert_eq!(header.block_offset(0), 512);
        assert_eq!(header.block_offset(3), 512 + 192);
        assert_eq!(header.data_len(), 256);
        assert_eq!(header.file_len(), 768);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut header = ArchiveHeader::new(1, 64, 1);
        header.magic = u32::from_le_bytes(*b"XXXX");
        assert!(matches!(
            header.validate(),
            Err(ArchiveError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut header = ArchiveHeader::new(1, 64, 1);
        header.version = 2;
        assert!(matches!(
            header.validate(),
            Err(ArchiveError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_rejects_overlapping_data_offset() {
        let mut header = ArchiveHeader::new(1, 64, 100);
        header.data_offset = 100;
        assert!(matches!(
            header.validate(),
            Err(ArchiveError::InvalidHeader(_))
        ));
    }
}
