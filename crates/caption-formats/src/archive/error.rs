//! Error types for caption archive operations

use thiserror::Error;

/// Archive operation result type
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error types for caption archive parsing and building
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Header signature does not match `VCCD`
    #[error("Invalid archive magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic {
        /// Expected signature value
        expected: u32,
        /// Signature found in the file
        actual: u32,
    },

    /// Header version is not supported
    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    /// Header fields are inconsistent
    #[error("Invalid archive header: {0}")]
    InvalidHeader(String),

    /// Directory entries are not sorted by hash
    #[error("Directory not sorted by hash at entry {index}")]
    UnsortedDirectory {
        /// Index of the first out-of-order entry
        index: usize,
    },

    /// Two directory entries share a hash
    #[error("Duplicate directory hash {0:#010x}")]
    DuplicateHash(u32),

    /// Two keys hash to the same value while building
    #[error("Hash collision {hash:#010x} between '{existing}' and '{key}'")]
    HashCollision {
        /// Colliding hash value
        hash: u32,
        /// Key already present in the builder
        existing: String,
        /// Key being added
        key: String,
    },

    /// Directory entry addresses bytes outside its block
    #[error("Directory entry {hash:#010x} lies outside the data section")]
    EntryOutOfBounds {
        /// Hash of the offending entry
        hash: u32,
    },

    /// Encoded string does not fit a block or the length field
    #[error("String for '{key}' is {length} bytes, limit is {limit}")]
    StringTooLarge {
        /// Caption key
        key: String,
        /// Encoded length including terminator
        length: usize,
        /// Largest length allowed
        limit: usize,
    },

    /// Block offsets would not fit the 16-bit entry offset field
    #[error("Block size {block_size} exceeds the entry offset limit of {limit}")]
    BlockSizeTooLarge {
        /// Requested block size
        block_size: u32,
        /// Largest block size entries can address
        limit: u32,
    },

    /// Encoded string payload is malformed
    #[error("Invalid caption string: {0}")]
    InvalidString(String),

    /// Binary read/write error
    #[error("Binary format error: {0}")]
    BinRead(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Check if this error rejects the archive as a whole
    ///
    /// A rejected archive is never partially used.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::BadMagic { .. }
                | Self::UnsupportedVersion(_)
                | Self::InvalidHeader(_)
                | Self::UnsortedDirectory { .. }
                | Self::DuplicateHash(_)
                | Self::EntryOutOfBounds { .. }
                | Self::BinRead(_)
        )
    }

    /// Check if this is a build-time error
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::HashCollision { .. }
                | Self::StringTooLarge { .. }
                | Self::BlockSizeTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(
            ArchiveError::BadMagic {
                expected: 1,
                actual: 2
            }
            .is_rejection()
        );
        assert!(ArchiveError::UnsupportedVersion(9).is_rejection());
        assert!(!ArchiveError::InvalidString("odd".into()).is_rejection());

        let collision = ArchiveError::HashCollision {
            hash: 7,
            existing: "a".into(),
            key: "b".into(),
        };
        assert!(collision.is_build_error());
        assert!(!collision.is_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = ArchiveError::BadMagic {
            expected: 0x4443_4356,
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid archive magic: expected 0x44434356, got 0x00000000"
        );
    }
}
