//! Storage layer for chunk data.
//!
//! Files are split into fixed-size, content-addressed chunks stored as flat
//! files named `<file_hash>_<index>`, and reassembled from them in index order.

pub mod chunk_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::fmt;
use std::str::FromStr;

pub use chunk_store::{ChunkEntry, ChunkStore, sha256_hex};

/// Identity of one chunk: the content hash of its source file plus its
/// zero-based position within that file.
///
/// Serialized as `"<file_hash>_<index>"`, which is also the on-disk file name
/// and the key used by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkName {
    file_hash: String,
    index: u32,
}

impl ChunkName {
    /// Creates a chunk name after validating the file hash.
    ///
    /// # Errors
    ///
    /// - `StorageError::InvalidFileHash` - If the hash is empty or not alphanumeric
    pub fn new(file_hash: impl Into<String>, index: u32) -> Result<Self, StorageError> {
        let file_hash = file_hash.into();
        validate_file_hash(&file_hash)?;
        Ok(Self { file_hash, index })
    }

    /// Returns the content hash of the source file.
    pub fn file_hash(&self) -> &str {
        &self.file_hash
    }

    /// Returns the zero-based chunk index.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.file_hash, self.index)
    }
}

impl FromStr for ChunkName {
    type Err = StorageError;

    /// Parses `"<hash>_<index>"`. Exactly two underscore-separated segments
    /// are accepted and the index must be plain decimal digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidChunkName {
            name: s.to_string(),
        };

        let segments: Vec<&str> = s.split('_').collect();
        if segments.len() != 2 {
            return Err(invalid());
        }

        let (hash, index) = (segments[0], segments[1]);
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = index.parse::<u32>().map_err(|_| invalid())?;

        ChunkName::new(hash, index).map_err(|_| invalid())
    }
}

/// Checks that a file hash is usable as the prefix of a chunk file name.
///
/// # Errors
///
/// - `StorageError::InvalidFileHash` - If the hash is empty or contains
///   anything other than ASCII letters and digits
pub fn validate_file_hash(hash: &str) -> Result<(), StorageError> {
    if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(StorageError::InvalidFileHash {
            hash: hash.to_string(),
        });
    }
    Ok(())
}

/// Errors that occur during chunk storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Name does not have the `<hash>_<index>` shape
    #[error("Invalid chunk name: {name}")]
    InvalidChunkName { name: String },

    /// File hash cannot prefix a chunk name
    #[error("Invalid file hash: {hash:?}")]
    InvalidFileHash { hash: String },

    /// Requested chunk is not present in local storage
    #[error("Chunk {name} not found")]
    ChunkNotFound { name: String },

    /// Chunk bytes do not hash to the advertised value
    #[error("Chunk {name} hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Reassembled file does not hash to its content address
    #[error("Combined file hash mismatch: expected {expected}, got {actual}")]
    FileHashMismatch { expected: String, actual: String },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
