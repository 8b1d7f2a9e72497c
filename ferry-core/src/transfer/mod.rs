//! Peer-side chunk distribution.
//!
//! Resolves holders for each chunk index through the tracker, fetches bytes
//! directly from a randomly chosen holder and persists them locally. Every
//! index is an isolated task; failures are collected after all tasks finish.

pub mod engine;
pub mod fetcher;

pub use engine::{ChunkOutcome, DistributionEngine, DownloadReport};
pub use fetcher::{ChunkFetcher, HttpChunkFetcher};

use crate::storage::StorageError;
use crate::tracker::TrackerError;

/// Failure of one chunk, tagged with its position.
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: u32,
    pub chunk: String,
    pub error: TransferError,
}

/// Errors that occur while distributing chunks between peers.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("No peer holds chunk {chunk}")]
    NoHolders { chunk: String },

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Holder {holder} does not have chunk {chunk}")]
    ChunkNotFound { holder: String, chunk: String },

    #[error("Holder {holder} returned status {status}")]
    HolderStatus { holder: String, status: u16 },

    #[error("Holder {holder} unreachable: {reason}")]
    HolderUnreachable { holder: String, reason: String },

    #[error("Fetch from {holder} timed out")]
    Timeout { holder: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chunk task aborted: {reason}")]
    TaskAborted { reason: String },

    #[error("Download incomplete: {} chunk(s) failed", failures.len())]
    Incomplete { failures: Vec<ChunkFailure> },
}

impl TransferError {
    /// Failed indices of an incomplete download, empty for any other error.
    pub fn failed_indices(&self) -> Vec<u32> {
        match self {
            TransferError::Incomplete { failures } => failures.iter().map(|f| f.index).collect(),
            _ => Vec::new(),
        }
    }

    /// True for conditions a retry against other holders could resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TransferError::NoHolders { .. } | TransferError::ChunkNotFound { .. }
        )
    }
}
