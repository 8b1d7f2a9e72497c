//! Ferry Core - chunked peer-to-peer file distribution
//!
//! This crate provides the building blocks of a Ferry swarm: content-addressed
//! chunk storage, the tracker registry and its wire protocol, the peer-side
//! distribution engine, and configuration and logging setup.

pub mod config;
pub mod peer;
pub mod storage;
pub mod tracing_setup;
pub mod tracker;
pub mod transfer;

// Re-export main types for convenient access
pub use config::FerryConfig;
pub use peer::LocalPeer;
pub use storage::{ChunkName, ChunkStore, StorageError};
pub use tracker::{HttpTrackerClient, InProcessTracker, Registry, TrackerClient, TrackerError};
pub use transfer::{DistributionEngine, DownloadReport, TransferError};

/// Core errors that can bubble up from any Ferry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum FerryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Public IP discovery via {url} failed: {reason}")]
    IpDiscovery { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FerryError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            FerryError::Storage(e) => match e {
                StorageError::InvalidChunkName { name } => format!("Invalid chunk name: {name}"),
                StorageError::InvalidFileHash { hash } => format!("Invalid file hash: {hash}"),
                StorageError::FileHashMismatch { .. } => {
                    "Assembled file does not match its hash; some chunks are missing or corrupt"
                        .to_string()
                }
                _ => "Storage error occurred".to_string(),
            },
            FerryError::Tracker(e) => match e {
                TrackerError::ConnectionFailed { url, .. } | TrackerError::Timeout { url } => {
                    format!("Could not reach tracker: {url}")
                }
                _ => "Tracker error occurred".to_string(),
            },
            FerryError::Transfer(e) => match e {
                TransferError::Incomplete { failures } => {
                    format!("Download incomplete: {} chunk(s) unavailable", failures.len())
                }
                TransferError::Tracker(_) => "Could not reach tracker".to_string(),
                _ => "Download error occurred".to_string(),
            },
            FerryError::Configuration { reason } => format!("Configuration error: {reason}"),
            FerryError::IpDiscovery { .. } => "Could not discover public IP".to_string(),
            FerryError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            FerryError::Configuration { .. }
                | FerryError::Storage(StorageError::InvalidChunkName { .. })
                | FerryError::Storage(StorageError::InvalidFileHash { .. })
                | FerryError::Transfer(TransferError::Storage(StorageError::InvalidFileHash { .. }))
        )
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        let error = FerryError::Configuration {
            reason: "port out of range".to_string(),
        };
        assert!(error.is_user_error());
        assert_eq!(error.user_message(), "Configuration error: port out of range");

        let error: FerryError = StorageError::InvalidFileHash {
            hash: "../x".to_string(),
        }
        .into();
        assert!(error.is_user_error());
    }

    #[test]
    fn test_incomplete_download_message() {
        let error: FerryError = TransferError::Incomplete {
            failures: vec![transfer::ChunkFailure {
                index: 2,
                chunk: "abc_2".to_string(),
                error: TransferError::NoHolders {
                    chunk: "abc_2".to_string(),
                },
            }],
        }
        .into();

        assert!(!error.is_user_error());
        assert_eq!(error.user_message(), "Download incomplete: 1 chunk(s) unavailable");
    }

    #[test]
    fn test_tracker_unreachable_message() {
        let error: FerryError = TrackerError::Timeout {
            url: "http://t:8080/register-peer".to_string(),
        }
        .into();
        assert_eq!(
            error.user_message(),
            "Could not reach tracker: http://t:8080/register-peer"
        );
    }
}
