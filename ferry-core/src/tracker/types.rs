//! Core types for tracker communication

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mapping of chunk name to chunk content hash.
pub type FileParts = HashMap<String, String>;

/// Mapping of holder address to the chunk hash that holder advertised.
pub type ChunkHolders = HashMap<String, String>;

/// Tracker-side record of one live peer.
///
/// Owned and mutated only by the registry; callers always receive copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Canonical `host:port` locator, also the peer's registry key
    pub addr: String,
    /// Separately discovered public IP, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    /// Last register/update seen from this peer
    pub last_seen: DateTime<Utc>,
    /// Chunks this peer advertises, chunk name to chunk hash
    #[serde(default)]
    pub file_parts: FileParts,
}

/// Errors that occur talking to, or decoding messages for, the tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker connection failed: {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Tracker request timed out: {url}")]
    Timeout { url: String },

    #[error("Tracker {url} returned status {status}")]
    ServerStatus { url: String, status: u16 },

    #[error("Invalid tracker response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Malformed tracker message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Abstract tracker interface used by peers.
///
/// Mirrors the five registry operations plus retraction. Implementations
/// handle transport details while keeping error semantics consistent.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Registers (or re-registers) a peer under `addr`.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::ServerStatus` - If the tracker rejects the request
    async fn register_peer(&self, addr: &str, public_ip: Option<&str>)
    -> Result<(), TrackerError>;

    /// Removes a peer and every holding it advertised. Unknown peers are not an error.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::ServerStatus` - If the tracker rejects the request
    async fn remove_peer(&self, addr: &str) -> Result<(), TrackerError>;

    /// Merges `file_parts` into the peer's advertised holdings.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::ServerStatus` - If the tracker rejects the request
    async fn update_file_parts(
        &self,
        addr: &str,
        public_ip: Option<&str>,
        file_parts: FileParts,
    ) -> Result<(), TrackerError>;

    /// Withdraws specific chunks from the peer's advertised holdings.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::ServerStatus` - If the tracker rejects the request
    async fn retract_file_parts(
        &self,
        addr: &str,
        chunk_names: Vec<String>,
    ) -> Result<(), TrackerError>;

    /// Returns live holders of `chunk_name` other than `exclude_addr`.
    ///
    /// An unknown chunk yields an empty map, not an error.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::InvalidResponse` - If the response cannot be decoded
    async fn query_file_parts(
        &self,
        chunk_name: &str,
        exclude_addr: &str,
    ) -> Result<ChunkHolders, TrackerError>;

    /// Returns a liveness-swept snapshot of all peers.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` / `Timeout` - If the tracker is unreachable
    /// - `TrackerError::InvalidResponse` - If the response cannot be decoded
    async fn list_peers(&self) -> Result<HashMap<String, PeerRecord>, TrackerError>;

    /// Returns a description of the tracker endpoint for logging.
    fn tracker_url(&self) -> &str;
}
