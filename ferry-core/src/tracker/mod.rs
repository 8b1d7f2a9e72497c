//! Tracker registry and the protocol peers use to reach it.
//!
//! The registry maps live peers to the chunks they hold. Peers talk to it
//! through [`TrackerClient`], either over HTTP or in-process.

pub mod client;
pub mod local;
pub mod protocol;
pub mod registry;
pub mod types;

// Re-export public API
pub use client::HttpTrackerClient;
pub use local::InProcessTracker;
pub use registry::Registry;
pub use types::{ChunkHolders, FileParts, PeerRecord, TrackerClient, TrackerError};
