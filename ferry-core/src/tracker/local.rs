//! In-process tracker client backed directly by a shared registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::Registry;
use super::types::{ChunkHolders, FileParts, PeerRecord, TrackerClient, TrackerError};

/// Tracker client that calls a [`Registry`] in the same process.
///
/// Never fails; useful for embedded setups and for driving the engine in
/// tests without an HTTP hop.
#[derive(Debug, Clone)]
pub struct InProcessTracker {
    registry: Arc<Registry>,
}

impl InProcessTracker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl TrackerClient for InProcessTracker {
    async fn register_peer(
        &self,
        addr: &str,
        public_ip: Option<&str>,
    ) -> Result<(), TrackerError> {
        self.registry
            .register_peer(addr, public_ip.map(str::to_string));
        Ok(())
    }

    async fn remove_peer(&self, addr: &str) -> Result<(), TrackerError> {
        self.registry.remove_peer(addr);
        Ok(())
    }

    async fn update_file_parts(
        &self,
        addr: &str,
        public_ip: Option<&str>,
        file_parts: FileParts,
    ) -> Result<(), TrackerError> {
        self.registry
            .update_file_parts(addr, public_ip.map(str::to_string), file_parts);
        Ok(())
    }

    async fn retract_file_parts(
        &self,
        addr: &str,
        chunk_names: Vec<String>,
    ) -> Result<(), TrackerError> {
        self.registry.retract_file_parts(addr, &chunk_names);
        Ok(())
    }

    async fn query_file_parts(
        &self,
        chunk_name: &str,
        exclude_addr: &str,
    ) -> Result<ChunkHolders, TrackerError> {
        Ok(self.registry.query_chunk_holders(chunk_name, exclude_addr))
    }

    async fn list_peers(&self) -> Result<HashMap<String, PeerRecord>, TrackerError> {
        Ok(self.registry.list_peers())
    }

    fn tracker_url(&self) -> &str {
        "in-process"
    }
}
