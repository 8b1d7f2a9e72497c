//! The local peer: its identity, its on-disk inventory and its tracker session.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::FerryConfig;
use crate::storage::{ChunkEntry, ChunkStore};
use crate::tracker::{ChunkHolders, FileParts, HttpTrackerClient, PeerRecord, TrackerClient};
use crate::transfer::{ChunkFetcher, DistributionEngine, DownloadReport, HttpChunkFetcher};
use crate::{FerryError, Result};

/// Endpoint answering `{"ip": "<address>"}` for the caller's public address.
pub const DEFAULT_IP_DISCOVERY_URL: &str = "https://api.ipify.org?format=json";

/// Builds the `host:port` locator a peer registers and is fetched under.
pub fn peer_locator(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// A peer's view of itself.
///
/// `address` is the canonical identity used for every tracker call and is
/// the locator other peers fetch chunks from.
pub struct LocalPeer {
    address: String,
    public_ip: Option<String>,
    store: ChunkStore,
    tracker: Arc<dyn TrackerClient>,
    engine: DistributionEngine,
    advertise_after_download: bool,
}

impl LocalPeer {
    pub fn new(
        address: impl Into<String>,
        public_ip: Option<String>,
        store: ChunkStore,
        tracker: Arc<dyn TrackerClient>,
        fetcher: Arc<dyn ChunkFetcher>,
    ) -> Self {
        let address = address.into();
        let engine = DistributionEngine::new(
            Arc::clone(&tracker),
            fetcher,
            store.clone(),
            address.clone(),
        );

        Self {
            address,
            public_ip,
            store,
            tracker,
            engine,
            advertise_after_download: true,
        }
    }

    /// Creates a peer talking HTTP to the tracker at `tracker_addr`.
    ///
    /// # Errors
    ///
    /// - `FerryError::Tracker` / `Transfer` - If an HTTP client cannot be built
    pub fn connect(
        address: impl Into<String>,
        public_ip: Option<String>,
        tracker_addr: &str,
        config: &FerryConfig,
    ) -> Result<Self> {
        let tracker = Arc::new(HttpTrackerClient::new(tracker_addr, &config.network)?);
        let fetcher = Arc::new(HttpChunkFetcher::new(&config.network)?);
        let store = ChunkStore::from_config(&config.storage);

        Ok(Self::new(address, public_ip, store, tracker, fetcher)
            .with_advertise_after_download(config.storage.advertise_after_download))
    }

    /// Controls whether a download re-advertises the local inventory afterwards.
    pub fn with_advertise_after_download(mut self, enabled: bool) -> Self {
        self.advertise_after_download = enabled;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.public_ip.as_deref()
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<dyn TrackerClient> {
        &self.tracker
    }

    pub fn engine(&self) -> &DistributionEngine {
        &self.engine
    }

    /// Re-hashes every chunk on disk. Never trusts earlier results.
    ///
    /// # Errors
    ///
    /// - `FerryError::Storage` - If the chunk directory cannot be read
    pub async fn scan_local_inventory(&self) -> Result<FileParts> {
        Ok(self.store.scan_inventory().await?)
    }

    /// Scans local storage and merges the result into the tracker's index.
    ///
    /// Returns the number of chunks advertised.
    ///
    /// # Errors
    ///
    /// - `FerryError::Storage` - If the chunk directory cannot be read
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn advertise(&self) -> Result<usize> {
        let inventory = self.scan_local_inventory().await?;
        let count = inventory.len();
        self.tracker
            .update_file_parts(&self.address, self.public_ip(), inventory)
            .await?;

        tracing::info!("Advertised {} chunks as {}", count, self.address);
        Ok(count)
    }

    /// # Errors
    ///
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn register(&self) -> Result<()> {
        self.tracker
            .register_peer(&self.address, self.public_ip())
            .await?;
        tracing::info!(
            "Registered as {} with {}",
            self.address,
            self.tracker.tracker_url()
        );
        Ok(())
    }

    /// # Errors
    ///
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn unregister(&self) -> Result<()> {
        self.tracker.remove_peer(&self.address).await?;
        tracing::info!("Unregistered {}", self.address);
        Ok(())
    }

    /// # Errors
    ///
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn list_peers(&self) -> Result<HashMap<String, PeerRecord>> {
        Ok(self.tracker.list_peers().await?)
    }

    /// Returns holders of `chunk_name` other than this peer.
    ///
    /// # Errors
    ///
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn query_holders(&self, chunk_name: &str) -> Result<ChunkHolders> {
        Ok(self
            .tracker
            .query_file_parts(chunk_name, &self.address)
            .await?)
    }

    /// Withdraws chunks from this peer's advertised holdings.
    ///
    /// # Errors
    ///
    /// - `FerryError::Tracker` - If the tracker rejects or does not answer
    pub async fn retract(&self, chunk_names: Vec<String>) -> Result<()> {
        let count = chunk_names.len();
        self.tracker
            .retract_file_parts(&self.address, chunk_names)
            .await?;
        tracing::info!("Retracted {} chunks for {}", count, self.address);
        Ok(())
    }

    /// Splits `source` into the local store and advertises the new chunks.
    ///
    /// # Errors
    ///
    /// - `FerryError::Storage` - If the file cannot be split
    /// - `FerryError::Tracker` - If advertising fails
    pub async fn split_and_advertise(&self, source: &Path) -> Result<Vec<ChunkEntry>> {
        let entries = self.store.split(source).await?;

        let parts: FileParts = entries
            .iter()
            .map(|entry| (entry.name.to_string(), entry.hash.clone()))
            .collect();
        self.tracker
            .update_file_parts(&self.address, self.public_ip(), parts)
            .await?;

        Ok(entries)
    }

    /// Downloads every chunk of a file into the local store.
    ///
    /// When enabled, the local inventory is advertised afterwards, also after
    /// a partial failure, so fetched chunks become available to others.
    ///
    /// # Errors
    ///
    /// - `FerryError::Transfer` - If any chunk could not be fetched
    /// - `FerryError::Storage` / `Tracker` - If the follow-up advertise fails
    pub async fn download_file(&self, file_hash: &str, part_count: u32) -> Result<DownloadReport> {
        let result = self.engine.download_file(file_hash, part_count).await;

        if self.advertise_after_download {
            if let Err(e) = self.advertise().await {
                tracing::warn!("Advertising after download failed: {}", e);
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        Ok(result?)
    }

    /// Assembles a downloaded file, verifying it against `file_hash` unless told not to.
    ///
    /// # Errors
    ///
    /// - `FerryError::Storage` - If assembly or verification fails
    pub async fn combine(&self, file_hash: &str, output: &Path, verify: bool) -> Result<u32> {
        let count = if verify {
            self.store.combine_verified(file_hash, output).await?
        } else {
            self.store.combine(file_hash, output).await?
        };
        Ok(count)
    }
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Asks an ipify-style service for this host's public address.
///
/// # Errors
///
/// - `FerryError::IpDiscovery` - If the service is unreachable or answers unexpectedly
pub async fn discover_public_ip(client: &reqwest::Client, url: &str) -> Result<String> {
    let failed = |reason: String| FerryError::IpDiscovery {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("status {status}")));
    }

    let body: IpResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
    if body.ip.trim().is_empty() {
        return Err(failed("empty address".to_string()));
    }

    tracing::debug!("Discovered public IP {}", body.ip);
    Ok(body.ip)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::storage::test_fixtures::{create_temp_chunk_store, write_source_file};
    use crate::storage::{ChunkName, StorageError};
    use crate::tracker::{InProcessTracker, Registry};
    use crate::transfer::TransferError;

    /// Serves chunks straight out of other peers' stores.
    struct StoreFetcher {
        stores: HashMap<String, ChunkStore>,
    }

    #[async_trait]
    impl ChunkFetcher for StoreFetcher {
        async fn fetch_chunk(
            &self,
            holder: &str,
            chunk: &str,
        ) -> std::result::Result<Vec<u8>, TransferError> {
            let not_found = || TransferError::ChunkNotFound {
                holder: holder.to_string(),
                chunk: chunk.to_string(),
            };
            let store = self.stores.get(holder).ok_or_else(not_found)?;
            let name: ChunkName = chunk.parse()?;
            store.read_chunk(&name).await.map_err(|_| not_found())
        }
    }

    fn peer(
        address: &str,
        store: ChunkStore,
        registry: &Arc<Registry>,
        fetcher: Arc<dyn ChunkFetcher>,
    ) -> LocalPeer {
        let tracker = Arc::new(InProcessTracker::new(Arc::clone(registry)));
        LocalPeer::new(address, None, store, tracker, fetcher)
    }

    #[test]
    fn test_peer_locator() {
        assert_eq!(peer_locator("127.0.0.1", 4000), "127.0.0.1:4000");
    }

    #[tokio::test]
    async fn test_advertise_reflects_disk() {
        let (_temp_dir, store) = create_temp_chunk_store(8);
        let registry = Arc::new(Registry::default());
        let fetcher = Arc::new(StoreFetcher {
            stores: HashMap::new(),
        });
        let local = peer("a:4000", store.clone(), &registry, fetcher);

        std::fs::write(store.chunk_dir().join("abc_0"), b"zero").unwrap();
        std::fs::write(store.chunk_dir().join("readme.md"), b"skip").unwrap();

        assert_eq!(local.advertise().await.unwrap(), 1);
        let holders = registry.query_chunk_holders("abc_0", "other");
        assert_eq!(
            holders.get("a:4000").map(String::as_str),
            Some(crate::storage::sha256_hex(b"zero").as_str())
        );

        local.retract(vec!["abc_0".to_string()]).await.unwrap();
        assert!(registry.query_chunk_holders("abc_0", "other").is_empty());

        local.unregister().await.unwrap();
        assert!(local.list_peers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_peer_transfer_and_readvertise() {
        let (seed_dir, seed_store) = create_temp_chunk_store(16);
        let (_leech_dir, leech_store) = create_temp_chunk_store(16);
        let registry = Arc::new(Registry::default());

        let fetcher: Arc<dyn ChunkFetcher> = Arc::new(StoreFetcher {
            stores: HashMap::from([("seed:4000".to_string(), seed_store.clone())]),
        });
        let seed = peer("seed:4000", seed_store, &registry, Arc::clone(&fetcher));
        let leech = peer("leech:4001", leech_store, &registry, fetcher);

        let data: Vec<u8> = (0..100u8).collect();
        let source = write_source_file(seed_dir.path(), "source.bin", &data);

        seed.register().await.unwrap();
        leech.register().await.unwrap();
        let entries = seed.split_and_advertise(&source).await.unwrap();
        let file_hash = entries[0].name.file_hash().to_string();

        let report = leech
            .download_file(&file_hash, entries.len() as u32)
            .await
            .unwrap();
        assert_eq!(report.total_bytes(), 100);
        assert!(report.chunks.iter().all(|c| c.holder == "seed:4000"));

        let output = seed_dir.path().join("combined.bin");
        let count = leech.combine(&file_hash, &output, true).await.unwrap();
        assert_eq!(count as usize, entries.len());
        assert_eq!(std::fs::read(&output).unwrap(), data);

        // The leech now serves the chunks too
        let holders = seed.query_holders(&entries[0].name.to_string()).await.unwrap();
        assert_eq!(holders.keys().collect::<Vec<_>>(), vec!["leech:4001"]);
    }

    #[tokio::test]
    async fn test_partial_download_still_advertises_fetched_chunks() {
        let (seed_dir, seed_store) = create_temp_chunk_store(4);
        let (_leech_dir, leech_store) = create_temp_chunk_store(4);
        let registry = Arc::new(Registry::default());

        let fetcher: Arc<dyn ChunkFetcher> = Arc::new(StoreFetcher {
            stores: HashMap::from([("seed:4000".to_string(), seed_store.clone())]),
        });
        let seed = peer("seed:4000", seed_store, &registry, Arc::clone(&fetcher));
        let leech = peer("leech:4001", leech_store, &registry, fetcher);

        let source = write_source_file(seed_dir.path(), "source.bin", b"0123456789ab");
        let entries = seed.split_and_advertise(&source).await.unwrap();
        assert_eq!(entries.len(), 3);
        let file_hash = entries[0].name.file_hash().to_string();
        seed.retract(vec![entries[1].name.to_string()]).await.unwrap();

        let error = leech.download_file(&file_hash, 3).await.unwrap_err();
        match error {
            FerryError::Transfer(e) => assert_eq!(e.failed_indices(), vec![1]),
            other => panic!("Expected transfer failure, got {other:?}"),
        }

        let inventory = registry.list_peers()["leech:4001"].file_parts.clone();
        assert_eq!(inventory.len(), 2);

        let output = seed_dir.path().join("partial.bin");
        let result = leech.combine(&file_hash, &output, true).await;
        assert!(matches!(
            result,
            Err(FerryError::Storage(StorageError::FileHashMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_discover_public_ip_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let client = reqwest::Client::new();
        let result = discover_public_ip(&client, &url).await;
        assert!(matches!(result, Err(FerryError::IpDiscovery { .. })));
    }
}
