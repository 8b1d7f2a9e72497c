//! Fan-out/fan-in download orchestration.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use super::fetcher::{ChunkFetcher, HttpChunkFetcher};
use super::{ChunkFailure, TransferError};
use crate::config::NetworkConfig;
use crate::storage::{ChunkName, ChunkStore, validate_file_hash};
use crate::tracker::{ChunkHolders, TrackerClient};

/// One chunk that was fetched and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub index: u32,
    pub chunk: String,
    /// Holder the bytes came from
    pub holder: String,
    pub len: u64,
}

/// Result of a download where every chunk index succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub file_hash: String,
    /// Outcomes ordered by index
    pub chunks: Vec<ChunkOutcome>,
}

impl DownloadReport {
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.len).sum()
    }
}

/// Peer-side orchestrator pulling a file's chunks from the swarm.
///
/// Bound to one tracker and to the local peer's identity, which is always
/// excluded from holder lookups.
#[derive(Clone)]
pub struct DistributionEngine {
    tracker: Arc<dyn TrackerClient>,
    fetcher: Arc<dyn ChunkFetcher>,
    store: ChunkStore,
    self_address: String,
}

impl DistributionEngine {
    pub fn new(
        tracker: Arc<dyn TrackerClient>,
        fetcher: Arc<dyn ChunkFetcher>,
        store: ChunkStore,
        self_address: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            fetcher,
            store,
            self_address: self_address.into(),
        }
    }

    /// Creates an engine fetching over HTTP with the configured timeout.
    ///
    /// # Errors
    ///
    /// - `TransferError::HolderUnreachable` - If the HTTP client cannot be built
    pub fn with_http(
        tracker: Arc<dyn TrackerClient>,
        store: ChunkStore,
        self_address: impl Into<String>,
        config: &NetworkConfig,
    ) -> Result<Self, TransferError> {
        let fetcher = HttpChunkFetcher::new(config)?;
        Ok(Self::new(tracker, Arc::new(fetcher), store, self_address))
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Downloads chunks `0..part_count` of `file_hash` into the local store.
    ///
    /// Spawns one task per index. Each task queries holders, picks one
    /// uniformly at random, fetches the bytes and stores them verified against
    /// the hash that holder advertised. A failing task never aborts its
    /// siblings; all tasks are joined before the result is reported. Does not
    /// assemble the file.
    ///
    /// # Errors
    ///
    /// - `TransferError::Storage` - If `file_hash` cannot name chunks
    /// - `TransferError::Incomplete` - If any index failed, carrying every
    ///   failure ordered by index
    pub async fn download_file(
        &self,
        file_hash: &str,
        part_count: u32,
    ) -> Result<DownloadReport, TransferError> {
        validate_file_hash(file_hash)?;
        tracing::info!(
            "Downloading {} chunks of {} via {}",
            part_count,
            file_hash,
            self.tracker.tracker_url()
        );

        let tasks: Vec<_> = (0..part_count)
            .map(|index| {
                let engine = self.clone();
                let file_hash = file_hash.to_string();
                tokio::spawn(async move { engine.fetch_index(&file_hash, index).await })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;

        let mut chunks = Vec::new();
        let mut failures = Vec::new();
        for (index, joined) in (0..part_count).zip(results) {
            let chunk = format!("{file_hash}_{index}");
            let result = joined.unwrap_or_else(|e| {
                Err(TransferError::TaskAborted {
                    reason: e.to_string(),
                })
            });

            match result {
                Ok(outcome) => chunks.push(outcome),
                Err(error) => {
                    tracing::warn!("Chunk {} failed: {}", chunk, error);
                    failures.push(ChunkFailure {
                        index,
                        chunk,
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                "Download of {} incomplete: {} of {} chunks failed",
                file_hash,
                failures.len(),
                part_count
            );
            return Err(TransferError::Incomplete { failures });
        }

        tracing::info!("Downloaded all {} chunks of {}", part_count, file_hash);
        Ok(DownloadReport {
            file_hash: file_hash.to_string(),
            chunks,
        })
    }

    async fn fetch_index(
        &self,
        file_hash: &str,
        index: u32,
    ) -> Result<ChunkOutcome, TransferError> {
        let name = ChunkName::new(file_hash, index)?;
        let chunk = name.to_string();

        let holders = self
            .tracker
            .query_file_parts(&chunk, &self.self_address)
            .await?;

        let Some((holder, expected_hash)) = pick_holder(&holders, &self.self_address) else {
            return Err(TransferError::NoHolders { chunk });
        };
        tracing::debug!("Fetching {} from {} ({} candidates)", chunk, holder, holders.len());

        let bytes = self.fetcher.fetch_chunk(&holder, &chunk).await?;
        self.store
            .store_chunk(&name, &bytes, Some(&expected_hash))
            .await?;

        Ok(ChunkOutcome {
            index,
            chunk,
            holder,
            len: bytes.len() as u64,
        })
    }
}

/// Picks a holder uniformly at random, never the local peer.
fn pick_holder(holders: &ChunkHolders, self_address: &str) -> Option<(String, String)> {
    let candidates: Vec<(&String, &String)> = holders
        .iter()
        .filter(|(addr, _)| addr.as_str() != self_address)
        .collect();

    candidates
        .choose(&mut rand::rng())
        .map(|(addr, hash)| (addr.to_string(), hash.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::storage::StorageError;
    use crate::storage::sha256_hex;
    use crate::storage::test_fixtures::create_temp_chunk_store;
    use crate::tracker::{FileParts, InProcessTracker, Registry};

    const FILE_HASH: &str = "feedface";

    /// Serves bytes from a fixed table and records every request.
    #[derive(Default)]
    struct MockFetcher {
        chunks: HashMap<(String, String), Vec<u8>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockFetcher {
        fn serve(mut self, holder: &str, chunk: &str, bytes: &[u8]) -> Self {
            self.chunks
                .insert((holder.to_string(), chunk.to_string()), bytes.to_vec());
            self
        }
    }

    #[async_trait]
    impl ChunkFetcher for MockFetcher {
        async fn fetch_chunk(&self, holder: &str, chunk: &str) -> Result<Vec<u8>, TransferError> {
            self.calls.lock().push((holder.to_string(), chunk.to_string()));
            self.chunks
                .get(&(holder.to_string(), chunk.to_string()))
                .cloned()
                .ok_or_else(|| TransferError::ChunkNotFound {
                    holder: holder.to_string(),
                    chunk: chunk.to_string(),
                })
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl ChunkFetcher for PanickingFetcher {
        async fn fetch_chunk(&self, _holder: &str, _chunk: &str) -> Result<Vec<u8>, TransferError> {
            panic!("fetcher exploded");
        }
    }

    fn chunk_bytes(index: u32) -> Vec<u8> {
        format!("chunk-{index}-payload").into_bytes()
    }

    fn advertise(registry: &Registry, holder: &str, indices: &[u32]) {
        let parts: FileParts = indices
            .iter()
            .map(|i| (format!("{FILE_HASH}_{i}"), sha256_hex(&chunk_bytes(*i))))
            .collect();
        registry.update_file_parts(holder, None, parts);
    }

    fn engine_with(
        registry: &Arc<Registry>,
        fetcher: Arc<dyn ChunkFetcher>,
        store: ChunkStore,
    ) -> DistributionEngine {
        let tracker = Arc::new(InProcessTracker::new(Arc::clone(registry)));
        DistributionEngine::new(tracker, fetcher, store, "self:5000")
    }

    #[tokio::test]
    async fn test_download_all_chunks() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "holder:4000", &[0, 1, 2]);

        let mut fetcher = MockFetcher::default();
        for i in 0..3 {
            fetcher = fetcher.serve("holder:4000", &format!("{FILE_HASH}_{i}"), &chunk_bytes(i));
        }

        let engine = engine_with(&registry, Arc::new(fetcher), store.clone());
        let report = engine.download_file(FILE_HASH, 3).await.unwrap();

        assert_eq!(report.chunks.len(), 3);
        assert_eq!(
            report.chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(report.chunks.iter().all(|c| c.holder == "holder:4000"));
        for i in 0..3 {
            let name = ChunkName::new(FILE_HASH, i).unwrap();
            assert_eq!(store.read_chunk(&name).await.unwrap(), chunk_bytes(i));
        }
    }

    #[tokio::test]
    async fn test_missing_holder_fails_only_that_index() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "holder:4000", &[0, 1, 3]);

        let mut fetcher = MockFetcher::default();
        for i in [0, 1, 3] {
            fetcher = fetcher.serve("holder:4000", &format!("{FILE_HASH}_{i}"), &chunk_bytes(i));
        }
        let fetcher = Arc::new(fetcher);

        let engine = engine_with(&registry, fetcher.clone(), store.clone());
        let error = engine.download_file(FILE_HASH, 4).await.unwrap_err();

        let TransferError::Incomplete { failures } = &error else {
            panic!("Expected incomplete download, got {error:?}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert_eq!(failures[0].chunk, format!("{FILE_HASH}_2"));
        assert!(matches!(failures[0].error, TransferError::NoHolders { .. }));

        // Siblings ran to completion and were stored
        assert_eq!(fetcher.calls.lock().len(), 3);
        for i in [0, 1, 3] {
            let name = ChunkName::new(FILE_HASH, i).unwrap();
            assert!(store.has_chunk(&name).await);
        }
        assert!(!store.has_chunk(&ChunkName::new(FILE_HASH, 2).unwrap()).await);
    }

    #[tokio::test]
    async fn test_all_failures_reported_in_index_order() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        // Advertised but never served: every fetch is a 404
        advertise(&registry, "holder:4000", &[0, 1, 2, 3, 4]);

        let engine = engine_with(&registry, Arc::new(MockFetcher::default()), store);
        let error = engine.download_file(FILE_HASH, 5).await.unwrap_err();

        assert_eq!(error.failed_indices(), vec![0, 1, 2, 3, 4]);
        let TransferError::Incomplete { failures } = error else {
            panic!("Expected incomplete download");
        };
        assert!(failures.iter().all(|f| f.error.is_not_found()));
    }

    #[tokio::test]
    async fn test_corrupt_bytes_are_rejected() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "holder:4000", &[0, 1]);

        let fetcher = MockFetcher::default()
            .serve("holder:4000", &format!("{FILE_HASH}_0"), &chunk_bytes(0))
            .serve("holder:4000", &format!("{FILE_HASH}_1"), b"tampered");

        let engine = engine_with(&registry, Arc::new(fetcher), store.clone());
        let error = engine.download_file(FILE_HASH, 2).await.unwrap_err();

        let TransferError::Incomplete { failures } = error else {
            panic!("Expected incomplete download");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(matches!(
            failures[0].error,
            TransferError::Storage(StorageError::ChunkHashMismatch { .. })
        ));
        assert!(store.has_chunk(&ChunkName::new(FILE_HASH, 0).unwrap()).await);
        assert!(!store.has_chunk(&ChunkName::new(FILE_HASH, 1).unwrap()).await);
    }

    #[tokio::test]
    async fn test_never_fetches_from_self() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "self:5000", &[0]);

        let fetcher = Arc::new(
            MockFetcher::default().serve("self:5000", &format!("{FILE_HASH}_0"), &chunk_bytes(0)),
        );
        let engine = engine_with(&registry, fetcher.clone(), store);
        let error = engine.download_file(FILE_HASH, 1).await.unwrap_err();

        assert_eq!(error.failed_indices(), vec![0]);
        assert!(fetcher.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_holder_choice_spreads_across_candidates() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "a:4000", &[0]);
        advertise(&registry, "b:4000", &[0]);

        let chunk = format!("{FILE_HASH}_0");
        let fetcher = Arc::new(
            MockFetcher::default()
                .serve("a:4000", &chunk, &chunk_bytes(0))
                .serve("b:4000", &chunk, &chunk_bytes(0)),
        );
        let engine = engine_with(&registry, fetcher.clone(), store);

        for _ in 0..64 {
            engine.download_file(FILE_HASH, 1).await.unwrap();
        }

        let holders: HashSet<String> = fetcher
            .calls
            .lock()
            .iter()
            .map(|(holder, _)| holder.clone())
            .collect();
        assert_eq!(holders.len(), 2, "random choice should reach both holders");
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_as_aborted() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        advertise(&registry, "holder:4000", &[0]);

        let engine = engine_with(&registry, Arc::new(PanickingFetcher), store);
        let error = engine.download_file(FILE_HASH, 1).await.unwrap_err();

        let TransferError::Incomplete { failures } = error else {
            panic!("Expected incomplete download");
        };
        assert!(matches!(failures[0].error, TransferError::TaskAborted { .. }));
    }

    #[tokio::test]
    async fn test_zero_parts_and_invalid_hash() {
        let (_temp_dir, store) = create_temp_chunk_store(64);
        let registry = Arc::new(Registry::default());
        let engine = engine_with(&registry, Arc::new(MockFetcher::default()), store);

        let report = engine.download_file(FILE_HASH, 0).await.unwrap();
        assert!(report.chunks.is_empty());
        assert_eq!(report.total_bytes(), 0);

        let error = engine.download_file("../x", 2).await.unwrap_err();
        assert!(matches!(
            error,
            TransferError::Storage(StorageError::InvalidFileHash { .. })
        ));
    }
}
