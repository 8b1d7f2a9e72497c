//! Tracker-side registry of live peers and chunk holders.
//!
//! Two correlated views live behind one lock: `peers` (address to record)
//! and `files` (chunk name to holder address to chunk hash). Every operation
//! updates both under the same guard, so no reader observes one view ahead
//! of the other.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::types::{ChunkHolders, FileParts, PeerRecord};
use crate::config::TrackerConfig;

/// Clients without a discovered IP may send an empty string.
fn normalize_ip(public_ip: Option<String>) -> Option<String> {
    public_ip.filter(|ip| !ip.is_empty())
}

#[derive(Debug, Default)]
struct RegistryState {
    peers: HashMap<String, PeerRecord>,
    files: HashMap<String, ChunkHolders>,
}

impl RegistryState {
    /// Refreshes an existing record or creates one, keeping its holdings.
    ///
    /// A supplied `public_ip` replaces the stored one; `None` keeps it.
    fn touch(
        &mut self,
        addr: &str,
        public_ip: Option<String>,
        now: DateTime<Utc>,
    ) -> &mut PeerRecord {
        let record = self
            .peers
            .entry(addr.to_string())
            .or_insert_with(|| PeerRecord {
                addr: addr.to_string(),
                public_ip: None,
                last_seen: now,
                file_parts: FileParts::new(),
            });
        record.last_seen = now;
        if let Some(ip) = normalize_ip(public_ip) {
            record.public_ip = Some(ip);
        }
        record
    }

    /// Deletes the record and sweeps `addr` out of every holder map.
    fn purge(&mut self, addr: &str) -> Option<PeerRecord> {
        let record = self.peers.remove(addr);
        self.files.retain(|_, holders| {
            holders.remove(addr);
            !holders.is_empty()
        });
        record
    }

    fn evict_stale(&mut self, now: DateTime<Utc>, window: TimeDelta) -> Vec<String> {
        let stale: Vec<String> = self
            .peers
            .values()
            .filter(|record| now.signed_duration_since(record.last_seen) > window)
            .map(|record| record.addr.clone())
            .collect();

        for addr in &stale {
            self.purge(addr);
        }
        stale
    }
}

/// In-memory peer and chunk-holder registry.
///
/// The raw maps are never exposed; callers receive owned snapshots.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    staleness_window: TimeDelta,
}

impl Default for Registry {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl Registry {
    /// Creates an empty registry evicting peers silent for longer than `staleness_window`.
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            staleness_window: TimeDelta::from_std(staleness_window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.staleness_window)
    }

    /// Creates or refreshes the record for `addr`.
    ///
    /// Registration overwrites `last_seen` and `public_ip` (a missing IP clears
    /// the stored one) but neither adds nor drops holdings; advertising is left
    /// to [`Registry::update_file_parts`].
    pub fn register_peer(&self, addr: &str, public_ip: Option<String>) {
        self.register_peer_at(addr, public_ip, Utc::now());
    }

    pub(crate) fn register_peer_at(
        &self,
        addr: &str,
        public_ip: Option<String>,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock();
        state.touch(addr, None, now).public_ip = normalize_ip(public_ip);
        tracing::info!("Peer registered: {}", addr);
    }

    /// Removes a peer and purges it from every chunk's holder map.
    ///
    /// Chunk entries left without holders are dropped. Returns whether the
    /// peer was known; removing an unknown address is not an error.
    pub fn remove_peer(&self, addr: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.purge(addr).is_some();
        if removed {
            tracing::info!("Peer removed: {}", addr);
        } else {
            tracing::debug!("Remove requested for unknown peer {}", addr);
        }
        removed
    }

    /// Merges `holdings` into the chunk index under `addr` and refreshes the peer.
    ///
    /// Additive: chunks not named in `holdings` keep their previous entries.
    /// An address without a record gets one, so the index never references
    /// an unknown peer.
    pub fn update_file_parts(&self, addr: &str, public_ip: Option<String>, holdings: FileParts) {
        self.update_file_parts_at(addr, public_ip, holdings, Utc::now());
    }

    pub(crate) fn update_file_parts_at(
        &self,
        addr: &str,
        public_ip: Option<String>,
        holdings: FileParts,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock();
        let count = holdings.len();

        for (chunk_name, chunk_hash) in &holdings {
            state
                .files
                .entry(chunk_name.clone())
                .or_default()
                .insert(addr.to_string(), chunk_hash.clone());
        }
        state.touch(addr, public_ip, now).file_parts.extend(holdings);

        tracing::debug!("Peer {} advertised {} chunks", addr, count);
    }

    /// Withdraws the named chunks from `addr`'s holdings.
    ///
    /// Unknown peers and chunk names are ignored. A known peer's `last_seen`
    /// is refreshed.
    pub fn retract_file_parts(&self, addr: &str, chunk_names: &[String]) {
        let mut state = self.state.lock();
        let Some(record) = state.peers.get_mut(addr) else {
            tracing::debug!("Retract requested for unknown peer {}", addr);
            return;
        };

        record.last_seen = Utc::now();
        for chunk_name in chunk_names {
            record.file_parts.remove(chunk_name);
        }

        for chunk_name in chunk_names {
            let now_empty = match state.files.get_mut(chunk_name) {
                Some(holders) => {
                    holders.remove(addr);
                    holders.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.files.remove(chunk_name);
            }
        }

        tracing::debug!("Peer {} retracted {} chunks", addr, chunk_names.len());
    }

    /// Returns live holders of `chunk_name`, never including `exclude_addr`.
    ///
    /// Runs a liveness sweep first so stale peers are never offered. An
    /// unknown chunk yields an empty map.
    pub fn query_chunk_holders(&self, chunk_name: &str, exclude_addr: &str) -> ChunkHolders {
        self.query_chunk_holders_at(chunk_name, exclude_addr, Utc::now())
    }

    pub(crate) fn query_chunk_holders_at(
        &self,
        chunk_name: &str,
        exclude_addr: &str,
        now: DateTime<Utc>,
    ) -> ChunkHolders {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now);

        let holders: ChunkHolders = state
            .files
            .get(chunk_name)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|(addr, _)| addr.as_str() != exclude_addr)
                    .map(|(addr, hash)| (addr.clone(), hash.clone()))
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!("Chunk {} requested: {} holders", chunk_name, holders.len());
        holders
    }

    /// Returns a liveness-swept snapshot of every peer record.
    pub fn list_peers(&self) -> HashMap<String, PeerRecord> {
        self.list_peers_at(Utc::now())
    }

    pub(crate) fn list_peers_at(&self, now: DateTime<Utc>) -> HashMap<String, PeerRecord> {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now);
        state.peers.clone()
    }

    /// Returns a liveness-swept snapshot of the chunk index.
    pub fn snapshot_files(&self) -> HashMap<String, ChunkHolders> {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, Utc::now());
        state.files.clone()
    }

    /// Evicts every peer silent for longer than the staleness window.
    ///
    /// Evicted peers are purged from the chunk index exactly as on removal.
    /// Returns the evicted addresses.
    pub fn liveness_sweep(&self) -> Vec<String> {
        self.liveness_sweep_at(Utc::now())
    }

    pub(crate) fn liveness_sweep_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now)
    }

    fn sweep_locked(&self, state: &mut RegistryState, now: DateTime<Utc>) -> Vec<String> {
        let evicted = state.evict_stale(now, self.staleness_window);
        for addr in &evicted {
            tracing::info!("Peer timed out: {}", addr);
        }
        evicted
    }

    /// Number of registered peers, without sweeping.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Number of chunk names with at least one holder, without sweeping.
    pub fn chunk_count(&self) -> usize {
        self.state.lock().files.len()
    }
}
