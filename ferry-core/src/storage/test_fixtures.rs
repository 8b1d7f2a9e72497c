//! Test fixtures for storage testing.
//!
//! Provides standardized chunk store setup for consistent testing across
//! storage, transfer and peer modules.

use std::path::{Path, PathBuf};

use super::ChunkStore;

/// Creates a chunk store in a fresh temporary directory.
///
/// The chunk directory is `<temp>/chunks` and already exists. Keep the
/// returned `TempDir` alive for as long as the store is used.
///
/// # Panics
///
/// Panics if temporary directory creation fails. This is acceptable in test
/// fixtures where failures indicate environment issues.
pub fn create_temp_chunk_store(chunk_size: usize) -> (tempfile::TempDir, ChunkStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let chunk_dir = temp_dir.path().join("chunks");
    std::fs::create_dir_all(&chunk_dir).unwrap();

    let store = ChunkStore::new(chunk_dir).with_chunk_size(chunk_size);
    (temp_dir, store)
}

/// Writes `bytes` to `dir/name` and returns the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_source_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
