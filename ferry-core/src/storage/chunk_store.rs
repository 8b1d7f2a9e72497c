//! File-based chunk storage implementation

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{ChunkName, StorageError, validate_file_hash};
use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_FILE_BUFFER_SIZE, StorageConfig};

/// Suffix of in-flight chunk writes. Never parses as a chunk name.
const PARTIAL_SUFFIX: &str = ".part";

/// One chunk produced by [`ChunkStore::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub name: ChunkName,
    /// SHA-256 of the chunk's own bytes
    pub hash: String,
    pub len: u64,
}

/// Flat-directory chunk storage.
///
/// Every chunk lives in `chunk_dir` as a file named `<file_hash>_<index>`.
/// Only the owning peer process writes here; concurrent writers always
/// target distinct chunk names.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunk_dir: PathBuf,
    chunk_size: usize,
    buffer_size: usize,
}

impl ChunkStore {
    /// Creates a store rooted at `chunk_dir` with the default 1 MiB chunk size.
    pub fn new(chunk_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_dir: chunk_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer_size: DEFAULT_FILE_BUFFER_SIZE,
        }
    }

    /// Creates a store from storage configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            chunk_dir: config.chunk_dir.clone(),
            chunk_size: config.chunk_size.max(1),
            buffer_size: config.file_buffer_size.max(1),
        }
    }

    /// Overrides the maximum chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_dir(&self) -> &Path {
        &self.chunk_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the on-disk path of a chunk.
    pub fn chunk_path(&self, name: &ChunkName) -> PathBuf {
        self.chunk_dir.join(name.to_string())
    }

    fn partial_path(&self, name: &ChunkName) -> PathBuf {
        self.chunk_dir.join(format!("{name}{PARTIAL_SUFFIX}"))
    }

    /// Splits a file into content-addressed chunks inside the chunk directory.
    ///
    /// Streams the file once to compute its SHA-256, then a second time copying
    /// successive windows of at most `chunk_size` bytes into `<file_hash>_<index>`.
    /// Each chunk's hash covers only its own bytes. An empty file yields no chunks.
    ///
    /// Chunks are written through `.part` temporaries. If the split fails midway,
    /// the chunks it already produced are removed, so a partial set never shows
    /// up in the inventory.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the source cannot be read or a chunk file cannot be created
    pub async fn split(&self, source: &Path) -> Result<Vec<ChunkEntry>, StorageError> {
        let mut file = File::open(source).await?;
        let file_hash = self.hash_reader(&mut file).await?;
        file.seek(SeekFrom::Start(0)).await?;

        fs::create_dir_all(&self.chunk_dir).await?;
        let entries = self.write_chunks(&file_hash, &mut file).await?;

        tracing::info!(
            "Split {} into {} chunks (file hash {})",
            source.display(),
            entries.len(),
            file_hash
        );

        Ok(entries)
    }

    async fn write_chunks<R: AsyncRead + Unpin>(
        &self,
        file_hash: &str,
        reader: &mut R,
    ) -> Result<Vec<ChunkEntry>, StorageError> {
        let mut entries: Vec<ChunkEntry> = Vec::new();
        let mut index: u32 = 0;

        loop {
            let name = ChunkName::new(file_hash, index)?;
            let copied = match self.write_next_chunk(reader, &name).await {
                Ok(copied) => copied,
                Err(e) => {
                    tracing::warn!("Split of {} failed at chunk {}: {}", file_hash, index, e);
                    for entry in &entries {
                        let _ = fs::remove_file(self.chunk_path(&entry.name)).await;
                    }
                    return Err(e.into());
                }
            };

            let Some((hash, len)) = copied else {
                break;
            };
            let full = len == self.chunk_size as u64;
            entries.push(ChunkEntry { name, hash, len });

            if !full {
                break;
            }
            index += 1;
        }

        Ok(entries)
    }

    /// Copies up to one chunk from `reader` into place under `name`.
    ///
    /// Returns `None` once the reader is exhausted. The `.part` temporary is
    /// removed on any failure.
    async fn write_next_chunk<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        name: &ChunkName,
    ) -> std::io::Result<Option<(String, u64)>> {
        let partial_path = self.partial_path(name);
        let result = self.copy_window(reader, &partial_path).await;

        match result {
            Ok(Some(copied)) => {
                if let Err(e) = fs::rename(&partial_path, self.chunk_path(name)).await {
                    let _ = fs::remove_file(&partial_path).await;
                    return Err(e);
                }
                Ok(Some(copied))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                let _ = fs::remove_file(&partial_path).await;
                Err(e)
            }
        }
    }

    async fn copy_window<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        partial_path: &Path,
    ) -> std::io::Result<Option<(String, u64)>> {
        let mut buffer = vec![0u8; self.buffer_size.min(self.chunk_size)];
        let mut hasher = Sha256::new();
        let mut written = 0usize;
        let mut out: Option<File> = None;

        while written < self.chunk_size {
            let want = buffer.len().min(self.chunk_size - written);
            let read = reader.read(&mut buffer[..want]).await?;
            if read == 0 {
                break;
            }
            if out.is_none() {
                out = Some(File::create(partial_path).await?);
            }
            if let Some(file) = out.as_mut() {
                file.write_all(&buffer[..read]).await?;
            }
            hasher.update(&buffer[..read]);
            written += read;
        }

        let Some(mut file) = out else {
            return Ok(None);
        };
        file.flush().await?;
        file.sync_all().await?;

        Ok(Some((hex::encode(hasher.finalize()), written as u64)))
    }

    /// Reassembles a file from its chunks in index order.
    ///
    /// Stops successfully at the first missing index, so a gap truncates the
    /// output to the chunks before it. Chunk hashes are not checked here; see
    /// [`ChunkStore::combine_verified`]. Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// - `StorageError::InvalidFileHash` - If `file_hash` cannot name chunks
    /// - `StorageError::Io` - If the output cannot be written or a chunk read fails
    ///   for a reason other than absence
    pub async fn combine(&self, file_hash: &str, output: &Path) -> Result<u32, StorageError> {
        validate_file_hash(file_hash)?;

        let mut output_file = File::create(output).await?;
        let mut index: u32 = 0;

        loop {
            let name = ChunkName::new(file_hash, index)?;
            match File::open(self.chunk_path(&name)).await {
                Ok(mut chunk) => {
                    tokio::io::copy(&mut chunk, &mut output_file).await?;
                    index += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }

        output_file.flush().await?;
        tracing::info!(
            "Combined {} chunks of {} into {}",
            index,
            file_hash,
            output.display()
        );

        Ok(index)
    }

    /// Reassembles a file and checks the result against its content address.
    ///
    /// The output is removed when its SHA-256 differs from `file_hash`, which
    /// covers corrupt chunks as well as truncation by a missing index.
    ///
    /// # Errors
    ///
    /// - `StorageError::FileHashMismatch` - If the assembled bytes hash differently
    /// - Any error from [`ChunkStore::combine`]
    pub async fn combine_verified(
        &self,
        file_hash: &str,
        output: &Path,
    ) -> Result<u32, StorageError> {
        let count = self.combine(file_hash, output).await?;

        let actual = hash_file(output, self.buffer_size).await?;
        if !actual.eq_ignore_ascii_case(file_hash) {
            tracing::warn!(
                "Combined output {} failed verification: expected {}, got {}",
                output.display(),
                file_hash,
                actual
            );
            fs::remove_file(output).await?;
            return Err(StorageError::FileHashMismatch {
                expected: file_hash.to_string(),
                actual,
            });
        }

        Ok(count)
    }

    /// Writes chunk bytes under their name, verifying them first.
    ///
    /// Bytes land in a `.part` temporary that is renamed into place, so a
    /// failed or corrupt transfer is never visible under the chunk name.
    /// Returns the SHA-256 of the stored bytes.
    ///
    /// # Errors
    ///
    /// - `StorageError::ChunkHashMismatch` - If `expected_hash` is given and differs
    /// - `StorageError::Io` - If the chunk cannot be written
    pub async fn store_chunk(
        &self,
        name: &ChunkName,
        bytes: &[u8],
        expected_hash: Option<&str>,
    ) -> Result<String, StorageError> {
        let actual = sha256_hex(bytes);
        if let Some(expected) = expected_hash {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(StorageError::ChunkHashMismatch {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        fs::create_dir_all(&self.chunk_dir).await?;

        let final_path = self.chunk_path(name);
        let partial_path = self.partial_path(name);
        fs::write(&partial_path, bytes).await?;
        if let Err(e) = fs::rename(&partial_path, &final_path).await {
            let _ = fs::remove_file(&partial_path).await;
            return Err(e.into());
        }

        tracing::debug!("Stored chunk {} ({} bytes)", name, bytes.len());
        Ok(actual)
    }

    /// Reads a whole chunk into memory.
    ///
    /// # Errors
    ///
    /// - `StorageError::ChunkNotFound` - If no chunk with this name is stored
    /// - `StorageError::Io` - If the chunk exists but cannot be read
    pub async fn read_chunk(&self, name: &ChunkName) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.chunk_path(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::ChunkNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks if a chunk is stored locally.
    pub async fn has_chunk(&self, name: &ChunkName) -> bool {
        fs::try_exists(self.chunk_path(name)).await.unwrap_or(false)
    }

    /// Builds the local inventory by re-hashing every chunk on disk.
    ///
    /// Only regular files whose names parse as [`ChunkName`] are included; any
    /// other entry is skipped. Hashes always come from the bytes currently on
    /// disk. A missing chunk directory is an empty inventory.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the directory or a chunk cannot be read
    pub async fn scan_inventory(&self) -> Result<HashMap<String, String>, StorageError> {
        let mut inventory = HashMap::new();

        let mut entries = match fs::read_dir(&self.chunk_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(inventory),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Ok(name) = file_name.parse::<ChunkName>() else {
                tracing::trace!("Skipping non-chunk file {}", file_name);
                continue;
            };

            let hash = hash_file(&entry.path(), self.buffer_size).await?;
            inventory.insert(name.to_string(), hash);
        }

        tracing::debug!(
            "Scanned {} chunks in {}",
            inventory.len(),
            self.chunk_dir.display()
        );
        Ok(inventory)
    }

    async fn hash_reader<R: AsyncRead + Unpin>(&self, reader: &mut R) -> std::io::Result<String> {
        hash_stream(reader, self.buffer_size).await
    }
}

/// SHA-256 of a byte slice as lower-case hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn hash_file(path: &Path, buffer_size: usize) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    hash_stream(&mut file, buffer_size).await
}

async fn hash_stream<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer_size: usize,
) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
