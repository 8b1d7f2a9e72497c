//! Direct peer-to-peer chunk fetching.

use async_trait::async_trait;

use super::TransferError;
use crate::config::NetworkConfig;
use crate::tracker::protocol::{DOWNLOAD_QUERY_PARAM, routes};

/// Pulls raw chunk bytes from a holder by chunk name.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Fetches the complete bytes of `chunk` from `holder`.
    ///
    /// # Errors
    ///
    /// - `TransferError::ChunkNotFound` - If the holder does not have the chunk
    /// - `TransferError::HolderStatus` - If the holder answers with another failure status
    /// - `TransferError::HolderUnreachable` / `Timeout` - If the holder cannot be reached in time
    async fn fetch_chunk(&self, holder: &str, chunk: &str) -> Result<Vec<u8>, TransferError>;
}

/// Fetches chunks over the peer `GET /download?filename=` endpoint.
pub struct HttpChunkFetcher {
    client: reqwest::Client,
}

impl HttpChunkFetcher {
    /// Creates a fetcher bounded by the configured fetch timeout.
    ///
    /// # Errors
    ///
    /// - `TransferError::HolderUnreachable` - If the HTTP client cannot be built
    pub fn new(config: &NetworkConfig) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransferError::HolderUnreachable {
                holder: String::new(),
                reason: format!("HTTP client creation failed: {e}"),
            })?;
        Ok(Self { client })
    }

    pub(crate) fn download_url(holder: &str, chunk: &str) -> String {
        format!(
            "http://{holder}{}?{DOWNLOAD_QUERY_PARAM}={chunk}",
            routes::DOWNLOAD
        )
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn fetch_chunk(&self, holder: &str, chunk: &str) -> Result<Vec<u8>, TransferError> {
        let url = Self::download_url(holder, chunk);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::Timeout {
                    holder: holder.to_string(),
                }
            } else {
                TransferError::HolderUnreachable {
                    holder: holder.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                404 => TransferError::ChunkNotFound {
                    holder: holder.to_string(),
                    chunk: chunk.to_string(),
                },
                code => TransferError::HolderStatus {
                    holder: holder.to_string(),
                    status: code,
                },
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::Timeout {
                    holder: holder.to_string(),
                }
            } else {
                TransferError::HolderUnreachable {
                    holder: holder.to_string(),
                    reason: format!("Failed to read chunk body: {e}"),
                }
            }
        })?;

        tracing::debug!("Fetched {} ({} bytes) from {}", chunk, bytes.len(), holder);
        Ok(bytes.to_vec())
    }
}
