//! HTTP tracker client with request building and status mapping

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::protocol::{
    QueryFilePartsRequest, RegisterPeerRequest, RemovePeerRequest, RetractFilePartsRequest,
    UpdateFilePartsRequest, routes,
};
use super::types::{ChunkHolders, FileParts, PeerRecord, TrackerClient, TrackerError};
use crate::config::NetworkConfig;

/// HTTP tracker client implementation
pub struct HttpTrackerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTrackerClient {
    /// Creates a client for the tracker at `tracker_addr`.
    ///
    /// Accepts either a bare `host:port` or a full `http://` URL. Uses network
    /// configuration for timeout and user agent settings.
    ///
    /// # Errors
    ///
    /// - `TrackerError::ConnectionFailed` - If the HTTP client cannot be built
    pub fn new(tracker_addr: &str, config: &NetworkConfig) -> Result<Self, TrackerError> {
        let base_url = Self::normalize_base_url(tracker_addr);
        let client = reqwest::Client::builder()
            .timeout(config.tracker_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TrackerError::ConnectionFailed {
                url: base_url.clone(),
                reason: format!("HTTP client creation failed: {e}"),
            })?;

        Ok(Self { base_url, client })
    }

    pub(crate) fn normalize_base_url(tracker_addr: &str) -> String {
        let trimmed = tracker_addr.trim().trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Sends a request and maps transport failures and non-2xx statuses.
    async fn send(
        &self,
        route: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TrackerError> {
        let url = self.url(route);

        let response = request.send().await.map_err(|e| {
            tracing::warn!("HTTP request to {} failed: {}", url, e);

            if e.is_timeout() {
                TrackerError::Timeout { url: url.clone() }
            } else {
                TrackerError::ConnectionFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Tracker {} returned error status: {}", url, status);
            return Err(TrackerError::ServerStatus {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn decode_json<T: DeserializeOwned>(
        &self,
        route: &str,
        response: reqwest::Response,
    ) -> Result<T, TrackerError> {
        let url = self.url(route);
        let body = response
            .bytes()
            .await
            .map_err(|e| TrackerError::ConnectionFailed {
                url: url.clone(),
                reason: format!("Failed to read response body: {e}"),
            })?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!("Failed to parse response from {}: {}", url, e);
            TrackerError::InvalidResponse {
                url,
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
    async fn register_peer(
        &self,
        addr: &str,
        public_ip: Option<&str>,
    ) -> Result<(), TrackerError> {
        let body = RegisterPeerRequest {
            addr: addr.to_string(),
            public_ip: public_ip.map(str::to_string),
        };
        let request = self.client.post(self.url(routes::REGISTER_PEER)).json(&body);
        self.send(routes::REGISTER_PEER, request).await?;

        tracing::debug!("Registered {} with tracker {}", addr, self.base_url);
        Ok(())
    }

    async fn remove_peer(&self, addr: &str) -> Result<(), TrackerError> {
        let body = RemovePeerRequest {
            addr: addr.to_string(),
        };
        let request = self.client.delete(self.url(routes::REMOVE_PEER)).json(&body);
        self.send(routes::REMOVE_PEER, request).await?;

        tracing::debug!("Unregistered {} from tracker {}", addr, self.base_url);
        Ok(())
    }

    async fn update_file_parts(
        &self,
        addr: &str,
        public_ip: Option<&str>,
        file_parts: FileParts,
    ) -> Result<(), TrackerError> {
        let count = file_parts.len();
        let body = UpdateFilePartsRequest {
            addr: addr.to_string(),
            public_ip: public_ip.map(str::to_string),
            file_parts,
        };
        let request = self
            .client
            .post(self.url(routes::UPDATE_PEER_FILE_PARTS))
            .json(&body);
        self.send(routes::UPDATE_PEER_FILE_PARTS, request).await?;

        tracing::debug!("Advertised {} chunks for {}", count, addr);
        Ok(())
    }

    async fn retract_file_parts(
        &self,
        addr: &str,
        chunk_names: Vec<String>,
    ) -> Result<(), TrackerError> {
        let body = RetractFilePartsRequest {
            addr: addr.to_string(),
            file_parts: chunk_names,
        };
        let request = self
            .client
            .post(self.url(routes::RETRACT_PEER_FILE_PARTS))
            .json(&body);
        self.send(routes::RETRACT_PEER_FILE_PARTS, request).await?;
        Ok(())
    }

    async fn query_file_parts(
        &self,
        chunk_name: &str,
        exclude_addr: &str,
    ) -> Result<ChunkHolders, TrackerError> {
        let body = QueryFilePartsRequest {
            file_name: chunk_name.to_string(),
            addr: exclude_addr.to_string(),
        };
        let request = self
            .client
            .post(self.url(routes::QUERY_FILE_PARTS))
            .json(&body);
        let response = self.send(routes::QUERY_FILE_PARTS, request).await?;
        let holders: ChunkHolders = self.decode_json(routes::QUERY_FILE_PARTS, response).await?;

        tracing::debug!("Tracker reports {} holders for {}", holders.len(), chunk_name);
        Ok(holders)
    }

    async fn list_peers(&self) -> Result<HashMap<String, PeerRecord>, TrackerError> {
        let request = self.client.get(self.url(routes::GET_PEERS));
        let response = self.send(routes::GET_PEERS, request).await?;
        self.decode_json(routes::GET_PEERS, response).await
    }

    fn tracker_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(
            HttpTrackerClient::normalize_base_url("127.0.0.1:8080"),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            HttpTrackerClient::normalize_base_url("http://tracker.local:8080/"),
            "http://tracker.local:8080"
        );
        assert_eq!(
            HttpTrackerClient::normalize_base_url(" https://tracker.local "),
            "https://tracker.local"
        );
    }

    #[test]
    fn test_route_urls() {
        let client = HttpTrackerClient::new("localhost:9000", &NetworkConfig::default()).unwrap();
        assert_eq!(client.tracker_url(), "http://localhost:9000");
        assert_eq!(
            client.url(routes::QUERY_FILE_PARTS),
            "http://localhost:9000/query-file-parts"
        );
    }

    #[tokio::test]
    async fn test_unreachable_tracker_is_connection_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpTrackerClient::new(&addr.to_string(), &NetworkConfig::default()).unwrap();
        let result = client.register_peer("127.0.0.1:4000", None).await;

        assert!(matches!(
            result,
            Err(TrackerError::ConnectionFailed { .. }) | Err(TrackerError::Timeout { .. })
        ));
    }
}
