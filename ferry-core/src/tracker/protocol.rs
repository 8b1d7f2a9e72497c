//! Wire contract between peers and the tracker.
//!
//! JSON bodies over HTTP. Route paths live in [`routes`] so the server and
//! the client cannot drift apart.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{FileParts, TrackerError};

/// HTTP paths served by the tracker and by every peer.
pub mod routes {
    /// `POST {addr, public_ip?}`
    pub const REGISTER_PEER: &str = "/register-peer";
    /// `DELETE {addr}`
    pub const REMOVE_PEER: &str = "/remove-peer";
    /// `POST {addr, public_ip?, file_parts}`
    pub const UPDATE_PEER_FILE_PARTS: &str = "/update-peer-file-parts";
    /// `POST {addr, file_parts: [name]}`
    pub const RETRACT_PEER_FILE_PARTS: &str = "/retract-peer-file-parts";
    /// `POST {file_name, addr}` returning `{holder: hash}`
    pub const QUERY_FILE_PARTS: &str = "/query-file-parts";
    /// `GET` returning `{addr: PeerRecord}`
    pub const GET_PEERS: &str = "/get-peers";
    /// `GET` returning `{chunk: {holder: hash}}`
    pub const GET_FILES: &str = "/get-files";
    /// Peer endpoint: `GET ?filename=<chunk>` returning raw chunk bytes
    pub const DOWNLOAD: &str = "/download";
}

/// Query parameter naming the chunk on the peer download endpoint.
pub const DOWNLOAD_QUERY_PARAM: &str = "filename";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPeerRequest {
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePeerRequest {
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFilePartsRequest {
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub file_parts: FileParts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractFilePartsRequest {
    pub addr: String,
    #[serde(default)]
    pub file_parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilePartsRequest {
    /// Chunk name being looked up
    pub file_name: String,
    /// Address of the asking peer, excluded from the result
    pub addr: String,
}

/// Requests that carry a peer address must name one.
pub trait Validate {
    /// # Errors
    ///
    /// - `TrackerError::InvalidRequest` - If a required field is empty
    fn validate(&self) -> Result<(), TrackerError>;
}

fn require_addr(addr: &str) -> Result<(), TrackerError> {
    if addr.trim().is_empty() {
        return Err(TrackerError::InvalidRequest {
            reason: "addr must not be empty".to_string(),
        });
    }
    Ok(())
}

impl Validate for RegisterPeerRequest {
    fn validate(&self) -> Result<(), TrackerError> {
        require_addr(&self.addr)
    }
}

impl Validate for RemovePeerRequest {
    fn validate(&self) -> Result<(), TrackerError> {
        require_addr(&self.addr)
    }
}

impl Validate for UpdateFilePartsRequest {
    fn validate(&self) -> Result<(), TrackerError> {
        require_addr(&self.addr)
    }
}

impl Validate for RetractFilePartsRequest {
    fn validate(&self) -> Result<(), TrackerError> {
        require_addr(&self.addr)
    }
}

impl Validate for QueryFilePartsRequest {
    fn validate(&self) -> Result<(), TrackerError> {
        if self.file_name.is_empty() {
            return Err(TrackerError::InvalidRequest {
                reason: "file_name must not be empty".to_string(),
            });
        }
        // The asking address may be empty: nothing is excluded then.
        Ok(())
    }
}

/// Decodes and validates a request body.
///
/// Every failure, whether syntax, a missing field or a wrong type, is
/// reported the same way so the server can answer 400 before touching
/// any shared state.
///
/// # Errors
///
/// - `TrackerError::Decode` - If the body is not the expected JSON shape
/// - `TrackerError::InvalidRequest` - If a required field is empty
pub fn decode_request<T>(body: &[u8]) -> Result<T, TrackerError>
where
    T: DeserializeOwned + Validate,
{
    let request: T = serde_json::from_slice(body)?;
    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_optional_public_ip() {
        let request: RegisterPeerRequest =
            decode_request(br#"{"addr":"127.0.0.1:4000"}"#).unwrap();
        assert_eq!(request.addr, "127.0.0.1:4000");
        assert_eq!(request.public_ip, None);

        let encoded = serde_json::to_string(&request).unwrap();
        assert_eq!(encoded, r#"{"addr":"127.0.0.1:4000"}"#);
    }

    #[test]
    fn test_update_request_defaults_file_parts() {
        let request: UpdateFilePartsRequest =
            decode_request(br#"{"addr":"X","public_ip":"1.2.3.4"}"#).unwrap();
        assert!(request.file_parts.is_empty());
        assert_eq!(request.public_ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_decode_rejects_malformed_bodies() {
        assert!(matches!(
            decode_request::<RemovePeerRequest>(b"not json"),
            Err(TrackerError::Decode(_))
        ));
        assert!(matches!(
            decode_request::<QueryFilePartsRequest>(br#"{"addr":"X"}"#),
            Err(TrackerError::Decode(_))
        ));
        assert!(matches!(
            decode_request::<UpdateFilePartsRequest>(br#"{"addr":"X","file_parts":[1]}"#),
            Err(TrackerError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_addr() {
        assert!(matches!(
            decode_request::<RegisterPeerRequest>(br#"{"addr":"  "}"#),
            Err(TrackerError::InvalidRequest { .. })
        ));
        assert!(matches!(
            decode_request::<QueryFilePartsRequest>(br#"{"file_name":"","addr":"X"}"#),
            Err(TrackerError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_query_request_field_names() {
        let request = QueryFilePartsRequest {
            file_name: "h_0".to_string(),
            addr: "Y".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["file_name"], "h_0");
        assert_eq!(value["addr"], "Y");
    }
}
