//! HTTP error mapping for the tracker and chunk services

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ferry_core::{StorageError, TrackerError};

/// Errors surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body or query could not be decoded or failed validation
    #[error("{reason}")]
    BadRequest { reason: String },

    #[error("Chunk {name} not found")]
    ChunkNotFound { name: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl From<TrackerError> for ApiError {
    fn from(error: TrackerError) -> Self {
        ApiError::BadRequest {
            reason: error.to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidChunkName { .. } | StorageError::InvalidFileHash { .. } => {
                ApiError::BadRequest {
                    reason: error.to_string(),
                }
            }
            StorageError::ChunkNotFound { name } => ApiError::ChunkNotFound { name },
            other => ApiError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::ChunkNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { reason } => {
                tracing::error!("Request failed: {}", reason);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let not_found: ApiError = StorageError::ChunkNotFound {
            name: "abc_0".to_string(),
        }
        .into();
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let invalid: ApiError = StorageError::InvalidChunkName {
            name: "x".to_string(),
        }
        .into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let io: ApiError = StorageError::Io(std::io::Error::other("disk")).into();
        assert_eq!(
            io.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_decode_error_is_bad_request() {
        let decode = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let error: ApiError = TrackerError::Decode(decode).into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
