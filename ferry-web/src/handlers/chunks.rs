//! Peer endpoint serving raw chunk bytes by name

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use ferry_core::storage::{ChunkName, ChunkStore};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub filename: Option<String>,
}

/// `GET /download?filename=<chunk>`
///
/// Only names that parse as a chunk name are opened, so the query can never
/// address a path outside the chunk directory.
pub async fn download_chunk(
    State(store): State<ChunkStore>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let Some(filename) = query.filename.filter(|name| !name.is_empty()) else {
        return Err(ApiError::BadRequest {
            reason: "missing filename parameter".to_string(),
        });
    };

    let name: ChunkName = filename.parse()?;
    let bytes = store.read_chunk(&name).await?;
    tracing::debug!("Serving chunk {} ({} bytes)", name, bytes.len());

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}
