//! Tracker route handlers over the shared registry
//!
//! Bodies arrive as raw bytes and are decoded before the registry is touched,
//! so a malformed request is rejected with 400 and never reaches shared state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use bytes::Bytes;
use ferry_core::tracker::protocol::{
    QueryFilePartsRequest, RegisterPeerRequest, RemovePeerRequest, RetractFilePartsRequest,
    UpdateFilePartsRequest, decode_request,
};
use ferry_core::tracker::{ChunkHolders, PeerRecord, Registry};

use crate::error::ApiError;

pub async fn register_peer(
    State(registry): State<Arc<Registry>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: RegisterPeerRequest = decode_request(&body)?;
    registry.register_peer(&request.addr, request.public_ip);
    Ok(StatusCode::OK)
}

pub async fn remove_peer(
    State(registry): State<Arc<Registry>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: RemovePeerRequest = decode_request(&body)?;
    registry.remove_peer(&request.addr);
    Ok(StatusCode::OK)
}

pub async fn update_file_parts(
    State(registry): State<Arc<Registry>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: UpdateFilePartsRequest = decode_request(&body)?;
    registry.update_file_parts(&request.addr, request.public_ip, request.file_parts);
    Ok(StatusCode::OK)
}

pub async fn retract_file_parts(
    State(registry): State<Arc<Registry>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: RetractFilePartsRequest = decode_request(&body)?;
    registry.retract_file_parts(&request.addr, &request.file_parts);
    Ok(StatusCode::OK)
}

pub async fn query_file_parts(
    State(registry): State<Arc<Registry>>,
    body: Bytes,
) -> Result<Json<ChunkHolders>, ApiError> {
    let request: QueryFilePartsRequest = decode_request(&body)?;
    let holders = registry.query_chunk_holders(&request.file_name, &request.addr);
    Ok(Json(holders))
}

pub async fn get_peers(State(registry): State<Arc<Registry>>) -> Json<HashMap<String, PeerRecord>> {
    Json(registry.list_peers())
}

pub async fn get_files(
    State(registry): State<Arc<Registry>>,
) -> Json<HashMap<String, ChunkHolders>> {
    Json(registry.snapshot_files())
}
