//! Ferry Web - tracker and chunk-serving HTTP services
//!
//! The tracker exposes the registry as a small JSON API. Every peer runs a
//! chunk endpoint that other peers fetch raw chunk bytes from.

pub mod error;
pub mod handlers;
pub mod server;

// Re-export main types
pub use error::ApiError;
pub use server::{
    chunk_router, run_tracker, serve_chunks, serve_tracker, spawn_sweeper, tracker_router,
    tracker_router_with_limit,
};
