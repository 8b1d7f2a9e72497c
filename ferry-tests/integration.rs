//! Integration tests for Ferry
//!
//! Real tracker and chunk servers on loopback ports, driven through the
//! public client APIs and raw HTTP.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/swarm.rs"]
mod swarm;
#[path = "integration/tracker_http.rs"]
mod tracker_http;
