//! Tracker API over real HTTP

use std::collections::HashMap;
use std::time::Duration;

use axum::Router;
use axum::response::Json;
use axum::routing::get;
use ferry_core::config::NetworkConfig;
use ferry_core::peer::discover_public_ip;
use ferry_core::tracker::{FileParts, HttpTrackerClient, TrackerClient, TrackerError};
use serde_json::{Value, json};

use crate::support::start_tracker;

fn client_for(url: &str) -> HttpTrackerClient {
    HttpTrackerClient::new(url, &NetworkConfig::default()).unwrap()
}

#[tokio::test]
async fn test_register_advertise_query_remove_over_http() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let client = client_for(&tracker.url());

    client.register_peer("X", None).await.unwrap();
    client
        .update_file_parts(
            "X",
            None,
            FileParts::from([("h_0".to_string(), "hashA0".to_string())]),
        )
        .await
        .unwrap();

    let holders = client.query_file_parts("h_0", "Y").await.unwrap();
    assert_eq!(
        holders,
        HashMap::from([("X".to_string(), "hashA0".to_string())])
    );

    client.remove_peer("X").await.unwrap();
    assert!(client.query_file_parts("h_0", "Y").await.unwrap().is_empty());

    // Removing again is not an error
    client.remove_peer("X").await.unwrap();
}

#[tokio::test]
async fn test_self_exclusion_and_retraction_over_http() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let client = client_for(&tracker.addr.to_string());
    let parts = FileParts::from([
        ("h_0".to_string(), "a".to_string()),
        ("h_1".to_string(), "b".to_string()),
    ]);

    client.update_file_parts("A", None, parts.clone()).await.unwrap();
    client.update_file_parts("B", None, parts).await.unwrap();

    let holders = client.query_file_parts("h_0", "A").await.unwrap();
    assert_eq!(holders.keys().collect::<Vec<_>>(), vec!["B"]);

    client
        .retract_file_parts("B", vec!["h_0".to_string()])
        .await
        .unwrap();
    assert!(client.query_file_parts("h_0", "A").await.unwrap().is_empty());
    assert_eq!(client.query_file_parts("h_1", "A").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_peers_reports_public_ip_and_holdings() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let client = client_for(&tracker.url());

    client
        .register_peer("203.0.113.9:4000", Some("203.0.113.9"))
        .await
        .unwrap();
    client
        .update_file_parts(
            "203.0.113.9:4000",
            None,
            FileParts::from([("h_0".to_string(), "x".to_string())]),
        )
        .await
        .unwrap();

    let peers = client.list_peers().await.unwrap();
    let record = &peers["203.0.113.9:4000"];
    assert_eq!(record.public_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(record.file_parts.len(), 1);
}

#[tokio::test]
async fn test_silent_peer_is_evicted_over_http() {
    let tracker = start_tracker(Duration::from_millis(200)).await;
    let client = client_for(&tracker.url());

    client.register_peer("quiet:4000", None).await.unwrap();
    client
        .update_file_parts(
            "quiet:4000",
            None,
            FileParts::from([("h_0".to_string(), "x".to_string())]),
        )
        .await
        .unwrap();
    assert_eq!(client.list_peers().await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(client.list_peers().await.unwrap().is_empty());
    assert!(client.query_file_parts("h_0", "").await.unwrap().is_empty());
    assert_eq!(tracker.registry.chunk_count(), 0);
}

#[tokio::test]
async fn test_large_inventory_advertise_is_indexed() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let client = client_for(&tracker.url());

    // Roughly 2.8 MiB of JSON, past axum's stock 2 MiB body limit
    let file_hash = "f".repeat(64);
    let chunk_hash = "c".repeat(64);
    let parts: FileParts = (0..20_000)
        .map(|i| (format!("{file_hash}_{i}"), chunk_hash.clone()))
        .collect();
    let body_len = serde_json::to_vec(&json!({"addr": "big:4000", "file_parts": &parts}))
        .unwrap()
        .len();
    assert!(body_len > 2 * 1024 * 1024);

    client
        .update_file_parts("big:4000", None, parts)
        .await
        .unwrap();

    assert_eq!(tracker.registry.chunk_count(), 20_000);
    let holders = client
        .query_file_parts(&format!("{file_hash}_19999"), "")
        .await
        .unwrap();
    assert_eq!(holders.get("big:4000"), Some(&chunk_hash));
}

#[tokio::test]
async fn test_decode_errors_are_400_and_leave_state_untouched() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let http = reqwest::Client::new();
    let base = tracker.url();

    let cases = [
        (reqwest::Method::POST, "/register-peer", "{\"addr\":"),
        (reqwest::Method::DELETE, "/remove-peer", "{}"),
        (
            reqwest::Method::POST,
            "/update-peer-file-parts",
            "{\"addr\":\"X\",\"file_parts\":{\"h_0\":7}}",
        ),
        (reqwest::Method::POST, "/query-file-parts", "{\"file_name\":3,\"addr\":\"X\"}"),
    ];

    for (method, route, body) in cases {
        let response = http
            .request(method, format!("{base}{route}"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "{route} accepted {body}");
    }

    let peers: Value = http
        .get(format!("{base}/get-peers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(peers, json!({}));
}

#[tokio::test]
async fn test_client_maps_error_status() {
    let tracker = start_tracker(Duration::from_secs(300)).await;
    let client = client_for(&tracker.url());

    // Empty addr passes serialization but fails server-side validation
    let result = client.register_peer("", None).await;
    assert!(matches!(
        result,
        Err(TrackerError::ServerStatus { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_discover_public_ip_from_json_endpoint() {
    let router = Router::new().route("/", get(|| async { Json(json!({"ip": "198.51.100.4"})) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let ip = discover_public_ip(&reqwest::Client::new(), &format!("http://{addr}/"))
        .await
        .unwrap();
    assert_eq!(ip, "198.51.100.4");
}
