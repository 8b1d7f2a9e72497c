//! Shared setup: loopback tracker and peers with their own chunk servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ferry_core::config::FerryConfig;
use ferry_core::peer::LocalPeer;
use ferry_core::tracker::Registry;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub struct TestTracker {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    _stop: oneshot::Sender<()>,
}

impl TestTracker {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn start_tracker(staleness_window: Duration) -> TestTracker {
    let registry = Arc::new(Registry::new(staleness_window));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    tokio::spawn(ferry_web::serve_tracker(
        listener,
        Arc::clone(&registry),
        async move {
            let _ = stopped.await;
        },
    ));

    TestTracker {
        addr,
        registry,
        _stop: stop,
    }
}

pub struct TestPeer {
    pub peer: LocalPeer,
    pub dir: tempfile::TempDir,
    _stop: oneshot::Sender<()>,
}

/// Starts a peer serving chunks on a loopback port.
///
/// The peer's identity is the `127.0.0.1:<port>` locator of its chunk server.
pub async fn start_peer(tracker: &TestTracker, chunk_size: usize) -> TestPeer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FerryConfig::for_testing();
    config.storage.chunk_dir = dir.path().join("chunks");
    config.storage.chunk_size = chunk_size;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let peer = LocalPeer::connect(address, None, &tracker.addr.to_string(), &config).unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(ferry_web::serve_chunks(
        listener,
        peer.store().clone(),
        async move {
            let _ = stopped.await;
        },
    ));

    TestPeer {
        peer,
        dir,
        _stop: stop,
    }
}

pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 253) as u8).collect()
}
