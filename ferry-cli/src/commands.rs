//! CLI command implementations

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use ferry_core::config::FerryConfig;
use ferry_core::peer::{DEFAULT_IP_DISCOVERY_URL, LocalPeer, discover_public_ip, peer_locator};
use ferry_core::{FerryError, TransferError};
use tokio::net::TcpListener;

/// Lowest port a peer may use; privileged ports are refused.
const MIN_PEER_PORT: u16 = 1025;
const MAX_PEER_PORT: u16 = 65534;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the tracker service
    Tracker {
        /// Address to listen on (overrides FERRY_TRACKER_LISTEN)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Act as a peer
    Peer(PeerArgs),
}

#[derive(Args)]
pub struct PeerArgs {
    /// Port this peer serves chunks on
    #[arg(long, value_parser = parse_peer_port)]
    pub port: u16,

    /// Host other peers reach this peer at
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Tracker address
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub tracker: String,

    /// Chunk directory (overrides FERRY_CHUNK_DIR)
    #[arg(long)]
    pub chunk_dir: Option<PathBuf>,

    /// Use the discovered public IP as this peer's host
    #[arg(long)]
    pub discover_ip: bool,

    #[command(subcommand)]
    pub action: PeerAction,
}

#[derive(Subcommand)]
pub enum PeerAction {
    /// Serve local chunks, stay registered until Ctrl-C
    Serve,
    /// Split a file into chunks and advertise them
    Split {
        file: PathBuf,
    },
    /// Assemble a file from local chunks
    Combine {
        file_hash: String,
        output: PathBuf,
        /// Skip checking the result against the file hash
        #[arg(long)]
        no_verify: bool,
    },
    /// Download every chunk of a file from the swarm
    Download {
        file_hash: String,
        parts: u32,
        /// Assemble the file here once all chunks arrived
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip checking the assembled file against its hash
        #[arg(long)]
        no_verify: bool,
    },
    /// Advertise the local inventory to the tracker
    Advertise,
    /// Register with the tracker
    Register,
    /// Remove this peer from the tracker
    Unregister,
    /// List peers known to the tracker
    Peers,
    /// Show which peers hold a chunk
    Query {
        chunk: String,
    },
    /// Withdraw chunks from this peer's advertised holdings
    Retract {
        #[arg(required = true)]
        chunks: Vec<String>,
    },
}

impl Commands {
    /// Names this process's log file: `tracker`, or `peer-<port>`.
    pub fn log_role(&self) -> String {
        match self {
            Commands::Tracker { .. } => "tracker".to_string(),
            Commands::Peer(args) => format!("peer-{}", args.port),
        }
    }
}

fn parse_peer_port(raw: &str) -> Result<u16, String> {
    let port: u16 = raw
        .parse()
        .map_err(|_| format!("{raw} is not a port number"))?;
    if !(MIN_PEER_PORT..=MAX_PEER_PORT).contains(&port) {
        return Err(format!(
            "port must be between {MIN_PEER_PORT} and {MAX_PEER_PORT}"
        ));
    }
    Ok(port)
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands, config: FerryConfig) -> anyhow::Result<()> {
    match command {
        Commands::Tracker { listen } => run_tracker(config, listen).await,
        Commands::Peer(args) => run_peer(config, args).await,
    }
}

async fn run_tracker(mut config: FerryConfig, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = listen {
        config.tracker.listen_addr = addr;
    }
    println!("Ferry tracker running on http://{}", config.tracker.listen_addr);

    ferry_web::run_tracker(&config.tracker, shutdown_signal())
        .await
        .with_context(|| format!("tracker on {} failed", config.tracker.listen_addr))
}

async fn run_peer(mut config: FerryConfig, args: PeerArgs) -> anyhow::Result<()> {
    if let Some(dir) = args.chunk_dir {
        config.storage.chunk_dir = dir;
    }

    let (host, public_ip) = if args.discover_ip {
        match discover(&config).await {
            Ok(ip) => (ip.clone(), Some(ip)),
            Err(e) => {
                tracing::warn!("Falling back to {}: {}", args.host, e);
                (args.host.clone(), None)
            }
        }
    } else {
        (args.host.clone(), None)
    };

    let address = peer_locator(&host, args.port);
    let peer = LocalPeer::connect(address, public_ip, &args.tracker, &config)?;
    tracing::debug!("Peer {} using tracker {}", peer.address(), args.tracker);

    match args.action {
        PeerAction::Serve => serve(&peer, args.port, &config).await,
        PeerAction::Split { file } => {
            let entries = peer.split_and_advertise(&file).await?;
            match entries.first() {
                Some(first) => {
                    println!("File hash: {}", first.name.file_hash());
                    println!("Parts:     {}", entries.len());
                    for entry in &entries {
                        println!("  {} {} ({} bytes)", entry.name, entry.hash, entry.len);
                    }
                }
                None => println!("{} is empty; nothing to split", file.display()),
            }
            Ok(())
        }
        PeerAction::Combine {
            file_hash,
            output,
            no_verify,
        } => {
            let count = peer.combine(&file_hash, &output, !no_verify).await?;
            println!("Assembled {} chunks into {}", count, output.display());
            Ok(())
        }
        PeerAction::Download {
            file_hash,
            parts,
            output,
            no_verify,
        } => download(&peer, &file_hash, parts, output, !no_verify).await,
        PeerAction::Advertise => {
            let count = peer.advertise().await?;
            println!("Advertised {count} chunks");
            Ok(())
        }
        PeerAction::Register => {
            peer.register().await?;
            println!("Registered as {}", peer.address());
            Ok(())
        }
        PeerAction::Unregister => {
            peer.unregister().await?;
            println!("Unregistered {}", peer.address());
            Ok(())
        }
        PeerAction::Peers => {
            let peers = peer.list_peers().await?;
            if peers.is_empty() {
                println!("No peers registered");
            }
            let mut records: Vec<_> = peers.into_values().collect();
            records.sort_by(|a, b| a.addr.cmp(&b.addr));
            for record in records {
                println!(
                    "{}  public_ip={}  chunks={}  last_seen={}",
                    record.addr,
                    record.public_ip.as_deref().unwrap_or("-"),
                    record.file_parts.len(),
                    record.last_seen.to_rfc3339()
                );
            }
            Ok(())
        }
        PeerAction::Query { chunk } => {
            let holders = peer.query_holders(&chunk).await?;
            if holders.is_empty() {
                println!("No holders for {chunk}");
            }
            for (holder, hash) in holders {
                println!("{holder}  {hash}");
            }
            Ok(())
        }
        PeerAction::Retract { chunks } => {
            let count = chunks.len();
            peer.retract(chunks).await?;
            println!("Retracted {count} chunks");
            Ok(())
        }
    }
}

async fn discover(config: &FerryConfig) -> Result<String, FerryError> {
    let client = reqwest::Client::builder()
        .timeout(config.network.tracker_timeout)
        .user_agent(config.network.user_agent)
        .build()
        .map_err(|e| FerryError::IpDiscovery {
            url: DEFAULT_IP_DISCOVERY_URL.to_string(),
            reason: e.to_string(),
        })?;
    discover_public_ip(&client, DEFAULT_IP_DISCOVERY_URL).await
}

async fn download(
    peer: &LocalPeer,
    file_hash: &str,
    parts: u32,
    output: Option<PathBuf>,
    verify: bool,
) -> anyhow::Result<()> {
    match peer.download_file(file_hash, parts).await {
        Ok(report) => {
            println!(
                "Downloaded {} chunks ({} bytes)",
                report.chunks.len(),
                report.total_bytes()
            );
        }
        Err(FerryError::Transfer(TransferError::Incomplete { failures })) => {
            eprintln!("{} of {} chunks failed:", failures.len(), parts);
            for failure in &failures {
                eprintln!("  [{}] {}: {}", failure.index, failure.chunk, failure.error);
            }
            anyhow::bail!("download of {file_hash} incomplete");
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(output) = output {
        let count = peer.combine(file_hash, &output, verify).await?;
        println!("Assembled {} chunks into {}", count, output.display());
    }
    Ok(())
}

/// Serves chunks and keeps the registration alive until Ctrl-C.
async fn serve(peer: &LocalPeer, port: u16, config: &FerryConfig) -> anyhow::Result<()> {
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("cannot bind {bind_addr}"))?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(ferry_web::serve_chunks(
        listener,
        peer.store().clone(),
        async move {
            let _ = stop_rx.await;
        },
    ));

    peer.register().await?;
    let count = peer.advertise().await?;
    println!("Serving {} chunks as {} (Ctrl-C to stop)", count, peer.address());

    // Re-advertise well inside the tracker's staleness window
    let refresh = (config.tracker.staleness_window / 3).max(Duration::from_secs(1));
    keep_advertising(peer, refresh, shutdown_signal()).await;

    if let Err(e) = peer.unregister().await {
        tracing::warn!("Unregister on shutdown failed: {}", e);
    }
    let _ = stop_tx.send(());
    server.await??;
    Ok(())
}

/// Re-advertises every `refresh` until `shutdown` resolves.
///
/// `shutdown` is created once and polled across iterations, so a signal that
/// lands while an advertise is in flight still ends the loop right after it.
/// Returns the number of advertise rounds run.
async fn keep_advertising<F>(peer: &LocalPeer, refresh: Duration, shutdown: F) -> u32
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(refresh);
    ticker.tick().await;
    tokio::pin!(shutdown);

    let mut rounds = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                rounds += 1;
                if let Err(e) = peer.advertise().await {
                    tracing::warn!("Periodic advertise failed: {}", e);
                }
            }
        }
    }
    rounds
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Instant;

    use async_trait::async_trait;
    use ferry_core::config::NetworkConfig;
    use ferry_core::storage::ChunkStore;
    use ferry_core::tracker::{
        ChunkHolders, FileParts, InProcessTracker, PeerRecord, Registry, TrackerClient,
        TrackerError,
    };
    use ferry_core::transfer::HttpChunkFetcher;

    use super::*;

    /// In-process tracker whose advertise calls take `delay`.
    struct SlowTracker {
        inner: InProcessTracker,
        delay: Duration,
    }

    #[async_trait]
    impl TrackerClient for SlowTracker {
        async fn register_peer(
            &self,
            addr: &str,
            public_ip: Option<&str>,
        ) -> Result<(), TrackerError> {
            self.inner.register_peer(addr, public_ip).await
        }

        async fn remove_peer(&self, addr: &str) -> Result<(), TrackerError> {
            self.inner.remove_peer(addr).await
        }

        async fn update_file_parts(
            &self,
            addr: &str,
            public_ip: Option<&str>,
            file_parts: FileParts,
        ) -> Result<(), TrackerError> {
            tokio::time::sleep(self.delay).await;
            self.inner.update_file_parts(addr, public_ip, file_parts).await
        }

        async fn retract_file_parts(
            &self,
            addr: &str,
            chunk_names: Vec<String>,
        ) -> Result<(), TrackerError> {
            self.inner.retract_file_parts(addr, chunk_names).await
        }

        async fn query_file_parts(
            &self,
            chunk_name: &str,
            exclude_addr: &str,
        ) -> Result<ChunkHolders, TrackerError> {
            self.inner.query_file_parts(chunk_name, exclude_addr).await
        }

        async fn list_peers(&self) -> Result<HashMap<String, PeerRecord>, TrackerError> {
            self.inner.list_peers().await
        }

        fn tracker_url(&self) -> &str {
            self.inner.tracker_url()
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_advertise_stops_refresh_loop() {
        let registry = Arc::new(Registry::default());
        let tracker = Arc::new(SlowTracker {
            inner: InProcessTracker::new(Arc::clone(&registry)),
            delay: Duration::from_millis(300),
        });
        let fetcher = Arc::new(HttpChunkFetcher::new(&NetworkConfig::default()).unwrap());
        // Never created, so the inventory is empty
        let store = ChunkStore::new(std::env::temp_dir().join("ferry-cli-absent-chunks"));
        let peer = LocalPeer::new("127.0.0.1:4000", None, store, tracker, fetcher);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            // Fires while the first advertise is still sleeping
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(());
        });

        let started = Instant::now();
        let rounds = tokio::time::timeout(
            Duration::from_secs(5),
            keep_advertising(&peer, Duration::from_millis(20), async move {
                let _ = stop_rx.await;
            }),
        )
        .await
        .unwrap();

        assert_eq!(rounds, 1);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(registry.list_peers().contains_key("127.0.0.1:4000"));
    }

    #[test]
    fn test_parse_peer_port_bounds() {
        assert_eq!(parse_peer_port("1025"), Ok(1025));
        assert_eq!(parse_peer_port("65534"), Ok(65534));
        assert!(parse_peer_port("1024").is_err());
        assert!(parse_peer_port("65535").is_err());
        assert!(parse_peer_port("-1").is_err());
        assert!(parse_peer_port("").is_err());
    }
}
