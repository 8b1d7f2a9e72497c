//! Centralized configuration for Ferry.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum size of a single chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Buffer size for streaming chunk and file I/O.
pub const DEFAULT_FILE_BUFFER_SIZE: usize = 64 * 1024;

/// Largest tracker request body accepted.
///
/// An advertisement carries a peer's whole inventory at roughly 140 bytes per
/// chunk, so this admits about 450,000 chunks (some 450 GiB at 1 MiB each).
pub const DEFAULT_MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Central configuration for all Ferry components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct FerryConfig {
    pub tracker: TrackerConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Tracker service configuration.
///
/// Controls where the tracker listens and how long a silent peer
/// stays visible before it is evicted.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Socket address the tracker HTTP service binds to
    pub listen_addr: SocketAddr,
    /// Peers not seen within this window are evicted
    pub staleness_window: Duration,
    /// Period of the background liveness sweep
    pub sweep_interval: Duration,
    /// Upper bound on request bodies, in bytes
    pub max_request_body: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080)),
            staleness_window: Duration::from_secs(300), // 5 minutes
            sweep_interval: Duration::from_secs(60),
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }
}

/// Network communication configuration.
///
/// Bounds every tracker RPC and peer-to-peer chunk fetch so one
/// unreachable host cannot stall a download batch.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// HTTP request timeout for tracker communication
    pub tracker_timeout: Duration,
    /// HTTP request timeout for a single chunk fetch
    pub fetch_timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tracker_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
            user_agent: "ferry/0.1.0",
        }
    }
}

/// Chunk storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Flat directory holding `<file_hash>_<index>` chunk files
    pub chunk_dir: PathBuf,
    /// Maximum bytes per chunk
    pub chunk_size: usize,
    /// Buffer size for streaming file operations
    pub file_buffer_size: usize,
    /// Re-advertise local inventory once a download finishes
    pub advertise_after_download: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_dir: PathBuf::from("file_parts"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            advertise_after_download: true,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory receiving per-process trace logs
    pub logs_dir: PathBuf,
    /// Write the trace-level log file next to console output
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            file_logging: true,
        }
    }
}

impl FerryConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(listen) = std::env::var("FERRY_TRACKER_LISTEN") {
            if let Ok(addr) = listen.parse::<SocketAddr>() {
                config.tracker.listen_addr = addr;
            }
        }

        if let Ok(window) = std::env::var("FERRY_STALENESS_SECS") {
            if let Ok(seconds) = window.parse::<u64>() {
                config.tracker.staleness_window = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = std::env::var("FERRY_TRACKER_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.tracker_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = std::env::var("FERRY_FETCH_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.fetch_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(dir) = std::env::var("FERRY_CHUNK_DIR") {
            if !dir.is_empty() {
                config.storage.chunk_dir = PathBuf::from(dir);
            }
        }

        if let Ok(limit) = std::env::var("FERRY_MAX_REQUEST_BODY") {
            if let Ok(bytes) = limit.parse::<usize>() {
                config.tracker.max_request_body = bytes;
            }
        }

        if let Ok(dir) = std::env::var("FERRY_LOGS_DIR") {
            if !dir.is_empty() {
                config.logging.logs_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Creates a configuration with short windows suitable for tests.
    pub fn for_testing() -> Self {
        Self {
            tracker: TrackerConfig {
                listen_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
                staleness_window: Duration::from_secs(2),
                sweep_interval: Duration::from_millis(200),
                max_request_body: DEFAULT_MAX_REQUEST_BODY,
            },
            network: NetworkConfig {
                tracker_timeout: Duration::from_secs(2),
                fetch_timeout: Duration::from_secs(2),
                user_agent: "ferry/test",
            },
            logging: LoggingConfig {
                file_logging: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = FerryConfig::default();

        assert_eq!(config.tracker.listen_addr.port(), 8080);
        assert_eq!(config.tracker.staleness_window, Duration::from_secs(300));
        assert_eq!(config.network.tracker_timeout, Duration::from_secs(10));
        assert_eq!(config.storage.chunk_size, 1_048_576);
        assert_eq!(config.storage.chunk_dir, PathBuf::from("file_parts"));
        assert!(config.storage.advertise_after_download);
        assert_eq!(config.storage.file_buffer_size, DEFAULT_FILE_BUFFER_SIZE);
        assert!(config.tracker.max_request_body > 2 * 1024 * 1024);
        assert_eq!(config.logging.logs_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_testing_preset() {
        let config = FerryConfig::for_testing();
        assert_eq!(config.tracker.listen_addr.port(), 0);
        assert!(config.tracker.staleness_window < Duration::from_secs(300));
        assert_eq!(config.storage.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!config.logging.file_logging);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("FERRY_TRACKER_LISTEN", "127.0.0.1:9090");
            std::env::set_var("FERRY_STALENESS_SECS", "42");
            std::env::set_var("FERRY_TRACKER_TIMEOUT", "3");
            std::env::set_var("FERRY_FETCH_TIMEOUT", "not-a-number");
            std::env::set_var("FERRY_CHUNK_DIR", "/tmp/ferry-chunks");
            std::env::set_var("FERRY_MAX_REQUEST_BODY", "4096");
            std::env::set_var("FERRY_LOGS_DIR", "/tmp/ferry-logs");
        }

        let config = FerryConfig::from_env();

        assert_eq!(
            config.tracker.listen_addr,
            "127.0.0.1:9090".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.tracker.staleness_window, Duration::from_secs(42));
        assert_eq!(config.network.tracker_timeout, Duration::from_secs(3));
        assert_eq!(config.network.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.storage.chunk_dir, PathBuf::from("/tmp/ferry-chunks"));
        assert_eq!(config.tracker.max_request_body, 4096);
        assert_eq!(config.logging.logs_dir, PathBuf::from("/tmp/ferry-logs"));

        // Cleanup
        unsafe {
            std::env::remove_var("FERRY_TRACKER_LISTEN");
            std::env::remove_var("FERRY_STALENESS_SECS");
            std::env::remove_var("FERRY_TRACKER_TIMEOUT");
            std::env::remove_var("FERRY_FETCH_TIMEOUT");
            std::env::remove_var("FERRY_CHUNK_DIR");
            std::env::remove_var("FERRY_MAX_REQUEST_BODY");
            std::env::remove_var("FERRY_LOGS_DIR");
        }
    }
}
