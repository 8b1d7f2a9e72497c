//! Tracing setup for Ferry
//!
//! Console output at the level the user picks, plus an optional trace-level log
//! file. Several peers commonly run side by side on one host, so every process
//! role (`tracker`, `peer-4001`, ...) writes its own file instead of sharing one.

use std::fs::{File, create_dir_all};
use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;

/// HTTP transport crates log every connection at debug; keep them quieter.
const TRANSPORT_DIRECTIVES: &[&str] = &["hyper=warn", "hyper_util=warn", "h2=warn"];

/// Path of the trace log for a process role.
///
/// Characters outside `[A-Za-z0-9_-]` in `role` become `-`, so a role built
/// from a host and port is still a single file name.
pub fn log_file_path(config: &LoggingConfig, role: &str) -> PathBuf {
    let role: String = role
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    config.logs_dir.join(format!("ferry-{role}.log"))
}

/// Console filter directives used when `RUST_LOG` is unset.
pub fn console_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    // Debug and trace consoles keep the transport logs
    if level < Level::DEBUG {
        directives.extend(TRANSPORT_DIRECTIVES.iter().map(|d| d.to_string()));
    }
    directives.join(",")
}

/// Installs the global subscriber for this process.
///
/// The console honours `RUST_LOG` first, then `console_level`. When file
/// logging is enabled, everything down to TRACE also goes to
/// [`log_file_path`], truncating the previous run of the same role. Returns
/// the log file path, if any.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory or the log file cannot be created
pub fn init_tracing(
    console_level: Level,
    config: &LoggingConfig,
    role: &str,
) -> Result<Option<PathBuf>, std::io::Error> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));
    let console_layer = fmt::layer().with_target(true).with_filter(console_filter);

    let (file_layer, log_path) = if config.file_logging {
        create_dir_all(&config.logs_dir)?;
        let path = log_file_path(config, role);
        let log_file = File::create(&path)?;
        let layer = fmt::layer()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(log_file)
            .with_filter(EnvFilter::new("trace"));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    match &log_path {
        Some(path) => tracing::info!(
            "Logging {} at {}, full trace in {}",
            role,
            console_level,
            path.display()
        ),
        None => tracing::info!("Logging {} at {}", role, console_level),
    }

    Ok(log_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_per_role() {
        let config = LoggingConfig {
            logs_dir: PathBuf::from("/var/log/ferry"),
            file_logging: true,
        };

        assert_eq!(
            log_file_path(&config, "tracker"),
            PathBuf::from("/var/log/ferry/ferry-tracker.log")
        );
        assert_eq!(
            log_file_path(&config, "peer-4001"),
            PathBuf::from("/var/log/ferry/ferry-peer-4001.log")
        );
        assert_eq!(
            log_file_path(&config, "peer/../10.0.0.1:4001"),
            PathBuf::from("/var/log/ferry/ferry-peer----10-0-0-1-4001.log")
        );
    }

    #[test]
    fn test_console_directives_quiet_transport_above_debug() {
        assert_eq!(
            console_directives(Level::INFO),
            "info,hyper=warn,hyper_util=warn,h2=warn"
        );
        assert_eq!(console_directives(Level::DEBUG), "debug");
        assert_eq!(console_directives(Level::TRACE), "trace");
    }

    #[test]
    fn test_directives_parse_as_env_filter() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok());
        }
    }

    #[test]
    fn test_cli_level_maps_to_tracing_level() {
        assert_eq!(CliLogLevel::Warn.as_tracing_level(), Level::WARN);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }
}
