//! The FPM metrics sidecar.
//!
//! A [`Server`] polls one FPM pool in the background, keeps the latest
//! reading in a [`StatusCell`] and serves it over HTTP. An optional status
//! logger writes the same reading to stdout on its own interval.

pub mod logger;
pub mod refresh;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::cli::OutputFormat;
use crate::config::TlsFiles;
use crate::fpm::StatusSource;
use crate::metrics::FpmMetrics;
use crate::state::StatusCell;

pub use logger::{log_status, StatusSink, StdoutSink};
pub use refresh::{refresh_once, refresh_status};
pub use server::Server;

/// Periodic status logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStatus {
    pub enabled: bool,
    pub frequency: Duration,
}

/// Effective sidecar configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub path: String,
    pub format: OutputFormat,
    pub endpoint: String,
    pub status_path: String,
    pub poll_interval: Duration,
    pub initial_scrape: bool,
    pub log_status: LogStatus,
    pub scrape_timeout: Duration,
    pub shutdown_grace: Duration,
    pub tls: Option<TlsFiles>,
}

/// Checks that `path` can be routed as the serve path.
pub fn check_serve_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("path must start with '/', got '{}'", path));
    }
    if path == "/health" {
        return Err("path '/health' is reserved for the health check".into());
    }
    if path.contains(['{', '}'])
        || path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(format!("path must not contain route parameters, got '{}'", path));
    }
    Ok(())
}

/// State shared by the sidecar's tasks and HTTP handlers.
pub struct SidecarState {
    pub config: Arc<ServerConfig>,
    pub cell: StatusCell,
    pub metrics: FpmMetrics,
    pub source: Arc<dyn StatusSource>,
    /// Last pull-mode refresh; held while one is in flight.
    pub last_pull: Mutex<Option<Instant>>,
}

pub type SharedState = Arc<SidecarState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_serve_path() {
        assert!(check_serve_path("/metrics").is_ok());
        assert!(check_serve_path("/fpm/status.json").is_ok());

        for bad in ["", "metrics", "/health", "/{name}", "/a/:id", "/*rest"] {
            assert!(check_serve_path(bad).is_err(), "{:?} accepted", bad);
        }
    }
}
