//! Error types for fpm-metrics-adapter.
//!
//! Scrape failures are recoverable (the sidecar keeps stale data, the
//! provider surfaces them per object). Server and configuration errors are
//! reported once and end the process.

use std::time::Duration;

/// Failure to obtain a status reading from an upstream.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during scrape: {0}")]
    Io(#[from] std::io::Error),

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("status code was: {0}")]
    BadStatus(u16),

    #[error("failed to decode status: {0}")]
    Decode(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors returned by the custom metrics provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("metric not found: {0}")]
    MetricNotFound(String),

    #[error("object not found: {namespace}/{name}")]
    ObjectNotFound { namespace: String, name: String },

    #[error("invalid {kind} name: {value:?}")]
    InvalidName { kind: &'static str, value: String },

    #[error("not found: .status.podIP for {namespace}/{name}")]
    MissingAddress { namespace: String, name: String },

    #[error("invalid annotation {key}={value}: {reason}")]
    InvalidAnnotation {
        key: String,
        value: String,
        reason: String,
    },

    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("kubernetes API error: {0}")]
    Kube(String),
}

/// Errors that end a server run.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid serve path: {0}")]
    InvalidPath(String),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to load TLS configuration: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to set up metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("task {name} failed: {reason}")]
    Task { name: &'static str, reason: String },
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse {
        path: std::path::PathBuf,
        reason: String,
    },
}
