//! CLI arguments and subcommands for fpm-metrics-adapter.
//!
//! This module defines the command-line interface structure using the clap library.
//! Every server flag can also be supplied through an `FPM_METRICS_ADAPTER_*`
//! environment variable.

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log line format
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Response format of the sidecar's serve path
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The current status as a JSON object
    Json,
    /// Prometheus text exposition, refreshed on request
    Prometheus,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "fpm-metrics-adapter",
    about = "PHP-FPM pool metrics sidecar and custom metrics provider",
    long_about = "PHP-FPM pool metrics sidecar and custom metrics provider.\n\n\
                  Without a subcommand, runs the sidecar: polls the FPM status page and \
                  serves the latest reading as JSON or Prometheus text. The `adapter` \
                  subcommand runs the custom metrics provider that scrapes sidecars per pod.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long, env = "FPM_METRICS_ADAPTER_PORT")]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long, env = "FPM_METRICS_ADAPTER_BIND")]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", env = "FPM_METRICS_ADAPTER_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", env = "FPM_METRICS_ADAPTER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, env = "FPM_METRICS_ADAPTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path which the status is served on
    #[arg(long, env = "FPM_METRICS_ADAPTER_PATH")]
    pub path: Option<String>,

    /// Response format of the serve path
    #[arg(long, value_enum, env = "FPM_METRICS_ADAPTER_FORMAT")]
    pub format: Option<OutputFormat>,

    /// FastCGI endpoint polled for FPM status information (host:port)
    #[arg(long, env = "FPM_METRICS_ADAPTER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// FPM status page path (pm.status_path)
    #[arg(long, env = "FPM_METRICS_ADAPTER_STATUS_PATH")]
    pub status_path: Option<String>,

    /// How frequently to poll the endpoint, in seconds
    #[arg(long, env = "FPM_METRICS_ADAPTER_ENDPOINT_POLL")]
    pub endpoint_poll: Option<u64>,

    /// Wait one poll interval before the first scrape
    #[arg(long)]
    pub no_initial_scrape: bool,

    /// Periodically log the status to stdout for external systems
    #[arg(
        long,
        env = "FPM_METRICS_ADAPTER_LOG_STATUS_ENABLED",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub log_enabled: bool,

    /// How frequently to log the status, in seconds
    #[arg(long, env = "FPM_METRICS_ADAPTER_LOG_STATUS_FREQUENCY")]
    pub log_frequency: Option<u64>,

    /// Timeout for a single scrape, in seconds
    #[arg(long, env = "FPM_METRICS_ADAPTER_SCRAPE_TIMEOUT")]
    pub scrape_timeout: Option<u64>,

    /// Grace period for in-flight requests on shutdown, in seconds
    #[arg(long, env = "FPM_METRICS_ADAPTER_SHUTDOWN_GRACE")]
    pub shutdown_grace: Option<u64>,

    /// Cache provider scrape results for N seconds
    #[arg(long, env = "FPM_METRICS_ADAPTER_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Kubernetes API server URL (default: in-cluster)
    #[arg(long, env = "FPM_METRICS_ADAPTER_KUBE_API_URL")]
    pub kube_api_url: Option<String>,

    /// Bearer token file for the Kubernetes API
    #[arg(long, env = "FPM_METRICS_ADAPTER_KUBE_TOKEN_FILE")]
    pub kube_token_file: Option<PathBuf>,

    /// CA bundle for the Kubernetes API
    #[arg(long, env = "FPM_METRICS_ADAPTER_KUBE_CA_FILE")]
    pub kube_ca_file: Option<PathBuf>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, env = "FPM_METRICS_ADAPTER_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, env = "FPM_METRICS_ADAPTER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the custom metrics provider
    Adapter,

    /// Scrape the FPM endpoint once and print the status
    Scrape {
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
