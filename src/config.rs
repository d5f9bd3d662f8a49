//! Configuration management for fpm-metrics-adapter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments (which include their environment fallbacks). It supports
//! YAML, JSON, and TOML formats. Precedence: CLI/env > config file > defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat, OutputFormat};
use crate::error::ConfigError;
use crate::provider::AdapterConfig;
use crate::sidecar::{check_serve_path, LogStatus, ServerConfig};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_SIDECAR_PORT: u16 = 80;
pub const DEFAULT_ADAPTER_PORT: u16 = 6443;
pub const DEFAULT_PATH: &str = "/metrics";
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:9000";
pub const DEFAULT_STATUS_PATH: &str = "/status";
pub const DEFAULT_ENDPOINT_POLL: u64 = 10;
pub const DEFAULT_LOG_STATUS_FREQUENCY: u64 = 30;
pub const DEFAULT_SCRAPE_TIMEOUT: u64 = 5;
pub const DEFAULT_SHUTDOWN_GRACE: u64 = 10;
pub const DEFAULT_CACHE_TTL: u64 = 10;

/// Certificate and key for serving HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Configuration file structure; every field falls back to a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "shutdown-grace")]
    pub shutdown_grace: Option<u64>,

    // Sidecar
    pub path: Option<String>,
    pub format: Option<OutputFormat>,
    pub endpoint: Option<String>,
    #[serde(alias = "status-path")]
    pub status_path: Option<String>,
    #[serde(alias = "endpoint-poll")]
    pub endpoint_poll: Option<u64>,
    #[serde(alias = "initial-scrape")]
    pub initial_scrape: Option<bool>,
    #[serde(alias = "scrape-timeout")]
    pub scrape_timeout: Option<u64>,

    // Status logger
    #[serde(alias = "log-status-enabled")]
    pub log_status_enabled: Option<bool>,
    #[serde(alias = "log-status-frequency")]
    pub log_status_frequency: Option<u64>,

    // Adapter
    #[serde(alias = "cache-ttl")]
    pub cache_ttl: Option<u64>,
    #[serde(alias = "kube-api-url")]
    pub kube_api_url: Option<String>,
    #[serde(alias = "kube-token-file")]
    pub kube_token_file: Option<PathBuf>,
    #[serde(alias = "kube-ca-file")]
    pub kube_ca_file: Option<PathBuf>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Config {
    /// A config with every default spelled out, for `config` generation.
    pub fn with_defaults() -> Self {
        Self {
            port: Some(DEFAULT_SIDECAR_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            shutdown_grace: Some(DEFAULT_SHUTDOWN_GRACE),
            path: Some(DEFAULT_PATH.to_string()),
            format: Some(OutputFormat::Json),
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            status_path: Some(DEFAULT_STATUS_PATH.to_string()),
            endpoint_poll: Some(DEFAULT_ENDPOINT_POLL),
            initial_scrape: Some(true),
            scrape_timeout: Some(DEFAULT_SCRAPE_TIMEOUT),
            log_status_enabled: Some(false),
            log_status_frequency: Some(DEFAULT_LOG_STATUS_FREQUENCY),
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            kube_api_url: None,
            kube_token_file: None,
            kube_ca_file: None,
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        bind.parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid bind address '{}'", bind)))
    }

    fn tls_files(&self) -> Option<TlsFiles> {
        if !self.enable_tls.unwrap_or(false) {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        }
    }

    /// Effective sidecar server configuration.
    pub fn sidecar(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            addr: SocketAddr::new(self.bind_ip()?, self.port.unwrap_or(DEFAULT_SIDECAR_PORT)),
            path: self.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string()),
            format: self.format.unwrap_or(OutputFormat::Json),
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            status_path: self
                .status_path
                .clone()
                .unwrap_or_else(|| DEFAULT_STATUS_PATH.to_string()),
            poll_interval: Duration::from_secs(self.endpoint_poll.unwrap_or(DEFAULT_ENDPOINT_POLL)),
            initial_scrape: self.initial_scrape.unwrap_or(true),
            log_status: LogStatus {
                enabled: self.log_status_enabled.unwrap_or(false),
                frequency: Duration::from_secs(
                    self.log_status_frequency
                        .unwrap_or(DEFAULT_LOG_STATUS_FREQUENCY),
                ),
            },
            scrape_timeout: Duration::from_secs(
                self.scrape_timeout.unwrap_or(DEFAULT_SCRAPE_TIMEOUT),
            ),
            shutdown_grace: Duration::from_secs(
                self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            ),
            tls: self.tls_files(),
        })
    }

    /// Effective adapter server configuration.
    pub fn adapter(&self) -> Result<AdapterConfig, ConfigError> {
        Ok(AdapterConfig {
            addr: SocketAddr::new(self.bind_ip()?, self.port.unwrap_or(DEFAULT_ADAPTER_PORT)),
            cache_ttl: Duration::from_secs(self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL)),
            scrape_timeout: Duration::from_secs(
                self.scrape_timeout.unwrap_or(DEFAULT_SCRAPE_TIMEOUT),
            ),
            shutdown_grace: Duration::from_secs(
                self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
            ),
            kube_api_url: self.kube_api_url.clone(),
            kube_token_file: self.kube_token_file.clone(),
            kube_ca_file: self.kube_ca_file.clone(),
            tls: self.tls_files(),
        })
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    cfg.bind_ip()?;

    if cfg.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
        return invalid("endpoint must not be empty".into());
    }

    if let Some(p) = cfg.path.as_deref() {
        check_serve_path(p).map_err(ConfigError::Invalid)?;
    }

    if let Some(p) = cfg.status_path.as_deref() {
        if !p.starts_with('/') {
            return invalid(format!("status_path must start with '/', got '{}'", p));
        }
    }

    for (name, value) in [
        ("endpoint_poll", cfg.endpoint_poll),
        ("scrape_timeout", cfg.scrape_timeout),
        ("cache_ttl", cfg.cache_ttl),
    ] {
        if value == Some(0) {
            return invalid(format!("{} must be greater than 0", name));
        }
    }

    if cfg.log_status_enabled.unwrap_or(false) && cfg.log_status_frequency == Some(0) {
        return invalid(
            "log_status_frequency must be greater than 0 when log_status_enabled is true".into(),
        );
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        match (cfg.tls_cert_path.as_deref(), cfg.tls_key_path.as_deref()) {
            (None, None) => {
                return invalid(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return invalid("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return invalid("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file("TLS certificate", cert)?;
                check_pem_file("TLS private key", key)?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(what: &str, path: &str) -> Result<(), ConfigError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(ConfigError::Invalid(format!(
            "{} file is empty: {}",
            what, path
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::Invalid(
            format!("{} file not found: {}", what, path),
        )),
        Err(e) => Err(ConfigError::Invalid(format!(
            "{} file is not readable: {} ({})",
            what, path, e
        ))),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(secs) = args.shutdown_grace {
        config.shutdown_grace = Some(secs);
    }

    // Sidecar
    if let Some(path) = &args.path {
        config.path = Some(path.clone());
    }
    if let Some(format) = args.format {
        config.format = Some(format);
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(status_path) = &args.status_path {
        config.status_path = Some(status_path.clone());
    }
    if let Some(secs) = args.endpoint_poll {
        config.endpoint_poll = Some(secs);
    }
    if args.no_initial_scrape {
        config.initial_scrape = Some(false);
    }
    if let Some(secs) = args.scrape_timeout {
        config.scrape_timeout = Some(secs);
    }

    // Status logger
    if args.log_enabled {
        config.log_status_enabled = Some(true);
    }
    if let Some(secs) = args.log_frequency {
        config.log_status_frequency = Some(secs);
    }

    // Adapter
    if let Some(ttl) = args.cache_ttl {
        config.cache_ttl = Some(ttl);
    }
    if let Some(url) = &args.kube_api_url {
        config.kube_api_url = Some(url.clone());
    }
    if let Some(path) = &args.kube_token_file {
        config.kube_token_file = Some(path.clone());
    }
    if let Some(path) = &args.kube_ca_file {
        config.kube_ca_file = Some(path.clone());
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Configuration loading with multiple format support.
/// Without an explicit path, the first existing default location is used.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/fpm-metrics-adapter/config.yaml",
                "/etc/fpm-metrics-adapter/config.yml",
                "/etc/fpm-metrics-adapter/config.json",
                "./fpm-metrics-adapter.yaml",
                "./fpm-metrics-adapter.yml",
                "./fpm-metrics-adapter.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let parse_err = |reason: String| ConfigError::Parse {
        path: path.clone(),
        reason,
    };

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        // Default to YAML
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };

    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders configuration in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<String> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        validate_effective_config(&Config::default()).unwrap();
        validate_effective_config(&Config::with_defaults()).unwrap();

        let sidecar = Config::default().sidecar().unwrap();
        assert_eq!(sidecar.addr.port(), DEFAULT_SIDECAR_PORT);
        assert_eq!(sidecar.path, "/metrics");
        assert_eq!(sidecar.endpoint, "127.0.0.1:9000");
        assert_eq!(sidecar.poll_interval, Duration::from_secs(10));
        assert!(!sidecar.log_status.enabled);
        assert!(sidecar.tls.is_none());

        let adapter = Config::default().adapter().unwrap();
        assert_eq!(adapter.addr.port(), DEFAULT_ADAPTER_PORT);
        assert_eq!(adapter.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            Config {
                path: Some("metrics".into()),
                ..Default::default()
            },
            Config {
                endpoint: Some(" ".into()),
                ..Default::default()
            },
            Config {
                endpoint_poll: Some(0),
                ..Default::default()
            },
            Config {
                cache_ttl: Some(0),
                ..Default::default()
            },
            Config {
                log_status_enabled: Some(true),
                log_status_frequency: Some(0),
                ..Default::default()
            },
            Config {
                bind: Some("not-an-ip".into()),
                ..Default::default()
            },
        ];

        for cfg in cases {
            assert!(
                validate_effective_config(&cfg).is_err(),
                "expected {:?} to be rejected",
                cfg
            );
        }
    }

    #[test]
    fn test_tls_requires_both_files() {
        let cfg = Config {
            enable_tls: Some(true),
            tls_cert_path: Some("/some/cert.pem".into()),
            ..Default::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("tls_key_path is not set"));

        let mut cert = NamedTempFile::new().unwrap();
        writeln!(cert, "-----BEGIN CERTIFICATE-----").unwrap();
        let key = NamedTempFile::new().unwrap();

        let cfg = Config {
            enable_tls: Some(true),
            tls_cert_path: Some(cert.path().to_string_lossy().into()),
            tls_key_path: Some(key.path().to_string_lossy().into()),
            ..Default::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("TLS private key file is empty"));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "port: 8080\nendpoint: \"10.0.0.1:9000\"\nformat: prometheus\nlog-status-enabled: true"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        let sidecar = config.sidecar().unwrap();

        assert_eq!(sidecar.addr.port(), 8080);
        assert_eq!(sidecar.endpoint, "10.0.0.1:9000");
        assert_eq!(sidecar.format, OutputFormat::Prometheus);
        assert!(sidecar.log_status.enabled);
    }

    #[test]
    fn test_load_broken_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, "{{ not json").unwrap();

        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "port = 8080\npath = \"/status.json\"\ncache_ttl = 30").unwrap();
        let config_path = file.path().to_string_lossy().to_string();

        let args = Args::parse_from([
            "fpm-metrics-adapter",
            "--config",
            config_path.as_str(),
            "--port",
            "9090",
            "--log-enabled",
        ]);
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.port, Some(9090));
        assert_eq!(config.path.as_deref(), Some("/status.json"));
        assert_eq!(config.cache_ttl, Some(30));
        assert_eq!(config.log_status_enabled, Some(true));
    }

    #[test]
    fn test_render_round_trips_through_yaml() {
        let rendered = render_config(&Config::with_defaults(), &ConfigFormat::Yaml).unwrap();
        let parsed: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.endpoint.as_deref(), Some(DEFAULT_ENDPOINT));
    }
}
