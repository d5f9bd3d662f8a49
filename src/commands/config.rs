//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::with_defaults();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("fpm-metrics-adapter.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# fpm-metrics-adapter Configuration
# =================================
#
# Every setting can also be given as a flag or as an
# FPM_METRICS_ADAPTER_* environment variable, which take precedence.
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 80                     # HTTP port (adapter default: 6443)
# shutdown_grace: 10           # Seconds in-flight requests get on shutdown
#
# Sidecar
# -------
# path: "/metrics"             # Path which the status is served on
# format: "json"               # "json" or "prometheus"
# endpoint: "127.0.0.1:9000"   # FastCGI endpoint of the FPM pool
# status_path: "/status"       # pm.status_path of the pool
# endpoint_poll: 10            # Seconds between status scrapes
# initial_scrape: true         # Scrape once at startup
# scrape_timeout: 5            # Seconds before a scrape is abandoned
#
# Status Logger
# -------------
# log_status_enabled: false    # Write the status to stdout periodically
# log_status_frequency: 30     # Seconds between status lines
#
# Adapter
# -------
# cache_ttl: 10                # Seconds a scraped pod metric is reused
# kube_api_url: null           # Kubernetes API URL (null = in-cluster)
# kube_token_file: null        # Bearer token file (null = service account)
# kube_ca_file: null           # CA bundle (null = service account)
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
