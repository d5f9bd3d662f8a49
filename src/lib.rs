//! fpm-metrics-adapter library
//!
//! PHP-FPM pool metrics for autoscaling control loops, in two pieces:
//!
//! - **Sidecar** ([`sidecar::Server`]): polls one pool's status page over
//!   FastCGI in the background and serves the latest reading as JSON or as
//!   Prometheus gauges.
//! - **Provider** ([`provider::Provider`]): answers custom metric queries
//!   for pods by scraping each pod's sidecar, with a per-key single-flight
//!   cache so concurrent queries for the same pod share one scrape.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fpm_metrics_adapter::config::Config;
//! use fpm_metrics_adapter::fpm::FpmClient;
//! use fpm_metrics_adapter::sidecar::Server;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default().sidecar()?;
//! let source = Arc::new(FpmClient::new(
//!     config.endpoint.clone(),
//!     config.status_path.clone(),
//!     config.scrape_timeout,
//! ));
//!
//! let server = Server::bind(config, source)?;
//! server.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fpm;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod provider;
pub mod sidecar;
pub mod state;

// Re-export main types for convenience
pub use error::{ConfigError, ProviderError, ScrapeError, ServerError};
pub use fpm::{Status, StatusSource};
pub use state::StatusCell;
