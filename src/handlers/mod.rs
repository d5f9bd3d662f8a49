//! HTTP endpoint handlers for the sidecar.
//!
//! - `<path>` in JSON mode: the current status as JSON
//! - `<path>` in Prometheus mode: gauges, refreshed on request
//! - `/health`: scrape health as plain text

pub mod health;
pub mod metrics;
pub mod status;

// Re-export handlers
pub use health::health_handler;
pub use metrics::{metrics_handler, refresh_on_request, PULL_THROTTLE};
pub use status::status_handler;
