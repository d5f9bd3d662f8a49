//! PHP-FPM status types and the status source abstraction.
//!
//! The rest of the crate only sees [`StatusSource`]; the FastCGI wire
//! details live in [`fcgi`] and [`client`].

pub mod client;
pub mod fcgi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

pub use client::FpmClient;

/// The number of requests (backlog) currently waiting for a free process.
pub const METRIC_LISTEN_QUEUE: &str = "phpfpm_listen_queue";
/// The maximum allowed size of the listen queue.
pub const METRIC_LISTEN_QUEUE_LEN: &str = "phpfpm_listen_queue_len";
/// The number of processes that are currently idle.
pub const METRIC_IDLE_PROCESSES: &str = "phpfpm_idle_processes";
/// The number of processes that are currently processing requests.
pub const METRIC_ACTIVE_PROCESSES: &str = "phpfpm_active_processes";
/// The current total number of processes.
pub const METRIC_TOTAL_PROCESSES: &str = "phpfpm_total_processes";
/// The maximum number of concurrently active processes.
pub const METRIC_MAX_ACTIVE_PROCESSES: &str = "phpfpm_max_active_processes";

/// All numeric metrics exposed for a pool, in display order.
pub const METRIC_NAMES: [&str; 6] = [
    METRIC_LISTEN_QUEUE,
    METRIC_LISTEN_QUEUE_LEN,
    METRIC_IDLE_PROCESSES,
    METRIC_ACTIVE_PROCESSES,
    METRIC_TOTAL_PROCESSES,
    METRIC_MAX_ACTIVE_PROCESSES,
];

/// Status of the FPM pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    /// The process manager type - static, dynamic or ondemand.
    #[serde(rename = "phpfpm_process_manager")]
    pub process_manager: String,
    #[serde(rename = "phpfpm_listen_queue")]
    pub listen_queue: i64,
    #[serde(rename = "phpfpm_listen_queue_len")]
    pub listen_queue_len: i64,
    #[serde(rename = "phpfpm_idle_processes")]
    pub idle_processes: i64,
    #[serde(rename = "phpfpm_active_processes")]
    pub active_processes: i64,
    #[serde(rename = "phpfpm_total_processes")]
    pub total_processes: i64,
    #[serde(rename = "phpfpm_max_active_processes")]
    pub max_active_processes: i64,
}

impl Status {
    /// Looks up a numeric field by its metric name.
    pub fn field(&self, metric: &str) -> Option<i64> {
        match metric {
            METRIC_LISTEN_QUEUE => Some(self.listen_queue),
            METRIC_LISTEN_QUEUE_LEN => Some(self.listen_queue_len),
            METRIC_IDLE_PROCESSES => Some(self.idle_processes),
            METRIC_ACTIVE_PROCESSES => Some(self.active_processes),
            METRIC_TOTAL_PROCESSES => Some(self.total_processes),
            METRIC_MAX_ACTIVE_PROCESSES => Some(self.max_active_processes),
            _ => None,
        }
    }
}

/// Anything that can produce one status reading per call.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn scrape(&self) -> Result<Status, ScrapeError>;
}
