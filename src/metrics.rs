//! Prometheus metrics definitions for the sidecar's pull mode.
//!
//! Gauge names match the JSON field names of [`Status`], so both output
//! formats expose the same identifiers.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::fpm::{
    Status, METRIC_ACTIVE_PROCESSES, METRIC_IDLE_PROCESSES, METRIC_LISTEN_QUEUE,
    METRIC_LISTEN_QUEUE_LEN, METRIC_MAX_ACTIVE_PROCESSES, METRIC_TOTAL_PROCESSES,
};

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 4 * 1024;

/// Collection of Prometheus metrics for one FPM pool.
#[derive(Clone)]
pub struct FpmMetrics {
    registry: Registry,

    pub listen_queue: IntGauge,
    pub listen_queue_len: IntGauge,
    pub idle_processes: IntGauge,
    pub active_processes: IntGauge,
    pub total_processes: IntGauge,
    pub max_active_processes: IntGauge,

    /// 1 if the last scrape succeeded, 0 otherwise.
    pub up: IntGauge,
    pub scrape_failures_total: IntCounter,
}

impl FpmMetrics {
    /// Creates and registers all metrics in a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> prometheus::Result<IntGauge> {
            let g = IntGauge::new(name, help)?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };

        let listen_queue = gauge(
            METRIC_LISTEN_QUEUE,
            "The number of requests (backlog) currently waiting for a free process",
        )?;
        let listen_queue_len = gauge(
            METRIC_LISTEN_QUEUE_LEN,
            "The maximum allowed size of the listen queue",
        )?;
        let idle_processes = gauge(
            METRIC_IDLE_PROCESSES,
            "The number of processes that are currently idle (waiting for requests)",
        )?;
        let active_processes = gauge(
            METRIC_ACTIVE_PROCESSES,
            "The number of processes that are currently processing requests",
        )?;
        let total_processes = gauge(
            METRIC_TOTAL_PROCESSES,
            "The current total number of processes",
        )?;
        let max_active_processes = gauge(
            METRIC_MAX_ACTIVE_PROCESSES,
            "The maximum number of concurrently active processes",
        )?;
        let up = gauge("phpfpm_up", "Whether the last FPM status scrape succeeded")?;

        let scrape_failures_total = IntCounter::new(
            "phpfpm_scrape_failures_total",
            "Number of failed FPM status scrapes",
        )?;
        registry.register(Box::new(scrape_failures_total.clone()))?;

        Ok(Self {
            registry,
            listen_queue,
            listen_queue_len,
            idle_processes,
            active_processes,
            total_processes,
            max_active_processes,
            up,
            scrape_failures_total,
        })
    }

    pub fn set_status(&self, status: &Status) {
        self.listen_queue.set(status.listen_queue);
        self.listen_queue_len.set(status.listen_queue_len);
        self.idle_processes.set(status.idle_processes);
        self.active_processes.set(status.active_processes);
        self.total_processes.set(status.total_processes);
        self.max_active_processes.set(status.max_active_processes);
        self.up.set(1);
    }

    /// Marks the pool as down; the last known values stay in place.
    pub fn record_failure(&self) {
        self.up.set(0);
        self.scrape_failures_total.inc();
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_gauges() {
        let metrics = FpmMetrics::new().unwrap();
        metrics.set_status(&Status {
            listen_queue: 4,
            idle_processes: 2,
            ..Default::default()
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains("phpfpm_listen_queue 4"));
        assert!(text.contains("phpfpm_idle_processes 2"));
        assert!(text.contains("phpfpm_up 1"));
        assert!(text.contains("# TYPE phpfpm_active_processes gauge"));
    }

    #[test]
    fn test_failure_keeps_last_values() {
        let metrics = FpmMetrics::new().unwrap();
        metrics.set_status(&Status {
            total_processes: 6,
            ..Default::default()
        });
        metrics.record_failure();

        assert_eq!(metrics.total_processes.get(), 6);
        assert_eq!(metrics.up.get(), 0);
        assert_eq!(metrics.scrape_failures_total.get(), 1);
    }
}
