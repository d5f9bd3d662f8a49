//! Background status refresher.
//!
//! The refresher is the only writer of the [`StatusCell`](crate::state::StatusCell).
//! A failed scrape is logged and leaves the previous reading in place; the
//! next tick is the retry.

use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::SharedState;
use crate::error::ServerError;

/// Scrapes once and stores the result. Returns whether the scrape succeeded.
pub async fn refresh_once(state: &SharedState) -> bool {
    let start = Instant::now();

    match state.source.scrape().await {
        Ok(status) => {
            debug!(
                "Scrape completed in {:.3}s: {} active / {} total",
                start.elapsed().as_secs_f64(),
                status.active_processes,
                status.total_processes
            );
            state.metrics.set_status(&status);
            state.cell.store(status).await;
            true
        }
        Err(e) => {
            warn!("Failed to get status: {}", e);
            state.metrics.record_failure();
            state.cell.record_failure(&e.to_string()).await;
            false
        }
    }
}

/// Runs the refresh loop until `token` is cancelled.
#[instrument(skip_all)]
pub async fn refresh_status(state: SharedState, token: CancellationToken) -> Result<(), ServerError> {
    let config = state.config.clone();
    info!(
        "Polling {} every {:?}",
        config.endpoint, config.poll_interval
    );

    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately.
    if !config.initial_scrape {
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = refresh_once(&state) => {}
        }
    }

    debug!("Refresher stopped");
    Ok(())
}
