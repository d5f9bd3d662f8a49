//! Prometheus endpoint handler and its refresh-on-request middleware.
//!
//! In pull mode the gauges are refreshed just before a request is served,
//! at most once per [`PULL_THROTTLE`]. Only one refresh runs at a time;
//! requests arriving meanwhile are served the current gauges.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

use crate::sidecar::SharedState;

/// Minimum time between two on-request refreshes.
pub const PULL_THROTTLE: Duration = Duration::from_secs(1);

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the serve path in Prometheus mode.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<Response, MetricsError> {
    let body = state.metrics.encode().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        MetricsError::EncodingFailed
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

/// Refreshes the gauges before the request reaches the handler.
pub async fn refresh_on_request(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    refresh_gauges(&state).await;
    next.run(request).await
}

async fn refresh_gauges(state: &SharedState) {
    let Ok(mut last_pull) = state.last_pull.try_lock() else {
        debug!("Refresh already in flight, serving current gauges");
        return;
    };

    if last_pull.is_some_and(|t| t.elapsed() < PULL_THROTTLE) {
        return;
    }

    match state.source.scrape().await {
        Ok(status) => state.metrics.set_status(&status),
        Err(e) => {
            warn!("Failed to get status: {}", e);
            state.metrics.record_failure();
        }
    }
    *last_pull = Some(Instant::now());
}
