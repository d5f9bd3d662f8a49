//! Health check endpoint handler.
//!
//! Healthy once a scrape has succeeded and the most recent scrapes have not
//! all failed.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::sidecar::SharedState;
use crate::state::Snapshot;

/// Consecutive failed scrapes after which the sidecar reports unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u64 = 3;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.cell.snapshot().await;

    let (status, message) = match snapshot.last_updated {
        None => (StatusCode::SERVICE_UNAVAILABLE, "No successful scrape yet"),
        Some(_) if snapshot.consecutive_failures >= UNHEALTHY_AFTER_FAILURES => {
            (StatusCode::SERVICE_UNAVAILABLE, "Scrapes failing")
        }
        Some(_) => (StatusCode::OK, "OK"),
    };

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\n{}",
            render_report(&state.config.endpoint, &snapshot)
        ),
    )
}

fn render_report(endpoint: &str, snapshot: &Snapshot) -> String {
    let mut out = String::new();
    writeln!(out, "{:22} {}", "Endpoint:", endpoint).ok();
    match snapshot.last_updated {
        Some(t) => writeln!(
            out,
            "{:22} {:.1}s ago",
            "Last success:",
            t.elapsed().as_secs_f64()
        )
        .ok(),
        None => writeln!(out, "{:22} never", "Last success:").ok(),
    };
    writeln!(out, "{:22} {}", "Scrapes ok:", snapshot.scrapes_ok).ok();
    writeln!(out, "{:22} {}", "Scrapes failed:", snapshot.scrapes_failed).ok();
    writeln!(
        out,
        "{:22} {}",
        "Consecutive failures:", snapshot.consecutive_failures
    )
    .ok();
    if let Some(e) = &snapshot.last_error {
        writeln!(out, "{:22} {}", "Last error:", e).ok();
    }
    out
}
