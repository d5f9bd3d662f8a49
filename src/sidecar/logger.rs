//! Periodic status logger.
//!
//! Writes the current status as one JSON line per tick, for log pipelines
//! that collect stdout. Runs independently of request traffic.

use std::io::{self, Write};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use super::SharedState;
use crate::error::ServerError;

/// Destination for status lines.
pub trait StatusSink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Writes status lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StatusSink for StdoutSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

/// Logs the status every `log_status.frequency` until `token` is cancelled.
/// Returns immediately when logging is disabled.
#[instrument(skip_all)]
pub async fn log_status(
    state: SharedState,
    sink: Arc<dyn StatusSink>,
    token: CancellationToken,
) -> Result<(), ServerError> {
    let log_status = state.config.log_status;
    if !log_status.enabled {
        debug!("Status logging disabled");
        return Ok(());
    }

    let mut ticker = interval(log_status.frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let status = state.cell.current().await;
        let line = match serde_json::to_string(&*status) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to marshal status: {}", e);
                continue;
            }
        };

        if let Err(e) = sink.write_line(&line) {
            error!("Failed to write status: {}", e);
        }
    }

    debug!("Status logger stopped");
    Ok(())
}
