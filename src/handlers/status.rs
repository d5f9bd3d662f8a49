//! JSON status endpoint handler.
//!
//! Serializes whatever the cell holds; never scrapes. Before the first
//! successful scrape this is the zero-value status.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, instrument};

use crate::sidecar::SharedState;

#[instrument(skip(state))]
pub async fn status_handler(State(state): State<SharedState>) -> Response {
    let status = state.cell.current().await;

    match serde_json::to_vec(&*status) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("Failed to marshal status: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to marshal status").into_response()
        }
    }
}
