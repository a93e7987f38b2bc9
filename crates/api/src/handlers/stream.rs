//! The `/v1/sandboxes/{sbid}/stream` WebSocket upgrade. Note the path omits
//! the owning space — preserved for compatibility, see the design notes'
//! accounting of this identifier smell.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

pub async fn stream(
    State(state): State<AppState>,
    Path(sbid): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.manager.sandbox_exists(&sbid).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        mentisaid_hub::serve_connection(hub, sbid, socket).await;
    })
}
