//! The executor → Runtime observation push endpoint. Intentionally accepts
//! raw bytes rather than a typed body: `ReceiveObservation` broadcasts the
//! bytes verbatim before attempting to parse them, so a malformed payload
//! must still reach subscribers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;

use crate::state::AppState;

pub async fn receive_observation(
    State(state): State<AppState>,
    Path(sbid): Path<String>,
    body: Bytes,
) -> StatusCode {
    state.manager.receive_observation(&sbid, body).await;
    StatusCode::OK
}
