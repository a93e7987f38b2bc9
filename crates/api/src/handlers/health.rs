use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::dto::HealthResponse;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
