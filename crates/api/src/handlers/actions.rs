use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mentisaid_core::ActionType;

use crate::dto::ActionResponse;
use crate::error::ApiError;
use crate::state::AppState;

async fn initiate(
    state: AppState,
    sid: String,
    sbid: String,
    action_type: ActionType,
    payload: serde_json::Value,
) -> Result<impl IntoResponse, ApiError> {
    let sandbox = state.manager.get_sandbox(&sbid).await?;
    if sandbox.space_id != sid {
        return Err(mentisaid_core::Error::sandbox_not_found(sbid).into());
    }
    let action_id = state.manager.initiate_action(&sbid, action_type, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(ActionResponse { action_id })))
}

pub async fn run_shell_command(
    State(state): State<AppState>,
    Path((sid, sbid)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    initiate(state, sid, sbid, ActionType::Shell, payload).await
}

pub async fn run_ipython_cell(
    State(state): State<AppState>,
    Path((sid, sbid)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    initiate(state, sid, sbid, ActionType::Ipython, payload).await
}
