use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::dto::{CreateSpaceRequest, SpaceResponse, UpdateSpaceRequest};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_space(
    State(state): State<AppState>,
    Json(req): Json<CreateSpaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.spaces.create(req.name, req.description).await?;
    Ok((StatusCode::CREATED, Json(SpaceResponse::from(space))))
}

pub async fn list_spaces(State(state): State<AppState>) -> impl IntoResponse {
    let spaces: Vec<SpaceResponse> = state.spaces.list().await.into_iter().map(SpaceResponse::from).collect();
    Json(spaces)
}

pub async fn get_space(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.spaces.get(&sid).await?;
    Ok(Json(SpaceResponse::from(space)))
}

pub async fn update_space(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<UpdateSpaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.spaces.update(&sid, req.description, req.metadata).await?;
    Ok(Json(SpaceResponse::from(space)))
}

/// Deletes the space and every sandbox it contains. The Manager owns
/// container teardown, so this iterates the space's sandbox-id set through
/// `DeleteSandbox` before removing the space entry itself — the same
/// coordination the Space Registry's contract requires of its caller.
pub async fn delete_space(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let space = state.spaces.get(&sid).await?;
    for sandbox_id in space.sandboxes {
        match state.manager.delete_sandbox(&sandbox_id).await {
            Ok(()) => {}
            Err(mentisaid_core::Error::SandboxNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    state.spaces.remove(&sid).await?;
    Ok(StatusCode::NO_CONTENT)
}
