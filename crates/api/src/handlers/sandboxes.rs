use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mentisaid_core::Error;
use mentisaid_manager::CreateSandboxRequest as ManagerCreateSandboxRequest;

use crate::dto::{CreateSandboxRequest, SandboxResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_sandbox(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<CreateSandboxRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sandbox_id = state
        .manager
        .create_sandbox(
            sid,
            ManagerCreateSandboxRequest {
                image: req.image,
                command: req.command,
            },
        )
        .await?;
    let sandbox = state.manager.get_sandbox(&sandbox_id).await?;
    Ok((StatusCode::CREATED, Json(SandboxResponse::from(sandbox))))
}

/// Looks up the sandbox and checks it actually belongs to the addressed
/// space. A mismatch returns `NotFound`, never the sandbox under its real
/// space — cross-space addressing must not leak which space it lives in.
async fn sandbox_scoped_to_space(
    state: &AppState,
    space_id: &str,
    sandbox_id: &str,
) -> Result<mentisaid_core::Sandbox, Error> {
    let sandbox = state.manager.get_sandbox(sandbox_id).await?;
    if sandbox.space_id != space_id {
        return Err(Error::sandbox_not_found(sandbox_id));
    }
    Ok(sandbox)
}

pub async fn get_sandbox(
    State(state): State<AppState>,
    Path((sid, sbid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let sandbox = sandbox_scoped_to_space(&state, &sid, &sbid).await?;
    Ok(Json(SandboxResponse::from(sandbox)))
}

pub async fn delete_sandbox(
    State(state): State<AppState>,
    Path((sid, sbid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    sandbox_scoped_to_space(&state, &sid, &sbid).await?;
    state.manager.delete_sandbox(&sbid).await?;
    Ok(StatusCode::NO_CONTENT)
}
