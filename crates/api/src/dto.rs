//! Wire-level request/response shapes for the `/v1` HTTP surface. Kept
//! separate from the domain types in `mentisaid_core` so a change to the
//! JSON contract never forces a change to the in-memory model, and vice
//! versa.

use mentisaid_core::{Sandbox, Space};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateSpaceRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpaceRequest {
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SpaceResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub metadata: serde_json::Value,
    pub sandboxes: std::collections::HashSet<String>,
}

impl From<Space> for SpaceResponse {
    fn from(s: Space) -> Self {
        Self {
            id: s.id,
            name: s.name,
            description: s.description,
            created_at: s.created_at,
            updated_at: s.updated_at,
            metadata: s.metadata,
            sandboxes: s.sandboxes,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSandboxRequest {
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SandboxResponse {
    pub sandbox_id: String,
    pub space_id: String,
    pub container_id: String,
    pub agent_url: String,
    pub is_running: bool,
}

impl From<Sandbox> for SandboxResponse {
    fn from(s: Sandbox) -> Self {
        Self {
            sandbox_id: s.sandbox_id,
            space_id: s.space_id,
            container_id: s.container_id,
            agent_url: s.agent_url,
            is_running: s.is_running,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub action_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
