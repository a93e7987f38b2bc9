//! The Space Registry: a thread-safe index of [`Space`]s, a trivial CRUD
//! layer over an in-memory map. Sandbox lifecycle is the Manager's job; this
//! registry only tracks which sandbox-ids belong to which space.

use std::collections::HashMap;

use mentisaid_core::{Error, Result, SandboxId, Space, SpaceId};
use tokio::sync::RwLock;

/// The id of the space created automatically at startup.
pub const DEFAULT_SPACE_ID: &str = "default";

pub struct SpaceRegistry {
    spaces: RwLock<HashMap<SpaceId, Space>>,
}

impl Default for SpaceRegistry {
    fn default() -> Self {
        let default_space = Space::new(
            DEFAULT_SPACE_ID.to_string(),
            DEFAULT_SPACE_ID.to_string(),
            String::new(),
        );
        let mut spaces = HashMap::new();
        spaces.insert(DEFAULT_SPACE_ID.to_string(), default_space);
        Self { spaces: RwLock::new(spaces) }
    }
}

impl SpaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a space. Rejects a name already in use and any name that
    /// fails `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, length 1-63.
    pub async fn create(&self, name: String, description: String) -> Result<Space> {
        if !Space::validate_name(&name) {
            return Err(Error::InvalidName(name));
        }

        let mut spaces = self.spaces.write().await;
        if spaces.values().any(|s| s.name == name) {
            return Err(Error::DuplicateSpaceName(name));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let space = Space::new(id.clone(), name, description);
        spaces.insert(id, space.clone());
        Ok(space)
    }

    pub async fn get(&self, id: &str) -> Result<Space> {
        self.spaces
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::space_not_found(id))
    }

    pub async fn list(&self) -> Vec<Space> {
        self.spaces.read().await.values().cloned().collect()
    }

    /// Updates description and/or metadata only; name and sandbox membership
    /// are immutable through this call.
    pub async fn update(
        &self,
        id: &str,
        description: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Space> {
        let mut spaces = self.spaces.write().await;
        let space = spaces.get_mut(id).ok_or_else(|| Error::space_not_found(id))?;
        if let Some(description) = description {
            space.description = description;
        }
        if let Some(metadata) = metadata {
            space.metadata = metadata;
        }
        space.updated_at = chrono::Utc::now();
        Ok(space.clone())
    }

    /// Removes the space entry outright. Callers (the Sandbox Manager) must
    /// have already deleted every sandbox the space contains; this registry
    /// does not itself reach into the Manager to do so.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut spaces = self.spaces.write().await;
        spaces.remove(id).map(|_| ()).ok_or_else(|| Error::space_not_found(id))
    }

    /// Adds `sandbox_id` to the space's sandbox-id set.
    pub async fn register_sandbox(&self, space_id: &str, sandbox_id: SandboxId) -> Result<()> {
        let mut spaces = self.spaces.write().await;
        let space = spaces.get_mut(space_id).ok_or_else(|| Error::space_not_found(space_id))?;
        space.sandboxes.insert(sandbox_id);
        Ok(())
    }

    /// Removes `sandbox_id` from the space's sandbox-id set, if present.
    pub async fn unregister_sandbox(&self, space_id: &str, sandbox_id: &str) {
        let mut spaces = self.spaces.write().await;
        if let Some(space) = spaces.get_mut(space_id) {
            space.sandboxes.remove(sandbox_id);
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.spaces.read().await.contains_key(id)
    }
}
