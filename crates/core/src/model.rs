//! Data model shared by every component of the Runtime: sandboxes, spaces,
//! actions, and observations (see the data model section of the project's
//! design notes).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, unique identifier for a sandbox.
pub type SandboxId = String;

/// Opaque, unique identifier for a space.
pub type SpaceId = String;

/// Runtime-generated correlation token for one action.
pub type ActionId = String;

/// Lifecycle state of a [`Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Creating,
    Ready,
    Deleting,
    Deleted,
}

/// A persistent, isolated code-execution sandbox: one container running one
/// in-container executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub sandbox_id: SandboxId,
    pub space_id: SpaceId,
    /// Opaque handle from the container engine (e.g. a Docker container id).
    pub container_id: String,
    /// Absolute URL at which the in-container executor accepts HTTP.
    pub agent_url: String,
    pub is_running: bool,
    #[serde(skip)]
    pub state: SandboxState,
}

impl Sandbox {
    pub fn new(sandbox_id: SandboxId, space_id: SpaceId, container_id: String, agent_url: String) -> Self {
        Self {
            sandbox_id,
            space_id,
            container_id,
            agent_url,
            is_running: true,
            state: SandboxState::Ready,
        }
    }
}

/// A logical grouping of sandboxes. Purely organizational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    /// The set of sandbox-ids this space contains.
    pub sandboxes: HashSet<SandboxId>,
}

impl Space {
    pub fn new(id: SpaceId, name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description,
            created_at: now,
            updated_at: now,
            metadata: serde_json::Value::Object(Default::default()),
            sandboxes: HashSet::new(),
        }
    }

    /// Validates a space/sandbox name against `^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, length 1-63.
    pub fn validate_name(name: &str) -> bool {
        use std::sync::OnceLock;
        static NAME_RE: OnceLock<regex::Regex> = OnceLock::new();

        if name.is_empty() || name.len() > 63 {
            return false;
        }
        let re = NAME_RE.get_or_init(|| {
            regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex")
        });
        re.is_match(name)
    }
}

/// The type of action an executor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Shell,
    Ipython,
}

impl ActionType {
    /// The executor path this action type dispatches to.
    pub fn endpoint(self) -> &'static str {
        match self {
            ActionType::Shell => "tools:run_shell_command",
            ActionType::Ipython => "tools:run_ipython_cell",
        }
    }
}

/// One invocation of a shell command or IPython cell. Transient: no durable
/// record is kept beyond the `action_id` used as the observation correlation
/// token.
#[derive(Debug, Clone)]
pub struct Action {
    pub action_id: ActionId,
    pub sandbox_id: SandboxId,
    pub action_type: ActionType,
    pub payload: serde_json::Value,
}

/// The kind of a single observation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    Start,
    Stream,
    Result,
    Error,
    End,
}

/// Which stream a `stream` observation's line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A typed JSON event about an action, carried on the WebSocket stream.
///
/// Fields outside a variant's relevant subset are simply `None`/absent on the
/// wire; this mirrors the source contract's single flat JSON shape rather
/// than an internally-tagged Rust enum, since the executor (a separate
/// process) and any client must agree on the wire shape independent of how
/// this crate models it in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub observation_type: ObservationType,
    pub action_id: ActionId,
    /// ISO-8601 UTC, nanosecond precision.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Observation {
    pub fn start(action_id: impl Into<String>) -> Self {
        Self {
            observation_type: ObservationType::Start,
            action_id: action_id.into(),
            timestamp: Utc::now(),
            stream: None,
            line: None,
            exit_code: None,
            error: None,
            details: None,
        }
    }

    pub fn end(action_id: impl Into<String>, exit_code: i64, error: Option<String>) -> Self {
        Self {
            observation_type: ObservationType::End,
            action_id: action_id.into(),
            timestamp: Utc::now(),
            stream: None,
            line: None,
            exit_code: Some(exit_code),
            error,
            details: None,
        }
    }

    pub fn error(action_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            observation_type: ObservationType::Error,
            action_id: action_id.into(),
            timestamp: Utc::now(),
            stream: None,
            line: None,
            exit_code: None,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn stream_line(action_id: impl Into<String>, stream: StreamKind, line: impl Into<String>) -> Self {
        Self {
            observation_type: ObservationType::Stream,
            action_id: action_id.into(),
            timestamp: Utc::now(),
            stream: Some(stream),
            line: Some(line.into()),
            exit_code: None,
            error: None,
            details: None,
        }
    }

    pub fn result(action_id: impl Into<String>, exit_code: i64, error: Option<String>) -> Self {
        Self {
            observation_type: ObservationType::Result,
            action_id: action_id.into(),
            timestamp: Utc::now(),
            stream: None,
            line: None,
            exit_code: Some(exit_code),
            error,
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(Space::validate_name("default"));
        assert!(Space::validate_name("a"));
        assert!(Space::validate_name("my-space-1"));
        assert!(Space::validate_name(&"a".repeat(63)));
    }

    #[test]
    fn invalid_names() {
        assert!(!Space::validate_name(""));
        assert!(!Space::validate_name("-leading-dash"));
        assert!(!Space::validate_name("trailing-dash-"));
        assert!(!Space::validate_name("Has_Upper"));
        assert!(!Space::validate_name(&"a".repeat(64)));
    }

    #[test]
    fn observation_serializes_without_irrelevant_fields() {
        let obs = Observation::start("act-1");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["observation_type"], "start");
        assert!(json.get("stream").is_none());
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn action_type_endpoints() {
        assert_eq!(ActionType::Shell.endpoint(), "tools:run_shell_command");
        assert_eq!(ActionType::Ipython.endpoint(), "tools:run_ipython_cell");
    }
}
