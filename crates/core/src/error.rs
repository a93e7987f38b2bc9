//! Error types for the MentisSandbox Runtime.

use thiserror::Error;

/// Result type alias using the Runtime's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type, grouped by the component that raises it.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Sandbox Manager errors
    // =========================================================================
    #[error("space not found: {0}")]
    SpaceNotFound(String),

    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),

    #[error("sandbox {0} is not running")]
    SandboxNotRunning(String),

    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("container start failed: {0}")]
    ContainerStartFailed(String),

    #[error("executor did not become healthy in time: {0}")]
    ExecutorUnhealthy(String),

    // =========================================================================
    // Space registry errors
    // =========================================================================
    #[error("space name already exists: {0}")]
    DuplicateSpaceName(String),

    #[error("invalid name {0:?}: must match ^[a-z0-9]([-a-z0-9]*[a-z0-9])?$, length 1-63")]
    InvalidName(String),

    // =========================================================================
    // WebSocket Hub errors
    // =========================================================================
    #[error("hub submission queue is full, message dropped")]
    HubQueueFull,

    // =========================================================================
    // Request / transport errors
    // =========================================================================
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("executor request failed: {0}")]
    ExecutorRequest(String),

    // =========================================================================
    // Generic
    // =========================================================================
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn space_not_found(id: impl Into<String>) -> Self {
        Self::SpaceNotFound(id.into())
    }

    pub fn sandbox_not_found(id: impl Into<String>) -> Self {
        Self::SandboxNotFound(id.into())
    }

    pub fn sandbox_not_running(id: impl Into<String>) -> Self {
        Self::SandboxNotRunning(id.into())
    }

    pub fn image_unavailable(msg: impl Into<String>) -> Self {
        Self::ImageUnavailable(msg.into())
    }

    pub fn container_start_failed(msg: impl Into<String>) -> Self {
        Self::ContainerStartFailed(msg.into())
    }

    pub fn executor_unhealthy(msg: impl Into<String>) -> Self {
        Self::ExecutorUnhealthy(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Maps this error onto the five HTTP classes the API boundary exposes.
    pub fn status_class(&self) -> StatusClass {
        match self {
            Error::BadRequest(_) | Error::Serialization(_) => StatusClass::BadRequest,
            Error::SpaceNotFound(_) | Error::SandboxNotFound(_) => StatusClass::NotFound,
            Error::DuplicateSpaceName(_) | Error::SandboxNotRunning(_) => StatusClass::Conflict,
            Error::InvalidName(_) => StatusClass::Unprocessable,
            _ => StatusClass::Internal,
        }
    }
}

/// The five error classes surfaced at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    NotFound,
    Conflict,
    Unprocessable,
    Internal,
}
