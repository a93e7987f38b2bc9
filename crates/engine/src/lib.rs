//! Abstraction over the container runtime backing each sandbox.
//!
//! The Sandbox Manager never talks to `bollard` directly; it talks to a
//! [`ContainerEngine`], so its orchestration logic (image resolution, create,
//! readiness polling, teardown) can be exercised in tests against
//! [`MockEngine`] without a Docker daemon.

pub mod docker;
pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use mentisaid_core::Result;
use serde::{Deserialize, Serialize};

pub use docker::DockerEngine;
pub use mock::MockEngine;

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    /// `KEY=value` pairs, as required by the container create API.
    pub env: Vec<String>,
    /// The TCP port the executor listens on inside the container.
    pub container_port: u16,
    /// Overrides the image's default command, if given.
    pub command: Option<Vec<String>>,
}

/// A host-reachable address for the executor inside a freshly-started
/// container. Either field may be absent depending on what the engine could
/// discover; the Manager prefers `host_port` over `internal_ip` per the
/// canonical discovery path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerEndpoint {
    /// `(host, port)` of a published port binding, if Docker created one.
    pub host_port: Option<(String, u16)>,
    /// The container's own network-namespace IP, usable when the Runtime
    /// shares that namespace (e.g. running inside the same Docker network).
    pub internal_ip: Option<String>,
}

impl ContainerEndpoint {
    pub fn is_empty(&self) -> bool {
        self.host_port.is_none() && self.internal_ip.is_none()
    }
}

/// Backend-agnostic container lifecycle operations.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether `image` is present in local storage.
    async fn image_present(&self, image: &str) -> Result<bool>;

    /// Pulls `image`, fully draining the pull stream before returning.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Creates (but does not start) a container from `spec`, returning its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Best-effort endpoint discovery; returns an empty [`ContainerEndpoint`]
    /// if nothing usable is known yet (the caller polls).
    async fn inspect_endpoint(&self, container_id: &str, container_port: u16) -> Result<ContainerEndpoint>;

    /// Graceful stop with the given timeout, in seconds.
    async fn stop_container(&self, container_id: &str, timeout_secs: i64) -> Result<()>;

    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Whether the backend itself is reachable (e.g. `docker.ping()`).
    async fn ping(&self) -> bool;
}
