//! In-memory [`ContainerEngine`] for tests that must not require a Docker
//! daemon.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use mentisaid_core::Result;

use crate::{ContainerEndpoint, ContainerEngine, ContainerSpec};

/// Deterministic stand-in for [`crate::DockerEngine`].
///
/// By default every operation succeeds immediately and `inspect_endpoint`
/// reports a fixed loopback endpoint, so a manager under test can reach
/// "ready" without a real container ever existing.
pub struct MockEngine {
    images: Mutex<HashSet<String>>,
    endpoint: ContainerEndpoint,
    fail_health: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            images: Mutex::new(HashSet::new()),
            endpoint: ContainerEndpoint {
                host_port: Some(("127.0.0.1".to_string(), 0)),
                internal_ip: None,
            },
            fail_health: false,
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the endpoint returned by `inspect_endpoint` (e.g. to point
    /// at a local test HTTP server mimicking the executor).
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = ContainerEndpoint {
            host_port: Some((host.into(), port)),
            internal_ip: None,
        };
        self
    }

    /// Makes `inspect_endpoint` report nothing, simulating a container whose
    /// network has not come up yet.
    pub fn with_no_endpoint(mut self) -> Self {
        self.endpoint = ContainerEndpoint::default();
        self
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn image_present(&self, image: &str) -> Result<bool> {
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, _spec: &ContainerSpec) -> Result<String> {
        Ok(format!("mock-container-{}", uuid::Uuid::new_v4()))
    }

    async fn start_container(&self, _container_id: &str) -> Result<()> {
        Ok(())
    }

    async fn inspect_endpoint(&self, _container_id: &str, _container_port: u16) -> Result<ContainerEndpoint> {
        Ok(self.endpoint.clone())
    }

    async fn stop_container(&self, _container_id: &str, _timeout_secs: i64) -> Result<()> {
        Ok(())
    }

    async fn remove_container(&self, _container_id: &str) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> bool {
        !self.fail_health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pull_then_present() {
        let engine = MockEngine::new();
        assert!(!engine.image_present("img:latest").await.unwrap());
        engine.pull_image("img:latest").await.unwrap();
        assert!(engine.image_present("img:latest").await.unwrap());
    }

    #[tokio::test]
    async fn no_endpoint_reports_empty() {
        let engine = MockEngine::new().with_no_endpoint();
        let ep = engine.inspect_endpoint("c1", 8000).await.unwrap();
        assert!(ep.is_empty());
    }

    #[tokio::test]
    async fn custom_endpoint_reported() {
        let engine = MockEngine::new().with_endpoint("127.0.0.1", 9001);
        let ep = engine.inspect_endpoint("c1", 8000).await.unwrap();
        assert_eq!(ep.host_port, Some(("127.0.0.1".to_string(), 9001)));
    }
}
