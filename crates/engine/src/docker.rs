//! Docker-backed [`ContainerEngine`], built on `bollard`.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;
use mentisaid_core::{Error, Result};

use crate::{ContainerEndpoint, ContainerEngine, ContainerSpec};

pub struct DockerEngine {
    docker: bollard::Docker,
}

impl DockerEngine {
    /// Connects to the local Docker daemon using its default socket/env.
    pub fn new() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| Error::engine(format!("failed to connect to Docker daemon: {e}")))?;
        Ok(Self { docker })
    }

    /// Wraps an existing client, for tests that stand up a local daemon.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_present(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(false)
            }
            Err(e) => Err(Error::engine(format!("image inspect failed: {e}"))),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let opts = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| Error::image_unavailable(format!("pulling {image}: {e}")))?;
        }

        if !self.image_present(image).await? {
            return Err(Error::image_unavailable(format!(
                "{image} still absent after pull"
            )));
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let container_name = format!("mentisaid-{}", uuid::Uuid::new_v4());
        let container_port_key = format!("{}/tcp", spec.container_port);

        let host_config = HostConfig {
            network_mode: Some("bridge".to_string()),
            port_bindings: Some(HashMap::from([(
                container_port_key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: None, // dynamic host-side binding
                }]),
            )])),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(HashMap::from([(
                container_port_key,
                HashMap::new(),
            )])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: container_name,
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::container_start_failed(format!("create: {e}")))?;

        Ok(container.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| Error::container_start_failed(format!("start: {e}")))
    }

    async fn inspect_endpoint(&self, container_id: &str, container_port: u16) -> Result<ContainerEndpoint> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Error::engine(format!("inspect: {e}")))?;

        let mut endpoint = ContainerEndpoint::default();

        let port_key = format!("{container_port}/tcp");
        if let Some(network_settings) = &inspect.network_settings {
            if let Some(ports) = &network_settings.ports {
                if let Some(Some(bindings)) = ports.get(&port_key) {
                    if let Some(binding) = bindings.first() {
                        if let Some(host_port) = binding.host_port.as_ref().and_then(|p| p.parse::<u16>().ok()) {
                            let host = binding
                                .host_ip
                                .clone()
                                .filter(|ip| !ip.is_empty() && ip != "0.0.0.0")
                                .unwrap_or_else(|| "127.0.0.1".to_string());
                            endpoint.host_port = Some((host, host_port));
                        }
                    }
                }
            }
            endpoint.internal_ip = network_settings
                .networks
                .as_ref()
                .and_then(|nets| nets.values().next())
                .and_then(|n| n.ip_address.clone())
                .filter(|ip| !ip.is_empty());
        }

        Ok(endpoint)
    }

    async fn stop_container(&self, container_id: &str, timeout_secs: i64) -> Result<()> {
        self.docker
            .stop_container(container_id, Some(StopContainerOptions { t: timeout_secs }))
            .await
            .map_err(|e| Error::engine(format!("stop: {e}")))
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::engine(format!("remove: {e}")))
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}
