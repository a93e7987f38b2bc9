//! MentisSandbox Runtime: the control plane binary. Wires the Sandbox
//! Manager, WebSocket Hub, and Space Registry together behind the API
//! surface and serves them until shutdown.

use std::sync::Arc;

use mentisaid_core::{configure_tracing, RuntimeConfig};
use mentisaid_engine::{ContainerEngine, DockerEngine};
use mentisaid_hub::Hub;
use mentisaid_manager::SandboxManager;
use mentisaid_spaces::SpaceRegistry;
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env();
    configure_tracing(std::env::var("RUST_LOG").ok().as_deref(), config.json_logs)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "MentisSandbox Runtime starting");

    let engine = Arc::new(DockerEngine::new()?);
    if !engine.ping().await {
        tracing::warn!("Docker daemon not reachable at startup; sandbox creation will fail until it is");
    }

    let hub = Hub::spawn();
    let spaces = Arc::new(SpaceRegistry::new());
    let manager = SandboxManager::new(engine, hub.clone(), spaces.clone(), config.clone());

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;

    tracing::info!(addr = %config.bind_addr(), scope = %config.scope, box_image = %config.box_image, "configuration loaded");

    mentisaid_api::run(config, manager, hub, spaces, metrics_handle).await?;

    tracing::info!("MentisSandbox Runtime shut down");
    Ok(())
}
