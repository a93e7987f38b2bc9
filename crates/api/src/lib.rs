//! The API surface: input validation and routing of calls to the Sandbox
//! Manager, Space Registry, and WebSocket Hub. No business logic lives
//! here — every handler either returns a read straight from one of those
//! components or translates a request into one call against them.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use mentisaid_core::RuntimeConfig;
use mentisaid_hub::Hub;
use mentisaid_manager::SandboxManager;
use mentisaid_spaces::SpaceRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full router described in the external interfaces section:
/// liveness and metrics mounted both bare and under `/v1`, the spaces/
/// sandboxes CRUD surface, the two action endpoints, the internal
/// observation push, and the stream upgrade.
pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .route("/spaces", post(handlers::spaces::create_space).get(handlers::spaces::list_spaces))
        .route(
            "/spaces/{sid}",
            get(handlers::spaces::get_space)
                .put(handlers::spaces::update_space)
                .delete(handlers::spaces::delete_space),
        )
        .route("/spaces/{sid}/sandboxes", post(handlers::sandboxes::create_sandbox))
        .route(
            "/spaces/{sid}/sandboxes/{sbid}",
            get(handlers::sandboxes::get_sandbox).delete(handlers::sandboxes::delete_sandbox),
        )
        .route(
            "/spaces/{sid}/sandboxes/{sbid}/tools:run_shell_command",
            post(handlers::actions::run_shell_command),
        )
        .route(
            "/spaces/{sid}/sandboxes/{sbid}/tools:run_ipython_cell",
            post(handlers::actions::run_ipython_cell),
        )
        .route("/internal/observations/{sbid}", post(handlers::internal::receive_observation))
        .route("/sandboxes/{sbid}/stream", get(handlers::stream::stream));

    // axum 0.7 frees `:` for literal path segments (its param syntax moved
    // to `{param}`), which is what lets `tools:run_shell_command` live as a
    // plain segment above rather than needing URL-encoding tricks.
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the Runtime's component stack and serves the router until the
/// process receives a shutdown signal, honoring the 30s graceful shutdown
/// budget and `delete-on-shutdown` configuration from the concurrency model.
pub async fn run(
    config: RuntimeConfig,
    manager: Arc<SandboxManager>,
    hub: Arc<Hub>,
    spaces: Arc<SpaceRegistry>,
    metrics_handle: PrometheusHandle,
) -> mentisaid_core::Result<()> {
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| mentisaid_core::Error::internal(format!("invalid bind address: {e}")))?;

    let delete_on_shutdown = config.delete_on_shutdown;
    let state = AppState {
        manager: manager.clone(),
        hub,
        spaces,
        config,
        metrics_handle,
    };
    let router = build_router(state);

    tracing::info!(%addr, "Runtime API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if delete_on_shutdown {
        tracing::info!("delete-on-shutdown configured, tearing down remaining sandboxes");
        for sandbox_id in manager.all_sandbox_ids().await {
            if let Err(e) = manager.delete_sandbox(&sandbox_id).await {
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "failed to delete sandbox during shutdown");
            }
        }
    }

    Ok(())
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!(grace_seconds = SHUTDOWN_GRACE.as_secs(), "shutdown signal received, draining");
}
