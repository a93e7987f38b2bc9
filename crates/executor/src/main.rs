//! The in-container executor: the process the Sandbox Manager's
//! `RUNTIME_OBSERVATION_URL`/`SANDBOX_ID` environment targets. Accepts shell
//! and IPython-cell actions, runs them, and pushes observations back.

mod config;
mod ipython;
mod observations;
mod shell;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use config::ExecutorConfig;
use ipython::{IpythonRequest, Kernel};
use observations::ObservationSink;
use shell::ShellRequest;

#[derive(Clone)]
struct AppState {
    config: Arc<ExecutorConfig>,
    sink: ObservationSink,
    kernel: Arc<Kernel>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())))
        .init();

    let config = ExecutorConfig::from_env();
    tracing::info!(sandbox_id = %config.sandbox_id, observation_url = %config.observation_url, "executor starting");

    let kernel = Arc::new(Kernel::new());
    kernel.warm_up().await;

    let state = AppState {
        sink: ObservationSink::new(config.observation_url.clone()),
        kernel,
        config: Arc::new(config),
    };

    let port = state.config.port;
    let app = Router::new()
        .route("/health", get(health))
        .route("/tools:run_shell_command", post(run_shell_command))
        .route("/tools:run_ipython_cell", post(run_ipython_cell))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind executor port");
    tracing::info!(%addr, "executor listening");
    axum::serve(listener, app).await.expect("executor server error");
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Accepts the job and returns `2xx` immediately; the work itself runs in a
/// detached task so shell commands execute fully concurrently.
async fn run_shell_command(State(state): State<AppState>, Json(req): Json<ShellRequest>) -> StatusCode {
    let sink = state.sink.clone();
    let workdir = state.config.workdir.clone();
    tokio::spawn(async move {
        shell::run(req, &workdir, sink).await;
    });
    StatusCode::ACCEPTED
}

/// Accepts the job and returns `2xx` immediately; the cell itself queues
/// behind any in-flight cell on this sandbox's kernel lock.
async fn run_ipython_cell(State(state): State<AppState>, Json(req): Json<IpythonRequest>) -> StatusCode {
    let sink = state.sink.clone();
    let kernel = state.kernel.clone();
    tokio::spawn(async move {
        kernel.run_cell(req, &sink).await;
    });
    StatusCode::ACCEPTED
}
