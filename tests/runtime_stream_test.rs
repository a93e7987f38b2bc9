//! End-to-end coverage of the full stack: a real TCP listener serving the
//! API router, a real WebSocket client, and a `MockEngine`/`wiremock`
//! stand-in for Docker and the in-container executor. No component is
//! exercised through a Rust-level shortcut here — everything crosses the
//! wire the way a real agent client would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mentisaid_api::AppState;
use mentisaid_core::{Observation, ObservationType, RuntimeConfig, StreamKind};
use mentisaid_engine::MockEngine;
use mentisaid_hub::Hub;
use mentisaid_manager::SandboxManager;
use mentisaid_spaces::SpaceRegistry;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stands up the whole Runtime (manager, hub, spaces, router) bound to a
/// real ephemeral port and returns its base HTTP/WS addresses alongside the
/// `AppState` handle tests need for out-of-band assertions.
async fn spawn_runtime() -> (AppState, String, String) {
    let hub = Hub::spawn();
    let spaces = Arc::new(SpaceRegistry::new());
    let engine = Arc::new(MockEngine::new());
    let manager = SandboxManager::new(engine, hub.clone(), spaces.clone(), RuntimeConfig::default());
    let state = AppState {
        manager,
        hub,
        spaces,
        config: RuntimeConfig::default(),
        metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
    };

    let router = mentisaid_api::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });

    (state, format!("http://{addr}"), format!("ws://{addr}"))
}

/// A `MockEngine` wired to a `wiremock` server that answers `/health` and
/// accepts the action handshake, standing in for a real container + executor.
async fn executor_double() -> (MockServer, MockEngine) {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/health")).respond_with(ResponseTemplate::new(200)).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/tools:run_shell_command"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let port = server.address().port();
    (server, MockEngine::new().with_endpoint("127.0.0.1", port))
}

#[tokio::test]
async fn full_round_trip_through_http_and_a_real_websocket() {
    let (_double, engine) = executor_double().await;

    let hub = Hub::spawn();
    let spaces = Arc::new(SpaceRegistry::new());
    let manager = SandboxManager::new(Arc::new(engine), hub.clone(), spaces.clone(), RuntimeConfig::default());
    let state = AppState {
        manager: manager.clone(),
        hub,
        spaces,
        config: RuntimeConfig::default(),
        metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
    };
    let router = mentisaid_api::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });

    let http = reqwest::Client::new();
    let base = format!("http://{addr}");

    let created: serde_json::Value = http
        .post(format!("{base}/v1/spaces/default/sandboxes"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sandbox_id = created["sandbox_id"].as_str().unwrap().to_string();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/v1/sandboxes/{sandbox_id}/stream"))
        .await
        .unwrap();

    let action: serde_json::Value = http
        .post(format!("{base}/v1/spaces/default/sandboxes/{sandbox_id}/tools:run_shell_command"))
        .json(&serde_json::json!({"command": "echo hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let action_id = action["action_id"].as_str().unwrap().to_string();

    let start = next_observation(&mut ws).await;
    assert_eq!(start.observation_type, ObservationType::Start);
    assert_eq!(start.action_id, action_id);

    // The in-container executor would push these asynchronously; here we
    // play that role directly against the internal ingestion endpoint.
    let stream_obs = Observation::stream_line(action_id.clone(), StreamKind::Stdout, "hi");
    http.post(format!("{base}/v1/internal/observations/{sandbox_id}"))
        .json(&stream_obs)
        .send()
        .await
        .unwrap();

    let result_obs = Observation::result(action_id.clone(), 0, None);
    http.post(format!("{base}/v1/internal/observations/{sandbox_id}"))
        .json(&result_obs)
        .send()
        .await
        .unwrap();

    let streamed = next_observation(&mut ws).await;
    assert_eq!(streamed.observation_type, ObservationType::Stream);
    assert_eq!(streamed.line.as_deref(), Some("hi"));

    let result = next_observation(&mut ws).await;
    assert_eq!(result.observation_type, ObservationType::Result);
    assert_eq!(result.exit_code, Some(0));

    // Completion is signaled solely by a Manager-synthesized `end`, never by
    // the executor's own `result`/`error` frame.
    let end = next_observation(&mut ws).await;
    assert_eq!(end.observation_type, ObservationType::End);
    assert_eq!(end.action_id, action_id);
    assert_eq!(end.exit_code, Some(0));

    ws.close(None).await.ok();
}

#[tokio::test]
async fn a_second_subscriber_joining_mid_action_only_sees_what_comes_after() {
    let (_double, engine) = executor_double().await;
    let (state, base, ws_base) = {
        let hub = Hub::spawn();
        let spaces = Arc::new(SpaceRegistry::new());
        let manager = SandboxManager::new(Arc::new(engine), hub.clone(), spaces.clone(), RuntimeConfig::default());
        let state = AppState {
            manager,
            hub,
            spaces,
            config: RuntimeConfig::default(),
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        };
        let router = mentisaid_api::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service()).await.unwrap();
        });
        (state, format!("http://{addr}"), format!("ws://{addr}"))
    };

    let http = reqwest::Client::new();
    let created: serde_json::Value = http
        .post(format!("{base}/v1/spaces/default/sandboxes"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sandbox_id = created["sandbox_id"].as_str().unwrap().to_string();

    let action: serde_json::Value = http
        .post(format!("{base}/v1/spaces/default/sandboxes/{sandbox_id}/tools:run_shell_command"))
        .json(&serde_json::json!({"command": "echo hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let action_id = action["action_id"].as_str().unwrap().to_string();

    // Give the detached dispatch task a moment to emit `start` before the
    // second subscriber connects, so it genuinely misses it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut late_subscriber, _) =
        tokio_tungstenite::connect_async(format!("{ws_base}/v1/sandboxes/{sandbox_id}/stream")).await.unwrap();

    let result_obs = Observation::result(action_id.clone(), 0, None);
    http.post(format!("{base}/v1/internal/observations/{sandbox_id}"))
        .json(&result_obs)
        .send()
        .await
        .unwrap();

    let result = next_observation(&mut late_subscriber).await;
    assert_eq!(result.observation_type, ObservationType::Result);

    let end = next_observation(&mut late_subscriber).await;
    assert_eq!(end.observation_type, ObservationType::End);

    late_subscriber.close(None).await.ok();
    drop(state);
}

#[tokio::test]
async fn observation_stream_for_unknown_sandbox_is_rejected_before_upgrade() {
    let (state, base, _ws_base) = spawn_runtime().await;
    let response = reqwest::Client::new()
        .get(format!("{base}/v1/sandboxes/does-not-exist/stream"))
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    drop(state);
}

async fn next_observation(ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>) -> Observation {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).unwrap(),
            Ok(Some(Ok(Message::Ping(payload)))) => {
                ws.send(Message::Pong(payload)).await.unwrap();
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => panic!("websocket error: {e}"),
            Ok(None) => panic!("websocket closed before expected observation arrived"),
            Err(_) => panic!("timed out waiting for an observation"),
        }
    }
}
