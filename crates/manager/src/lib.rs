//! The Sandbox Manager: container lifecycle, readiness discovery, and
//! action dispatch. This is the component the rest of the Runtime is built
//! around — see the module-level algorithms below for the exact sequencing
//! each public operation follows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mentisaid_core::{
    ActionId, ActionType, Error, Observation, ObservationType, Result, RuntimeConfig, Sandbox,
    SandboxId, SandboxState, SpaceId,
};
use mentisaid_engine::{ContainerEngine, ContainerSpec};
use mentisaid_hub::Hub;
use mentisaid_spaces::SpaceRegistry;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Port the in-container executor is contractually required to listen on.
pub const EXECUTOR_PORT: u16 = 8000;

const DISCOVERY_ATTEMPTS: u32 = 5;
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(1);
const HEALTH_PROBE_BUDGET: Duration = Duration::from_secs(30);
const HEALTH_PROBE_TICK: Duration = Duration::from_millis(500);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const ACTION_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE_SECONDS: i64 = 5;

/// `CreateSandbox(image?, command?)` input beyond the owning space.
#[derive(Debug, Clone, Default)]
pub struct CreateSandboxRequest {
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
}

pub struct SandboxManager {
    engine: Arc<dyn ContainerEngine>,
    hub: Arc<Hub>,
    spaces: Arc<SpaceRegistry>,
    config: RuntimeConfig,
    http: reqwest::Client,
    index: RwLock<HashMap<SandboxId, Sandbox>>,
}

impl SandboxManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, hub: Arc<Hub>, spaces: Arc<SpaceRegistry>, config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            hub,
            spaces,
            config,
            http: reqwest::Client::new(),
            index: RwLock::new(HashMap::new()),
        })
    }

    /// Verifies the space, resolves and ensures the image, creates and
    /// starts the container, discovers the executor's address, and blocks
    /// until `/health` responds before returning. See the algorithm notes in
    /// the project's design documentation for the full rationale.
    pub async fn create_sandbox(&self, space_id: SpaceId, req: CreateSandboxRequest) -> Result<SandboxId> {
        if !self.spaces.exists(&space_id).await {
            return Err(Error::space_not_found(space_id));
        }

        let image = req.image.unwrap_or_else(|| self.config.box_image.clone());
        self.ensure_image(&image).await?;

        let sandbox_id = uuid::Uuid::new_v4().to_string();
        let observation_url = format!(
            "http://{}:{}/v1/internal/observations/{}",
            self.config.host, self.config.port, sandbox_id
        );

        let spec = ContainerSpec {
            image: image.clone(),
            labels: HashMap::from([
                ("scope".to_string(), self.config.scope.clone()),
                ("sandbox-id".to_string(), sandbox_id.clone()),
                ("space-id".to_string(), space_id.clone()),
            ]),
            env: vec![
                format!("SANDBOX_ID={sandbox_id}"),
                format!("RUNTIME_OBSERVATION_URL={observation_url}"),
            ],
            container_port: EXECUTOR_PORT,
            command: req.command,
        };

        let container_id = match self.engine.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => return Err(Error::container_start_failed(e.to_string())),
        };

        if let Err(e) = self.engine.start_container(&container_id).await {
            let _ = self.engine.remove_container(&container_id).await;
            return Err(Error::container_start_failed(e.to_string()));
        }

        let agent_url = match self.discover_agent_url(&container_id).await {
            Some(url) => url,
            None => {
                self.force_cleanup(&container_id).await;
                return Err(Error::container_start_failed(
                    "no endpoint discovered for container".to_string(),
                ));
            }
        };

        if !self.wait_for_health(&agent_url).await {
            self.force_cleanup(&container_id).await;
            return Err(Error::executor_unhealthy(format!("{agent_url}/health never returned 2xx")));
        }

        let sandbox = Sandbox::new(sandbox_id.clone(), space_id.clone(), container_id, agent_url);
        self.index.write().await.insert(sandbox_id.clone(), sandbox);
        self.spaces.register_sandbox(&space_id, sandbox_id.clone()).await?;

        metrics::counter!("mentisaid_sandboxes_created_total").increment(1);
        tracing::info!(sandbox_id = %sandbox_id, %space_id, "sandbox ready");
        Ok(sandbox_id)
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.engine.image_present(image).await? {
            return Ok(());
        }
        self.engine.pull_image(image).await?;
        if !self.engine.image_present(image).await? {
            return Err(Error::image_unavailable(format!("{image} missing after pull")));
        }
        Ok(())
    }

    /// Polls `ContainerInspect` with backoff, preferring a host-side port
    /// mapping over the container's internal IP (the canonical discovery
    /// path; see the open-question resolution in the design notes).
    async fn discover_agent_url(&self, container_id: &str) -> Option<String> {
        for attempt in 0..DISCOVERY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(DISCOVERY_INTERVAL).await;
            }
            if let Ok(endpoint) = self.engine.inspect_endpoint(container_id, EXECUTOR_PORT).await {
                if let Some((host, port)) = endpoint.host_port {
                    return Some(format!("http://{host}:{port}"));
                }
                if let Some(ip) = endpoint.internal_ip {
                    return Some(format!("http://{ip}:{EXECUTOR_PORT}"));
                }
            }
        }
        None
    }

    async fn wait_for_health(&self, agent_url: &str) -> bool {
        let deadline = Instant::now() + HEALTH_PROBE_BUDGET;
        let url = format!("{agent_url}/health");
        while Instant::now() < deadline {
            let probe = self.http.get(&url).timeout(HEALTH_PROBE_TIMEOUT).send().await;
            if matches!(probe, Ok(resp) if resp.status().is_success()) {
                return true;
            }
            tokio::time::sleep(HEALTH_PROBE_TICK).await;
        }
        false
    }

    async fn force_cleanup(&self, container_id: &str) {
        let _ = self.engine.stop_container(container_id, STOP_GRACE_SECONDS).await;
        let _ = self.engine.remove_container(container_id).await;
    }

    pub async fn get_sandbox(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.index
            .read()
            .await
            .get(sandbox_id)
            .cloned()
            .ok_or_else(|| Error::sandbox_not_found(sandbox_id))
    }

    pub async fn sandbox_exists(&self, sandbox_id: &str) -> bool {
        self.index.read().await.contains_key(sandbox_id)
    }

    /// Marks the sandbox `DELETING` (so a racing `initiate_action` sees
    /// `SandboxNotRunning` instead of dispatching against a container that's
    /// about to disappear), tears the container down, then removes the
    /// record from the index regardless of whether the engine calls
    /// errored. Idempotent: a second call on the same id — whether already
    /// mid-deletion or fully gone — returns `SandboxNotFound`.
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<()> {
        let sandbox = {
            let mut index = self.index.write().await;
            let sandbox = index.get_mut(sandbox_id).ok_or_else(|| Error::sandbox_not_found(sandbox_id))?;
            if sandbox.state == SandboxState::Deleting {
                return Err(Error::sandbox_not_found(sandbox_id));
            }
            sandbox.is_running = false;
            sandbox.state = SandboxState::Deleting;
            sandbox.clone()
        };

        if let Err(e) = self.engine.stop_container(&sandbox.container_id, STOP_GRACE_SECONDS).await {
            tracing::warn!(sandbox_id = %sandbox_id, error = %e, "container stop failed during deletion, proceeding to force-remove");
        }
        if let Err(e) = self.engine.remove_container(&sandbox.container_id).await {
            tracing::warn!(sandbox_id = %sandbox_id, error = %e, "container remove failed during deletion");
        }

        self.index.write().await.remove(sandbox_id);
        self.spaces.unregister_sandbox(&sandbox.space_id, sandbox_id).await;
        metrics::counter!("mentisaid_sandboxes_deleted_total").increment(1);
        Ok(())
    }

    /// Validates the sandbox, generates an `action_id`, and returns it
    /// immediately; the executor handshake runs in a detached task.
    pub async fn initiate_action(self: &Arc<Self>, sandbox_id: &str, action_type: ActionType, payload: serde_json::Value) -> Result<ActionId> {
        let sandbox = {
            let index = self.index.read().await;
            let sandbox = index.get(sandbox_id).ok_or_else(|| Error::sandbox_not_found(sandbox_id))?;
            if !sandbox.is_running {
                return Err(Error::sandbox_not_running(sandbox_id));
            }
            sandbox.clone()
        };

        let action_id = uuid::Uuid::new_v4().to_string();
        let this = self.clone();
        let sbx_id = sandbox_id.to_string();
        let aid = action_id.clone();
        tokio::spawn(async move {
            this.dispatch_action(sbx_id, sandbox.agent_url, aid, action_type, payload).await;
        });

        metrics::counter!("mentisaid_actions_initiated_total", "type" => action_type.endpoint()).increment(1);
        Ok(action_id)
    }

    async fn dispatch_action(
        &self,
        sandbox_id: SandboxId,
        agent_url: String,
        action_id: ActionId,
        action_type: ActionType,
        payload: serde_json::Value,
    ) {
        self.emit(&sandbox_id, Observation::start(action_id.clone()));

        let mut body = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        body.insert("action_id".to_string(), serde_json::Value::String(action_id.clone()));

        let url = format!("{agent_url}/{}", action_type.endpoint());
        let response = self
            .http
            .post(&url)
            .json(&body)
            .timeout(ACTION_HANDSHAKE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() < 400 => {
                // Success: the executor will push subsequent observations
                // asynchronously; nothing further to do here.
            }
            Ok(resp) => {
                let detail = resp.text().await.unwrap_or_default();
                tracing::warn!(sandbox_id = %sandbox_id, %action_id, detail, "executor rejected action handshake");
                self.emit(&sandbox_id, Observation::error(action_id.clone(), detail));
                self.emit(&sandbox_id, Observation::end(action_id, -1, None));
            }
            Err(e) => {
                tracing::warn!(sandbox_id = %sandbox_id, %action_id, error = %e, "executor handshake transport failure");
                self.emit(&sandbox_id, Observation::error(action_id.clone(), e.to_string()));
                self.emit(&sandbox_id, Observation::end(action_id, -1, None));
            }
        }
    }

    fn emit(&self, sandbox_id: &str, observation: Observation) {
        match serde_json::to_vec(&observation) {
            Ok(bytes) => self.hub.broadcast(sandbox_id.to_string(), bytes),
            Err(e) => tracing::error!(error = %e, "failed to serialize synthesized observation"),
        }
    }

    /// Broadcasts the raw bytes unconditionally, then — if they parse as an
    /// observation — synthesizes an `end` on `result` or `error`. `result` is
    /// the sole synthesis trigger; an incoming `end` is broadcast raw and
    /// otherwise ignored, so the executor can never cause a duplicate `end`
    /// by also emitting one itself.
    pub async fn receive_observation(&self, sandbox_id: &str, raw: Bytes) {
        if !self.sandbox_exists(sandbox_id).await {
            tracing::debug!(sandbox_id, "observation for unknown sandbox dropped");
            return;
        }

        self.hub.broadcast(sandbox_id.to_string(), raw.clone());

        let observation: Observation = match serde_json::from_slice(&raw) {
            Ok(obs) => obs,
            Err(e) => {
                tracing::debug!(sandbox_id, error = %e, "observation bytes did not parse; raw bytes already broadcast");
                return;
            }
        };

        metrics::counter!(
            "mentisaid_observations_ingested_total",
            "observation_type" => format!("{:?}", observation.observation_type)
        )
        .increment(1);

        match observation.observation_type {
            ObservationType::Result => {
                let exit_code = observation.exit_code.unwrap_or(0);
                self.emit(sandbox_id, Observation::end(observation.action_id, exit_code, observation.error));
            }
            ObservationType::Error => {
                let exit_code = observation.exit_code.unwrap_or(-1);
                self.emit(sandbox_id, Observation::end(observation.action_id, exit_code, observation.error));
            }
            ObservationType::Start | ObservationType::Stream | ObservationType::End => {
                // Already broadcast raw above; no further action.
            }
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Used by graceful shutdown when `delete-on-shutdown` is configured.
    pub async fn all_sandbox_ids(&self) -> Vec<SandboxId> {
        self.index.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentisaid_engine::MockEngine;

    fn manager_with_engine(engine: MockEngine) -> Arc<SandboxManager> {
        let hub = Hub::spawn();
        let spaces = Arc::new(SpaceRegistry::new());
        SandboxManager::new(Arc::new(engine), hub, spaces, RuntimeConfig::default())
    }

    #[tokio::test]
    async fn create_sandbox_requires_existing_space() {
        let manager = manager_with_engine(MockEngine::new());
        let err = manager
            .create_sandbox("does-not-exist".to_string(), CreateSandboxRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SpaceNotFound(_)));
    }

    #[tokio::test]
    async fn create_sandbox_fails_when_no_endpoint_discovered() {
        let manager = manager_with_engine(MockEngine::new().with_no_endpoint());
        let err = manager
            .create_sandbox("default".to_string(), CreateSandboxRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContainerStartFailed(_)));
    }

    #[tokio::test]
    async fn get_sandbox_not_found() {
        let manager = manager_with_engine(MockEngine::new());
        let err = manager.get_sandbox("nope").await.unwrap_err();
        assert!(matches!(err, Error::SandboxNotFound(_)));
    }

    #[tokio::test]
    async fn delete_sandbox_is_idempotent() {
        let manager = manager_with_engine(MockEngine::new());
        let err = manager.delete_sandbox("nope").await.unwrap_err();
        assert!(matches!(err, Error::SandboxNotFound(_)));
    }

    #[tokio::test]
    async fn delete_sandbox_marks_deleting_before_teardown_then_removes_it() {
        let manager = manager_with_engine(MockEngine::new());
        manager.index.write().await.insert(
            "sbx-1".to_string(),
            Sandbox::new("sbx-1".to_string(), "default".to_string(), "c1".to_string(), "http://x".to_string()),
        );

        manager.delete_sandbox("sbx-1").await.unwrap();

        assert!(!manager.sandbox_exists("sbx-1").await);
        // A second delete sees it already gone, not a re-entrant `Deleting`.
        let err = manager.delete_sandbox("sbx-1").await.unwrap_err();
        assert!(matches!(err, Error::SandboxNotFound(_)));
    }

    #[tokio::test]
    async fn initiate_action_rejects_not_running_sandbox() {
        let manager = manager_with_engine(MockEngine::new());
        let mut sandbox = Sandbox::new("sbx-1".to_string(), "default".to_string(), "c1".to_string(), "http://x".to_string());
        sandbox.is_running = false;
        sandbox.state = SandboxState::Deleting;
        manager.index.write().await.insert("sbx-1".to_string(), sandbox);

        let err = manager
            .initiate_action("sbx-1", ActionType::Shell, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SandboxNotRunning(_)));
    }

    #[tokio::test]
    async fn initiate_action_rejects_unknown_sandbox() {
        let manager = manager_with_engine(MockEngine::new());
        let err = manager
            .initiate_action("nope", ActionType::Shell, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SandboxNotFound(_)));
    }

    #[tokio::test]
    async fn receive_observation_on_unknown_sandbox_is_silently_dropped() {
        let manager = manager_with_engine(MockEngine::new());
        // Must not panic and must not broadcast to anyone.
        manager.receive_observation("nope", Bytes::from_static(b"{}")).await;
    }

    #[tokio::test]
    async fn create_sandbox_succeeds_against_a_healthy_executor() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let host_port = server.address().port();
        let engine = MockEngine::new().with_endpoint("127.0.0.1", host_port);
        let manager = manager_with_engine(engine);

        let sandbox_id = manager
            .create_sandbox("default".to_string(), CreateSandboxRequest::default())
            .await
            .unwrap();

        let sandbox = manager.get_sandbox(&sandbox_id).await.unwrap();
        assert_eq!(sandbox.space_id, "default");
        assert!(sandbox.is_running);
        assert!(sandbox.agent_url.contains(&host_port.to_string()));
    }

    #[tokio::test]
    async fn create_sandbox_fails_when_executor_never_becomes_healthy() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let host_port = server.address().port();
        let engine = MockEngine::new().with_endpoint("127.0.0.1", host_port);
        let manager = manager_with_engine(engine);

        let err = manager
            .create_sandbox("default".to_string(), CreateSandboxRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutorUnhealthy(_)));
    }

    #[tokio::test]
    async fn initiate_action_dispatches_and_synthesizes_end_on_handshake_failure() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/tools:run_shell_command"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let host_port = server.address().port();
        let engine = MockEngine::new().with_endpoint("127.0.0.1", host_port);
        let manager = manager_with_engine(engine);
        let sandbox_id = manager
            .create_sandbox("default".to_string(), CreateSandboxRequest::default())
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        manager.hub().subscribe(sandbox_id.clone(), uuid::Uuid::new_v4(), tx).await;

        let action_id = manager
            .initiate_action(&sandbox_id, ActionType::Shell, serde_json::json!({"command": "echo hi"}))
            .await
            .unwrap();

        let start = rx.recv().await.unwrap();
        let start: Observation = serde_json::from_slice(&start).unwrap();
        assert_eq!(start.observation_type, ObservationType::Start);
        assert_eq!(start.action_id, action_id);

        let error_obs = rx.recv().await.unwrap();
        let error_obs: Observation = serde_json::from_slice(&error_obs).unwrap();
        assert_eq!(error_obs.observation_type, ObservationType::Error);

        let end_obs = rx.recv().await.unwrap();
        let end_obs: Observation = serde_json::from_slice(&end_obs).unwrap();
        assert_eq!(end_obs.observation_type, ObservationType::End);
        assert_eq!(end_obs.exit_code, Some(-1));
    }

    #[tokio::test]
    async fn receive_observation_result_synthesizes_end() {
        let manager = manager_with_engine(MockEngine::new().with_no_endpoint());
        // Inject a sandbox directly to avoid standing up a fake executor.
        manager
            .index
            .write()
            .await
            .insert("sbx-1".to_string(), Sandbox::new("sbx-1".to_string(), "default".to_string(), "c1".to_string(), "http://x".to_string()));

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        manager.hub().subscribe("sbx-1".to_string(), uuid::Uuid::new_v4(), tx).await;

        let result = Observation::result("act-9", 0, None);
        manager
            .receive_observation("sbx-1", Bytes::from(serde_json::to_vec(&result).unwrap()))
            .await;

        let raw = rx.recv().await.unwrap();
        let raw_obs: Observation = serde_json::from_slice(&raw).unwrap();
        assert_eq!(raw_obs.observation_type, ObservationType::Result);

        let end = rx.recv().await.unwrap();
        let end_obs: Observation = serde_json::from_slice(&end).unwrap();
        assert_eq!(end_obs.observation_type, ObservationType::End);
        assert_eq!(end_obs.exit_code, Some(0));
    }

    #[tokio::test]
    async fn receive_observation_incoming_end_is_not_resynthesized() {
        let manager = manager_with_engine(MockEngine::new().with_no_endpoint());
        manager
            .index
            .write()
            .await
            .insert("sbx-1".to_string(), Sandbox::new("sbx-1".to_string(), "default".to_string(), "c1".to_string(), "http://x".to_string()));

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        manager.hub().subscribe("sbx-1".to_string(), uuid::Uuid::new_v4(), tx).await;

        let incoming_end = Observation::end("act-5", 0, None);
        manager
            .receive_observation("sbx-1", Bytes::from(serde_json::to_vec(&incoming_end).unwrap()))
            .await;

        let raw = rx.recv().await.unwrap();
        let raw_obs: Observation = serde_json::from_slice(&raw).unwrap();
        assert_eq!(raw_obs.observation_type, ObservationType::End);

        // No second `end` should follow.
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "incoming end must not be re-synthesized");
    }
}
