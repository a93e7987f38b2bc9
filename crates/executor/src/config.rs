//! Executor configuration: read once from the environment the Sandbox
//! Manager populates when it creates this container (`SANDBOX_ID`,
//! `RUNTIME_OBSERVATION_URL`), plus a couple of executor-local knobs.

use config::{Config, ConfigError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub sandbox_id: String,
    pub observation_url: String,
    pub port: u16,
    /// Persistent working directory shell commands run in, per §4.3.
    pub workdir: String,
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            eprintln!("executor configuration invalid, falling back to defaults: {e}");
            Self {
                sandbox_id: String::new(),
                observation_url: String::new(),
                port: 8000,
                workdir: "/work".to_string(),
            }
        })
    }

    // The four env vars the Manager/operator populate (`SANDBOX_ID`,
    // `RUNTIME_OBSERVATION_URL`, `EXECUTOR_PORT`, `EXECUTOR_WORKDIR`) don't
    // share a common prefix, so each is wired in as an explicit override
    // rather than a single `Environment::with_prefix` source.
    fn try_from_env() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("sandbox_id", "")?
            .set_default("observation_url", "")?
            .set_default("port", 8000)?
            .set_default("workdir", "/work")?
            .set_override_option("sandbox_id", std::env::var("SANDBOX_ID").ok())?
            .set_override_option("observation_url", std::env::var("RUNTIME_OBSERVATION_URL").ok())?
            .set_override_option("port", std::env::var("EXECUTOR_PORT").ok())?
            .set_override_option("workdir", std::env::var("EXECUTOR_WORKDIR").ok())?
            .build()?;

        s.try_deserialize()
    }
}
