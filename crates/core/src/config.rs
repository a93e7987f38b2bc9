//! Runtime configuration, loaded once from the environment at startup.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Flat, environment-variable-driven configuration for the Runtime process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    /// Label namespace stamped on every container this Runtime creates.
    pub scope: String,
    pub delete_on_shutdown: bool,
    /// Default executor image when `CreateSandbox` is not given one.
    pub box_image: String,
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5266,
            scope: "default".to_string(),
            delete_on_shutdown: false,
            box_image: "mentissandbox/box:latest".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            eprintln!("runtime configuration invalid, falling back to defaults: {e}");
            Self::default()
        })
    }

    fn try_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let s = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("scope", defaults.scope)?
            .set_default("delete_on_shutdown", defaults.delete_on_shutdown)?
            .set_default("box_image", defaults.box_image)?
            .set_default("json_logs", defaults.json_logs)?
            // Maps SANDBOXAID_HOST=.. to host, SANDBOXAID_JSON_LOGS=.. to
            // json_logs, etc.
            .add_source(Environment::with_prefix("SANDBOXAID"))
            // BOX_IMAGE is shared with the container image-resolution path
            // and intentionally sits outside the SANDBOXAID_ prefix.
            .set_override_option("box_image", std::env::var("BOX_IMAGE").ok())?
            .build()?;

        s.try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 5266);
        assert_eq!(cfg.scope, "default");
        assert!(!cfg.delete_on_shutdown);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let cfg = RuntimeConfig::from_env();
        assert_eq!(cfg.host, RuntimeConfig::default().host);
        assert_eq!(cfg.box_image, RuntimeConfig::default().box_image);
    }
}
