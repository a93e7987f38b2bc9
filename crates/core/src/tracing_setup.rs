//! Logging configuration for the Runtime process.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Result;

/// Configure structured logging: an `EnvFilter` built from `RUST_LOG`
/// (default `info,mentisaid=debug`), rendered either as human-readable text
/// or as JSON records, and installed as the global default subscriber.
///
/// Must be called exactly once, before the first log line is emitted.
pub fn configure_tracing(rust_log: Option<&str>, json_logs: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(rust_log.unwrap_or("info,mentisaid=debug"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}
