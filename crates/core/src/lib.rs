//! Core types, error definitions, configuration, and logging setup shared
//! across every component of the MentisSandbox Runtime.

pub mod config;
pub mod error;
pub mod model;
pub mod tracing_setup;

pub use config::RuntimeConfig;
pub use error::{Error, Result, StatusClass};
pub use model::*;
pub use tracing_setup::configure_tracing;
