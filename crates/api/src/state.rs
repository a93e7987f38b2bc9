//! Shared state handed to every handler: the three components the API
//! surface does nothing but validate input for and route calls to.

use std::sync::Arc;

use mentisaid_core::RuntimeConfig;
use mentisaid_hub::Hub;
use mentisaid_manager::SandboxManager;
use mentisaid_spaces::SpaceRegistry;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SandboxManager>,
    pub hub: Arc<Hub>,
    pub spaces: Arc<SpaceRegistry>,
    pub config: RuntimeConfig,
    pub metrics_handle: PrometheusHandle,
}
