//! Best-effort push of observations to the Runtime's internal endpoint.
//! Failures are logged locally and never abort the action in progress — the
//! Manager's synthesized `end` covers for any loss at the boundary.

use std::time::Duration;

use mentisaid_core::Observation;

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ObservationSink {
    http: reqwest::Client,
    url: String,
}

impl ObservationSink {
    pub fn new(observation_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: observation_url,
        }
    }

    pub async fn push(&self, observation: &Observation) {
        if self.url.is_empty() {
            tracing::debug!(observation_type = ?observation.observation_type, "no observation URL configured, dropping");
            return;
        }
        let result = self
            .http
            .post(&self.url)
            .json(observation)
            .timeout(PUSH_TIMEOUT)
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, action_id = %observation.action_id, "observation push failed");
        }
    }
}
