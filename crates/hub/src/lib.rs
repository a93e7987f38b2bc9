//! The WebSocket Hub: per-sandbox subscriber sets and lock-free-to-producers
//! fan-out.
//!
//! A single dispatcher task drains a bounded submission queue and fans each
//! message out to every subscriber of the named sandbox through a bounded
//! per-connection buffer. A subscriber that cannot keep up is disconnected
//! rather than allowed to backpressure the dispatcher, which in turn must
//! never block the Sandbox Manager.

pub mod connection;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use mentisaid_core::SandboxId;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub use connection::serve_connection;

/// Identifies one subscriber connection, independent of its sandbox.
pub type ConnectionId = Uuid;

/// Depth of the Hub's global submission queue.
pub const SUBMISSION_QUEUE_DEPTH: usize = 256;
/// Depth of each subscriber's outbound buffer.
pub const OUTBOUND_BUFFER_DEPTH: usize = 256;
/// Per-frame write deadline.
pub const WRITE_DEADLINE: std::time::Duration = std::time::Duration::from_secs(10);
/// Read idle deadline, refreshed on every pong.
pub const READ_IDLE_DEADLINE: std::time::Duration = std::time::Duration::from_secs(60);
/// Ping period; must stay below [`READ_IDLE_DEADLINE`].
pub const PING_PERIOD: std::time::Duration = std::time::Duration::from_secs(54);

struct BroadcastJob {
    sandbox_id: SandboxId,
    bytes: Bytes,
}

type SubscriberMap = HashMap<SandboxId, HashMap<ConnectionId, mpsc::Sender<Bytes>>>;

/// The WebSocket fan-out component. Cheap to clone (it's an `Arc` wrapper in
/// practice; construct behind one with [`Hub::spawn`]).
pub struct Hub {
    subs: RwLock<SubscriberMap>,
    submit: mpsc::Sender<BroadcastJob>,
}

impl Hub {
    /// Builds a Hub and starts its dispatcher task.
    pub fn spawn() -> Arc<Self> {
        let (submit, rx) = mpsc::channel(SUBMISSION_QUEUE_DEPTH);
        let hub = Arc::new(Self {
            subs: RwLock::new(HashMap::new()),
            submit,
        });
        tokio::spawn(hub.clone().dispatch_loop(rx));
        hub
    }

    /// Non-blocking submission; delivers `bytes` verbatim to every current
    /// subscriber of `sandbox_id`. Drops and logs if the submission queue is
    /// full — the Manager must never block here.
    pub fn broadcast(&self, sandbox_id: impl Into<SandboxId>, bytes: impl Into<Bytes>) {
        let job = BroadcastJob {
            sandbox_id: sandbox_id.into(),
            bytes: bytes.into(),
        };
        if self.submit.try_send(job).is_err() {
            tracing::error!("hub submission queue full; dropping broadcast");
        }
    }

    /// Registers `sender` as a subscriber of `sandbox_id`.
    pub async fn subscribe(&self, sandbox_id: SandboxId, conn_id: ConnectionId, sender: mpsc::Sender<Bytes>) {
        self.subs
            .write()
            .await
            .entry(sandbox_id)
            .or_default()
            .insert(conn_id, sender);
    }

    /// Removes `conn_id` from `sandbox_id`'s subscriber set.
    pub async fn unsubscribe(&self, sandbox_id: &str, conn_id: ConnectionId) {
        let mut subs = self.subs.write().await;
        if let Some(conns) = subs.get_mut(sandbox_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                subs.remove(sandbox_id);
            }
        }
    }

    #[cfg(test)]
    async fn subscriber_count(&self, sandbox_id: &str) -> usize {
        self.subs.read().await.get(sandbox_id).map(|c| c.len()).unwrap_or(0)
    }

    async fn dispatch_loop(self: Arc<Self>, mut rx: mpsc::Receiver<BroadcastJob>) {
        while let Some(job) = rx.recv().await {
            let delinquent = {
                let subs = self.subs.read().await;
                let mut delinquent = Vec::new();
                if let Some(conns) = subs.get(&job.sandbox_id) {
                    for (conn_id, sender) in conns {
                        if sender.try_send(job.bytes.clone()).is_err() {
                            delinquent.push(*conn_id);
                        }
                    }
                }
                delinquent
            };
            for conn_id in delinquent {
                tracing::warn!(sandbox_id = %job.sandbox_id, %conn_id, "subscriber buffer full, disconnecting");
                self.unsubscribe(&job.sandbox_id, conn_id).await;
            }
        }
    }
}
