//! Request/response channel to the page side.
//!
//! Each request carries a ULID correlation id and waits on a oneshot for the
//! matching [`BridgeResponse`]. A request that sees no answer within the
//! timeout resolves to [`SolveError::BridgeTimeout`] and its slot is dropped,
//! so a late response is ignored instead of waking a caller that gave up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use solvesync_protocol::{BridgeMethod, BridgeRequest, BridgeResponse};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{Result, SolveError};
use crate::services::BackendSyncService;

type PendingMap = HashMap<String, oneshot::Sender<BridgeResponse>>;

/// Removes a request's waiter when the request finishes or is dropped.
struct PendingSlot<'a> {
    pending: &'a StdMutex<PendingMap>,
    id: String,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

pub struct BridgeChannel {
    outbound: mpsc::UnboundedSender<BridgeRequest>,
    pending: StdMutex<PendingMap>,
    timeout: Duration,
}

impl BridgeChannel {
    /// Returns the channel and the receiver the transport drains to deliver
    /// requests to the page.
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<BridgeRequest>) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let channel = Self {
            outbound,
            pending: StdMutex::new(HashMap::new()),
            timeout,
        };
        (channel, requests)
    }

    pub async fn request(&self, method: BridgeMethod, params: Option<Value>) -> Result<Value> {
        let id = Ulid::new().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id: id.clone(),
        };

        if self
            .outbound
            .send(BridgeRequest::new(id.clone(), method, params))
            .is_err()
        {
            return Err(SolveError::BridgeClosed);
        }
        debug!(id = %id, method = ?method, "Bridge request sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) if response.ok => Ok(response.data.unwrap_or(Value::Null)),
            Ok(Ok(response)) => {
                let message = response
                    .error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "request rejected".to_string());
                Err(SolveError::network("bridge", message))
            }
            Ok(Err(_)) => Err(SolveError::BridgeClosed),
            Err(_) => {
                warn!(id = %id, method = ?method, "Bridge request timed out");
                Err(SolveError::BridgeTimeout {
                    id,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    pub async fn handshake(&self) -> Result<Value> {
        self.request(BridgeMethod::Handshake, None).await
    }

    /// Routes a response to its waiting request. Returns false for unknown
    /// or already-expired ids.
    pub fn resolve(&self, response: BridgeResponse) -> bool {
        let Some(waiter) = self.lock_pending().remove(&response.id) else {
            debug!(id = %response.id, "Dropping bridge response with no waiter");
            return false;
        };
        waiter.send(response).is_ok()
    }

    pub fn pending(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Backend sync routed through the page bridge.
pub struct BridgeBackendSync {
    channel: Arc<BridgeChannel>,
}

impl BridgeBackendSync {
    pub fn new(channel: Arc<BridgeChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl BackendSyncService for BridgeBackendSync {
    async fn push(&self, problem_url: &str) -> Result<Value> {
        self.channel
            .request(
                BridgeMethod::PushProblem,
                Some(json!({ "problemUrl": problem_url })),
            )
            .await
    }
}
