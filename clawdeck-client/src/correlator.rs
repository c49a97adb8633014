//! Request/response correlation.
//!
//! Every outgoing request gets a fresh id and a pending entry holding the
//! sender half of a oneshot channel. The entry is resolved by exactly one of:
//! the matching response, the per-request timeout, or connection teardown.
//! Whoever removes the entry from the table owns the resolution, so the
//! caller never sees two outcomes.

use crate::error::ClientError;
use crate::stats::ClientStats;
use clawdeck_protocol::ResponseFrame;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type Outcome = Result<Value, ClientError>;

#[derive(Debug)]
struct PendingRequest {
    method: String,
    tx: oneshot::Sender<Outcome>,
}

/// Pending-request table of one client instance.
#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingRequest>>,
    stats: Arc<ClientStats>,
}

impl Correlator {
    pub fn new(stats: Arc<ClientStats>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Allocates the next request id: "1", "2", ... The counter never resets
    /// for the lifetime of the instance and advances on every call, including
    /// calls rejected because no socket is open.
    pub fn next_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Registers a pending request. Must happen before the frame is written
    /// so a fast response cannot arrive unmatched.
    pub fn register(&self, id: &str, method: &str) -> PendingCall<'_> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id.to_string(),
            PendingRequest {
                method: method.to_string(),
                tx,
            },
        );
        PendingCall {
            correlator: self,
            id: id.to_string(),
            method: method.to_string(),
            rx,
        }
    }

    /// Resolves the request matching `response`. Returns false for an
    /// unmatched id, which is otherwise ignored.
    pub fn resolve(&self, response: ResponseFrame) -> bool {
        let Some(pending) = self.pending.lock().remove(&response.id) else {
            tracing::debug!("Discarding response for unknown request id={}", response.id);
            self.stats.response_unmatched();
            return false;
        };

        self.stats.response_matched();
        tracing::debug!(
            "Response id={} method={} ok={}",
            response.id,
            pending.method,
            response.ok
        );
        let outcome = response.into_result().map_err(ClientError::from);
        // The caller may have gone away; nothing to do then.
        let _ = pending.tx.send(outcome);
        true
    }

    /// Rejects every pending request with `error`. Returns how many were
    /// rejected.
    pub fn reject_all(&self, error: &ClientError) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (id, pending) in &drained {
            tracing::debug!("Rejecting pending request id={} method={}", id, pending.method);
        }
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(error.clone()));
        }
        count
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn remove(&self, id: &str) -> bool {
        self.pending.lock().remove(id).is_some()
    }
}

/// Caller side of a registered request.
///
/// Dropping it before completion removes the pending entry.
#[derive(Debug)]
pub struct PendingCall<'a> {
    correlator: &'a Correlator,
    id: String,
    method: String,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingCall<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Abandons the request without waiting.
    pub fn cancel(self) {
        self.correlator.remove(&self.id);
    }

    /// Waits for the outcome, failing with [`ClientError::Timeout`] once
    /// `timeout` elapses.
    pub async fn wait(mut self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                if self.correlator.remove(&self.id) {
                    tracing::debug!("Request id={} method={} timed out", self.id, self.method);
                    self.correlator.stats.timeout();
                    Err(ClientError::Timeout {
                        method: self.method.clone(),
                    })
                } else {
                    // Resolved between the deadline and the removal.
                    self.rx.try_recv().unwrap_or(Err(ClientError::ConnectionClosed))
                }
            }
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.correlator.remove(&self.id);
    }
}
