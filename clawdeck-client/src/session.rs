//! Connection status and handshake validation.

use crate::dispatcher::{Registry, Subscription};
use crate::error::ClientError;
use clawdeck_protocol::{ConnectParams, HelloOk};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Connection status as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition, with the error message for [`ConnectionStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Callback invoked on every status change.
pub type StatusHandler = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

const STATUS_KEY: &str = "status";

/// Current status plus its observers.
pub(crate) struct StatusCell {
    tx: watch::Sender<StatusUpdate>,
    handlers: Registry<StatusHandler>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(StatusUpdate::default());
        Self {
            tx,
            handlers: Registry::new(),
        }
    }

    pub(crate) fn get(&self) -> ConnectionStatus {
        self.tx.borrow().status
    }

    pub(crate) fn watch(&self) -> watch::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    pub(crate) fn on<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.handlers.insert(STATUS_KEY, Arc::new(handler))
    }

    /// Publishes a status. Handlers run on every call, even if the status
    /// did not change.
    pub(crate) fn set(&self, status: ConnectionStatus, error: Option<String>) {
        match &error {
            Some(e) => tracing::info!("Gateway status: {} ({})", status, e),
            None => tracing::info!("Gateway status: {}", status),
        }

        let update = StatusUpdate { status, error };
        self.tx.send_replace(update.clone());
        for handler in self.handlers.snapshot(STATUS_KEY) {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&update))).is_err()
            {
                tracing::warn!("Status handler panicked");
            }
        }
    }
}

/// Validates the `connect` response payload against the requested range.
pub(crate) fn validate_hello(params: &ConnectParams, payload: Value) -> Result<HelloOk, ClientError> {
    let hello: HelloOk = serde_json::from_value(payload)
        .map_err(|e| ClientError::HandshakeRejected(format!("invalid hello payload: {}", e)))?;

    if !params.accepts(hello.protocol) {
        return Err(ClientError::UnsupportedProtocol {
            got: hello.protocol,
            min: params.min_protocol,
            max: params.max_protocol,
        });
    }

    Ok(hello)
}
