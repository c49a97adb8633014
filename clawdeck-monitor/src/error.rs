//! Monitor error types.

use crate::config::ConfigError;
use clawdeck_client::ClientError;
use thiserror::Error;

/// Monitor errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("monitor already running")]
    AlreadyRunning,
}

impl MonitorError {
    /// True if a later attempt might succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_client_error() {
        assert!(MonitorError::from(ClientError::NotConnected).is_retryable());
        assert!(!MonitorError::from(ClientError::Gateway {
            code: "FORBIDDEN".to_string(),
            message: "nope".to_string(),
        })
        .is_retryable());
        assert!(!MonitorError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = MonitorError::from(ClientError::NotConnected);
        assert_eq!(err.to_string(), "client error: WebSocket not connected");
        let err = MonitorError::from(ConfigError::ValidationError("bad".to_string()));
        assert_eq!(
            err.to_string(),
            "configuration error: configuration validation failed: bad"
        );
    }
}
