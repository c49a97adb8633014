//! Client error types.

use clawdeck_protocol::ErrorShape;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("Request {method} timed out")]
    Timeout { method: String },

    #[error("{message}")]
    Gateway { code: String, message: String },

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("unsupported protocol version {got} (expected {min}..={max})")]
    UnsupportedProtocol { got: u32, min: u32, max: u32 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::ConnectionClosed
                | ClientError::Timeout { .. }
                | ClientError::Transport(_)
                | ClientError::Http(_)
        )
    }

    /// Returns the gateway error code, if the gateway rejected the request.
    pub fn gateway_code(&self) -> Option<&str> {
        match self {
            ClientError::Gateway { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<ErrorShape> for ClientError {
    fn from(shape: ErrorShape) -> Self {
        ClientError::Gateway {
            message: shape.message_or_default().to_string(),
            code: shape.code,
        }
    }
}

impl From<clawdeck_protocol::ProtocolError> for ClientError {
    fn from(err: clawdeck_protocol::ProtocolError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Json(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdeck_protocol::frame::UNKNOWN_GATEWAY_ERROR;

    #[test]
    fn test_gateway_error_from_shape() {
        let err = ClientError::from(ErrorShape::new("NOT_FOUND", "no such agent"));
        assert_eq!(err.to_string(), "no such agent");
        assert_eq!(err.gateway_code(), Some("NOT_FOUND"));
        assert!(!err.is_retryable());

        let err = ClientError::from(ErrorShape::default());
        assert_eq!(err.to_string(), UNKNOWN_GATEWAY_ERROR);
    }

    #[test]
    fn test_timeout_message_names_method() {
        let err = ClientError::Timeout {
            method: "agents.list".to_string(),
        };
        assert_eq!(err.to_string(), "Request agents.list timed out");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_connected_message() {
        assert_eq!(ClientError::NotConnected.to_string(), "WebSocket not connected");
    }
}
