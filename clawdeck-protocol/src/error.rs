//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no `type` discriminator")]
    MissingType,

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} frame: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MissingType;
        assert!(err.to_string().contains("type"));

        let err = ProtocolError::UnknownType("ping".to_string());
        assert!(err.to_string().contains("ping"));

        let err = ProtocolError::Malformed {
            kind: "res",
            reason: "missing field `id`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("res"));
        assert!(msg.contains("id"));
    }
}
