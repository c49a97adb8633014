//! Gateway frame types.
//!
//! Every message on the socket is one JSON object carrying a `type`
//! discriminator:
//!
//! ```text
//! {"type":"req","id":"7","method":"agents.list","params":{}}
//! {"type":"res","id":"7","ok":true,"payload":[...]}
//! {"type":"event","event":"agent.started","payload":{...},"seq":42}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Fallback message for error responses that carry no message of their own.
pub const UNKNOWN_GATEWAY_ERROR: &str = "Unknown gateway error";

/// A single wire unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "req")]
    Request(RequestFrame),
    #[serde(rename = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
}

impl Frame {
    /// Returns the wire discriminator of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Request(_) => "req",
            Frame::Response(_) => "res",
            Frame::Event(_) => "event",
        }
    }

    /// Returns the correlation id, if this frame kind has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Frame::Request(req) => Some(&req.id),
            Frame::Response(res) => Some(&res.id),
            Frame::Event(_) => None,
        }
    }
}

impl From<RequestFrame> for Frame {
    fn from(frame: RequestFrame) -> Self {
        Frame::Request(frame)
    }
}

impl From<ResponseFrame> for Frame {
    fn from(frame: ResponseFrame) -> Self {
        Frame::Response(frame)
    }
}

impl From<EventFrame> for Frame {
    fn from(frame: EventFrame) -> Self {
        Frame::Event(frame)
    }
}

/// Request frame. The id is assigned by the sender and must be unique among
/// its in-flight requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// Error details carried by a failed response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Gateway error code. Numeric codes are normalised to strings.
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            details: None,
        }
    }

    /// Returns the human-readable message, or the generic fallback.
    pub fn message_or_default(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_GATEWAY_ERROR)
    }
}

fn code_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Response frame, matched to exactly one outstanding request by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    /// A response without `ok` counts as failed.
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Returns the error message of a failed response, falling back to a
    /// generic message when the gateway sent none.
    pub fn error_message(&self) -> &str {
        self.error
            .as_ref()
            .map(ErrorShape::message_or_default)
            .unwrap_or(UNKNOWN_GATEWAY_ERROR)
    }

    /// Splits the response into its payload or its error.
    ///
    /// A successful response without a payload yields `Value::Null`.
    pub fn into_result(self) -> Result<Value, ErrorShape> {
        if self.ok {
            Ok(self.payload.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

/// Unsolicited event pushed by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Per-connection sequence number. Informational only; a value that is
    /// not an unsigned integer reads as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_seq",
        skip_serializing_if = "Option::is_none"
    )]
    pub seq: Option<u64>,
}

fn lenient_seq<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_u64())
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Returns true if the event name starts with `prefix` followed by a dot,
    /// e.g. `agent.started` is in namespace `agent`.
    pub fn in_namespace(&self, prefix: &str) -> bool {
        self.event
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}
