//! Text codec for gateway frames.
//!
//! One frame per socket message; there is no length prefix or batching.
//! Decoding reports each kind of malformed input separately so the caller
//! can decide what to do with it (the client drops all of them).

use crate::error::ProtocolError;
use crate::frame::{Frame, RequestFrame};
use serde_json::Value;

/// Encodes frames into socket text.
pub struct Encoder;

impl Encoder {
    /// Encodes any frame.
    pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(frame)?)
    }

    /// Encodes a request frame without cloning it into a [`Frame`].
    pub fn encode_request(request: &RequestFrame) -> Result<String, ProtocolError> {
        #[derive(serde::Serialize)]
        struct Tagged<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(flatten)]
            request: &'a RequestFrame,
        }

        Ok(serde_json::to_string(&Tagged {
            kind: "req",
            request,
        })?)
    }
}

/// Decodes socket text into frames.
pub struct Decoder;

impl Decoder {
    /// Decodes one frame.
    ///
    /// The input must be a JSON object whose `type` is `req`, `res` or
    /// `event`, with the fields that kind requires.
    pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        Self::decode_value(value)
    }

    /// Decodes one frame from an already-parsed JSON value.
    pub fn decode_value(value: Value) -> Result<Frame, ProtocolError> {
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let kind = match object.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            _ => return Err(ProtocolError::MissingType),
        };

        let kind: &'static str = match kind {
            "req" => "req",
            "res" => "res",
            "event" => "event",
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{EventFrame, ResponseFrame};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_request() {
        let request = RequestFrame::new("1", "agents.files.get")
            .with_params(json!({"agentId": "main", "fileName": "SOUL.md"}));

        let text = Encoder::encode_request(&request).unwrap();
        let decoded = Decoder::decode(&text).unwrap();

        assert_eq!(decoded, Frame::Request(request));
    }

    #[test]
    fn test_encode_request_matches_frame_encoding() {
        let request = RequestFrame::new("9", "cron.run").with_params(json!({"jobId": "j1"}));
        let direct: Value = serde_json::from_str(&Encoder::encode_request(&request).unwrap()).unwrap();
        let via_frame: Value =
            serde_json::from_str(&Encoder::encode(&Frame::Request(request)).unwrap()).unwrap();
        assert_eq!(direct, via_frame);
    }

    #[test]
    fn test_decode_response() {
        let text = r#"{"type":"res","id":"1","ok":true,"payload":{"protocol":3}}"#;
        match Decoder::decode(text).unwrap() {
            Frame::Response(res) => {
                assert_eq!(res.id, "1");
                assert!(res.ok);
                assert_eq!(res.payload, Some(json!({"protocol": 3})));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_event_with_and_without_seq() {
        let text = r#"{"type":"event","event":"agent.started","payload":{"id":"a"},"seq":7}"#;
        let frame = Decoder::decode(text).unwrap();
        assert_eq!(
            frame,
            Frame::Event(EventFrame::new("agent.started", json!({"id": "a"})).with_seq(7))
        );

        let text = r#"{"type":"event","event":"heartbeat"}"#;
        match Decoder::decode(text).unwrap() {
            Frame::Event(ev) => {
                assert_eq!(ev.payload, Value::Null);
                assert_eq!(ev.seq, None);
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            Decoder::decode("not json at all"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            Decoder::decode("[1,2,3]"),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(matches!(
            Decoder::decode(r#"{"id":"1","ok":true}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            Decoder::decode(r#"{"type":5,"id":"1"}"#),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        match Decoder::decode(r#"{"type":"ping"}"#) {
            Err(ProtocolError::UnknownType(kind)) => assert_eq!(kind, "ping"),
            other => panic!("expected unknown type, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_incomplete_frame() {
        match Decoder::decode(r#"{"type":"res","ok":true}"#) {
            Err(ProtocolError::Malformed { kind, .. }) => assert_eq!(kind, "res"),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let text = r#"{"type":"res","id":"4","ok":true,"payload":1,"traceId":"abc"}"#;
        let frame = Decoder::decode(text).unwrap();
        assert_eq!(frame, Frame::Response(ResponseFrame::ok("4", json!(1))));
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(id in "[0-9]{1,12}", method in "[a-z]{1,8}(\\.[a-z]{1,8}){0,3}", n in any::<i64>()) {
            let request = RequestFrame::new(id, method).with_params(json!({"limit": n}));
            let text = Encoder::encode_request(&request).unwrap();
            prop_assert_eq!(Decoder::decode(&text).unwrap(), Frame::Request(request));
        }
    }
}
