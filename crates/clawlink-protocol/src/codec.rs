//! Frame codec.
//!
//! Encodes outgoing requests and sniffs incoming payloads into a
//! [`GatewayFrame`], then normalizes either dialect into an [`Inbound`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::frames::{
    AuthParams, ChatSendParams, ClientInfo, ConnectParams, GatewayFrame, HelloOk,
    LegacySendData, LegacySendFrame, RequestFrame, CHAT_EVENTS, LEGACY_AGENT_ID,
    LEGACY_MESSAGE_KINDS, OPERATOR_ROLE,
};

/// Message used when a failed response carries no `error.message`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("malformed {kind} frame: {source}")]
    Shape {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// What an inbound frame means to the connection, independent of dialect.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// The gateway accepted the handshake.
    HandshakeAck(HelloOk),
    /// Chat text for the caller.
    Message(String),
    /// A request failed. `request_id` is the correlation id when the gateway sent one.
    Failure {
        request_id: Option<String>,
        message: String,
    },
    /// Nothing for the caller (ticks, ok responses, events without text).
    Ignored,
}

impl ConnectParams {
    /// Operator handshake params. `auth` is attached only for a non-empty token.
    pub fn operator(
        client: ClientInfo,
        min_protocol: u32,
        max_protocol: u32,
        token: Option<&str>,
    ) -> Self {
        let auth = token
            .filter(|t| !t.is_empty())
            .map(|t| AuthParams {
                token: t.to_string(),
            });

        Self {
            min_protocol,
            max_protocol,
            client,
            role: OPERATOR_ROLE.to_string(),
            auth,
        }
    }
}

/// Encode the `connect` handshake request.
pub fn encode_connect(id: &str, params: &ConnectParams) -> Result<String, CodecError> {
    encode_request(id, "connect", serde_json::to_value(params)?)
}

/// Encode a `chat.send` request.
pub fn encode_chat_send(id: &str, params: &ChatSendParams) -> Result<String, CodecError> {
    encode_request(id, "chat.send", serde_json::to_value(params)?)
}

/// Encode a legacy `session.send` frame.
pub fn encode_legacy_send(
    id: &str,
    message: &str,
    session_key: &str,
) -> Result<String, CodecError> {
    let frame = LegacySendFrame {
        id: id.to_string(),
        kind: "session.send".to_string(),
        data: LegacySendData {
            message: message.to_string(),
            session_key: session_key.to_string(),
            agent_id: LEGACY_AGENT_ID.to_string(),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

fn encode_request(id: &str, method: &str, params: Value) -> Result<String, CodecError> {
    let frame = RequestFrame::new(id.to_string(), method.to_string(), Some(params));
    Ok(serde_json::to_string(&frame)?)
}

/// Decode a text payload and normalize it.
pub fn decode(text: &str) -> Result<Inbound, CodecError> {
    parse_frame(text).map(GatewayFrame::into_inbound)
}

/// Sniff the shape of a text payload.
///
/// `type` wins over `kind`; a payload whose `type` is not one of ours still
/// gets a chance as a legacy frame.
pub fn parse_frame(text: &str) -> Result<GatewayFrame, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject(json_kind(&value)));
    }

    let frame_type = value.get("type").and_then(Value::as_str).map(str::to_owned);
    match frame_type.as_deref() {
        Some("hello-ok") => {
            return Ok(GatewayFrame::HelloOk(
                serde_json::from_value(value).unwrap_or_default(),
            ));
        }
        Some("res") => return Ok(GatewayFrame::Response(shape("res", value)?)),
        Some("event") => return Ok(GatewayFrame::Event(shape("event", value)?)),
        _ => {}
    }

    let is_legacy = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| LEGACY_MESSAGE_KINDS.contains(&kind));
    if is_legacy {
        return Ok(GatewayFrame::Legacy(shape("legacy", value)?));
    }

    Ok(GatewayFrame::Unknown)
}

impl GatewayFrame {
    pub fn into_inbound(self) -> Inbound {
        match self {
            GatewayFrame::HelloOk(hello) => Inbound::HandshakeAck(hello),
            GatewayFrame::Response(res) if res.ok => match res.payload {
                Some(payload) if is_hello_ok(&payload) => {
                    Inbound::HandshakeAck(serde_json::from_value(payload).unwrap_or_default())
                }
                _ => Inbound::Ignored,
            },
            GatewayFrame::Response(res) => Inbound::Failure {
                request_id: res.id,
                message: res
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            },
            GatewayFrame::Event(evt) if CHAT_EVENTS.contains(&evt.event.as_str()) => {
                message_text(&evt.payload).map_or(Inbound::Ignored, Inbound::Message)
            }
            GatewayFrame::Event(_) => Inbound::Ignored,
            GatewayFrame::Legacy(frame) => {
                message_text(&frame.data).map_or(Inbound::Ignored, Inbound::Message)
            }
            GatewayFrame::Unknown => Inbound::Ignored,
        }
    }
}

fn shape<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|source| CodecError::Shape { kind, source })
}

fn is_hello_ok(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some("hello-ok")
}

fn message_text(container: &Value) -> Option<String> {
    container.get("message")?.as_str().map(str::to_owned)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ClientInfo {
        ClientInfo {
            id: "cli".to_string(),
            version: "0.1.2".to_string(),
            platform: "linux".to_string(),
            device_family: "unix".to_string(),
            model_identifier: "x86_64".to_string(),
            mode: "cli".to_string(),
            instance_id: None,
        }
    }

    fn failure_message(text: &str) -> String {
        match decode(text).unwrap() {
            Inbound::Failure { message, .. } => message,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_connect_request_with_token() {
        let params = ConnectParams::operator(client(), 1, 3, Some("secret"));
        let text = encode_connect("42", &params).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "req");
        assert_eq!(value["id"], "42");
        assert_eq!(value["method"], "connect");
        assert_eq!(value["params"]["minProtocol"], 1);
        assert_eq!(value["params"]["maxProtocol"], 3);
        assert_eq!(value["params"]["role"], "operator");
        assert_eq!(value["params"]["auth"]["token"], "secret");
        assert_eq!(value["params"]["client"]["deviceFamily"], "unix");
        assert_eq!(value["params"]["client"]["modelIdentifier"], "x86_64");
        assert!(value["params"]["client"].get("instanceId").is_none());
    }

    #[test]
    fn test_connect_request_omits_auth_without_token() {
        for token in [None, Some("")] {
            let params = ConnectParams::operator(client(), 1, 3, token);
            let value: Value = serde_json::from_str(&encode_connect("1", &params).unwrap()).unwrap();
            assert!(value["params"].get("auth").is_none());
        }
    }

    #[test]
    fn test_auth_params_debug_is_redacted() {
        let params = ConnectParams::operator(client(), 1, 3, Some("hunter2"));
        assert!(!format!("{params:?}").contains("hunter2"));
    }

    #[test]
    fn test_chat_send_request() {
        let params = ChatSendParams {
            session_key: "main".to_string(),
            message: "hello".to_string(),
            idempotency_key: "linux-1700000000000-7".to_string(),
        };
        let value: Value = serde_json::from_str(&encode_chat_send("7", &params).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "req",
                "id": "7",
                "method": "chat.send",
                "params": {
                    "sessionKey": "main",
                    "message": "hello",
                    "idempotencyKey": "linux-1700000000000-7"
                }
            })
        );
    }

    #[test]
    fn test_legacy_send_has_no_envelope() {
        let value: Value =
            serde_json::from_str(&encode_legacy_send("9", "hi", "main").unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "9",
                "kind": "session.send",
                "data": { "message": "hi", "sessionKey": "main", "agentId": "main" }
            })
        );
    }

    #[test]
    fn test_decode_top_level_hello_ok() {
        assert!(matches!(
            decode(r#"{"type":"hello-ok"}"#).unwrap(),
            Inbound::HandshakeAck(_)
        ));
    }

    #[test]
    fn test_decode_hello_ok_in_response_payload() {
        let text = r#"{"type":"res","id":"1","ok":true,"payload":{"type":"hello-ok","protocol":3,"server":{"version":"2026.1.5","connId":"c-1"}}}"#;
        match decode(text).unwrap() {
            Inbound::HandshakeAck(hello) => {
                assert_eq!(hello.protocol, Some(3));
                assert_eq!(hello.server.unwrap().conn_id.as_deref(), Some("c-1"));
            }
            other => panic!("expected handshake ack, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_plain_ok_response_is_ignored() {
        let text = r#"{"type":"res","id":"5","ok":true,"payload":{"runId":"r1"}}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn test_decode_error_response() {
        let text = r#"{"type":"res","id":"5","ok":false,"error":{"code":"INVALID_REQUEST","message":"boom"}}"#;
        match decode(text).unwrap() {
            Inbound::Failure {
                request_id,
                message,
            } => {
                assert_eq!(request_id.as_deref(), Some("5"));
                assert_eq!(message, "boom");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_response_with_numeric_fields() {
        let text = r#"{"type":"res","id":5,"ok":false,"error":{"code":401,"message":"unauthorized","details":[1]}}"#;
        match decode(text).unwrap() {
            Inbound::Failure {
                request_id,
                message,
            } => {
                assert_eq!(request_id.as_deref(), Some("5"));
                assert_eq!(message, "unauthorized");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        assert_eq!(
            failure_message(r#"{"type":"res","id":null,"ok":false,"error":{"message":{"text":"x"}}}"#),
            UNKNOWN_ERROR
        );
    }

    #[test]
    fn test_decode_chat_event_with_odd_seq() {
        for seq in [json!("7"), json!(-1), json!(null), json!(3)] {
            let text = json!({"type": "event", "event": "chat.final", "seq": seq, "payload": {"message": "hi"}});
            match decode(&text.to_string()).unwrap() {
                Inbound::Message(m) => assert_eq!(m, "hi"),
                other => panic!("expected message for seq {seq}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_error_response_defaults_message() {
        assert_eq!(failure_message(r#"{"type":"res","id":"5","ok":false}"#), UNKNOWN_ERROR);
        assert_eq!(failure_message(r#"{"type":"res","id":"5"}"#), UNKNOWN_ERROR);
        assert_eq!(
            failure_message(r#"{"type":"res","ok":false,"error":{"code":"X"}}"#),
            UNKNOWN_ERROR
        );
    }

    #[test]
    fn test_decode_chat_events() {
        for event in CHAT_EVENTS {
            let text = json!({"type": "event", "event": event, "payload": {"message": "hi"}});
            match decode(&text.to_string()).unwrap() {
                Inbound::Message(m) => assert_eq!(m, "hi"),
                other => panic!("expected message for {event}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_chat_event_without_message_is_ignored() {
        let text = r#"{"type":"event","event":"chat.final","payload":{"state":"final"}}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));

        let text = r#"{"type":"event","event":"chat.final"}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn test_decode_other_events_are_ignored() {
        let text = r#"{"type":"event","event":"tick","payload":{"ts":1}}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));

        let text = r#"{"type":"event","event":"presence","payload":{"message":"not chat"}}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn test_decode_legacy_frames() {
        for kind in LEGACY_MESSAGE_KINDS {
            let text = json!({"kind": kind, "data": {"message": "legacy hi"}});
            match decode(&text.to_string()).unwrap() {
                Inbound::Message(m) => assert_eq!(m, "legacy hi"),
                other => panic!("expected message for {kind}, got {other:?}"),
            }
        }

        let text = r#"{"kind":"agent.turn","data":{}}"#;
        assert!(matches!(decode(text).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn test_decode_unknown_shapes_are_ignored() {
        assert!(matches!(decode(r#"{"kind":"session.other"}"#).unwrap(), Inbound::Ignored));
        assert!(matches!(decode(r#"{"type":"req","id":"1","method":"x"}"#).unwrap(), Inbound::Ignored));
        assert!(matches!(decode("{}").unwrap(), Inbound::Ignored));
    }

    #[test]
    fn test_decode_malformed_payloads() {
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode("[1,2]"), Err(CodecError::NotAnObject("array"))));
        assert!(matches!(decode("\"res\""), Err(CodecError::NotAnObject("string"))));
        assert!(matches!(
            decode(r#"{"type":"res","ok":"yes"}"#),
            Err(CodecError::Shape { kind: "res", .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"event","payload":{}}"#),
            Err(CodecError::Shape { kind: "event", .. })
        ));
    }
}
