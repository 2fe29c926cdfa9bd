//! OpenClaw Gateway frame types.
//!
//! Outgoing frames are serialized as-is. Incoming frames are deserialized
//! leniently: every field a gateway build may omit is optional or defaulted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lowest protocol version this client speaks.
pub const MIN_PROTOCOL: u32 = 1;

/// Highest protocol version this client speaks.
pub const MAX_PROTOCOL: u32 = 3;

/// Role requested in every handshake.
pub const OPERATOR_ROLE: &str = "operator";

/// Agent addressed by legacy `session.send` frames.
pub const LEGACY_AGENT_ID: &str = "main";

/// Event names that carry chat text in `payload.message`.
pub const CHAT_EVENTS: [&str; 3] = ["chat", "chat.delta", "chat.final"];

/// Legacy `kind` values that carry chat text in `data.message`.
pub const LEGACY_MESSAGE_KINDS: [&str; 2] = ["session.message", "agent.turn"];

/// Request frame sent to Gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    pub fn new(id: String, method: String, params: Option<Value>) -> Self {
        Self {
            frame_type: "req".to_string(),
            id,
            method,
            params,
        }
    }
}

/// Connect params for handshake
#[derive(Debug, Clone, Serialize)]
pub struct ConnectParams {
    #[serde(rename = "minProtocol")]
    pub min_protocol: u32,
    #[serde(rename = "maxProtocol")]
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
}

/// Client descriptor sent once per handshake
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    #[serde(rename = "deviceFamily")]
    pub device_family: String,
    #[serde(rename = "modelIdentifier")]
    pub model_identifier: String,
    pub mode: String,
    #[serde(rename = "instanceId", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Auth params for connect
#[derive(Clone, Serialize)]
pub struct AuthParams {
    pub token: String,
}

impl std::fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthParams")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// chat.send params
#[derive(Debug, Clone, Serialize)]
pub struct ChatSendParams {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub message: String,
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
}

/// Send frame understood by older gateway builds (no `type`/`method` envelope)
#[derive(Debug, Clone, Serialize)]
pub struct LegacySendFrame {
    pub id: String,
    pub kind: String,
    pub data: LegacySendData,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacySendData {
    pub message: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
}

/// Decoded inbound frame, one variant per recognized shape.
#[derive(Debug, Clone)]
pub enum GatewayFrame {
    /// Top-level `{"type":"hello-ok"}`
    HelloOk(HelloOk),
    /// `{"type":"res"}`
    Response(ResponseFrame),
    /// `{"type":"event"}`
    Event(EventFrame),
    /// `{"kind":"session.message"}` / `{"kind":"agent.turn"}`
    Legacy(LegacyFrame),
    /// Well-formed JSON object this client has no use for
    Unknown,
}

/// Response frame received from Gateway
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorShape>,
}

/// Error shape in response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorShape {
    /// String or numeric depending on the gateway build.
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Event frame received from Gateway
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub seq: Option<Value>,
}

/// Strings stay as they are, numbers become their decimal text, anything
/// else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Bare `kind`/`data` frame from older gateway builds
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyFrame {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Handshake acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloOk {
    #[serde(default)]
    pub protocol: Option<u32>,
    #[serde(default)]
    pub server: Option<ServerInfo>,
    #[serde(default)]
    pub policy: PolicyInfo,
}

/// Server info from HelloOk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "connId", default)]
    pub conn_id: Option<String>,
}

/// Policy info from HelloOk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyInfo {
    #[serde(rename = "tickIntervalMs", default)]
    pub tick_interval_ms: Option<u64>,
}
