//! The wire message envelope.
//!
//! Every frame is one JSON object with a `type` discriminator and an
//! optional `id` that replies echo back. The two directions are distinct
//! sums: [`ClientMessage`] for what the server receives, [`ServerMessage`]
//! for what it sends. Unknown discriminators are surfaced as
//! [`ProtocolError::UnknownMessageType`] before any dispatch happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{ClientCapabilities, ServerInfo};
use crate::error::ProtocolError;
use crate::version::ProtocolVersion;

/// Features advertised in the server `hello` and `capabilities` replies.
pub const SERVER_FEATURES: [&str; 3] = ["async_tools", "error_handling", "progress_tracking"];

/// Default per-frame size limit advertised at handshake (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// A client-supplied message id, echoed verbatim in replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the handshake; must be the first message on a connection.
    Hello {
        /// The client's capability document.
        #[serde(default)]
        capabilities: ClientCapabilities,
        /// Free-form client identity (name, version, platform).
        #[serde(default)]
        client_info: Value,
    },
    /// Acknowledges the server `hello`, ending the handshake.
    Ready,
    /// Liveness probe.
    Ping {
        /// Echoed in the `pong`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },
    /// Invoke a tool on the negotiated adapter.
    ToolCall {
        /// Tool name; must be in the adapter's tool set.
        tool: String,
        /// Tool parameters, validated by the adapter.
        #[serde(default)]
        parameters: Map<String, Value>,
        /// Correlates the `tool_response` / `tool_error` reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },
    /// Ask for the negotiated version's tool list, features and limits.
    GetCapabilities {
        /// Echoed in the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },
    /// Ask for details about the negotiated protocol version.
    GetProtocolInfo {
        /// Echoed in the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },
}

impl ClientMessage {
    /// Parse a message from a raw JSON frame.
    ///
    /// A frame that is not a JSON object with a string `type` field is a
    /// handler error; a recognized-shape frame with an unknown `type` is
    /// an [`ProtocolError::UnknownMessageType`].
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::handler(format!("invalid JSON message: {e}")))?;
        Self::from_value(value)
    }

    /// Parse a message from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::handler("message has no 'type' field"));
        };
        let kind = kind.to_string();
        serde_json::from_value(value).map_err(|e| {
            if Self::is_known_type(&kind) {
                ProtocolError::handler(format!("malformed '{kind}' message: {e}"))
            } else {
                ProtocolError::UnknownMessageType(kind)
            }
        })
    }

    fn is_known_type(kind: &str) -> bool {
        matches!(
            kind,
            "hello" | "ready" | "ping" | "tool_call" | "get_capabilities" | "get_protocol_info"
        )
    }

    /// The wire discriminator for this message.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Ready => "ready",
            Self::Ping { .. } => "ping",
            Self::ToolCall { .. } => "tool_call",
            Self::GetCapabilities { .. } => "get_capabilities",
            Self::GetProtocolInfo { .. } => "get_protocol_info",
        }
    }

    /// The client-supplied id, if any.
    #[must_use]
    pub fn id(&self) -> Option<&MessageId> {
        match self {
            Self::Hello { .. } | Self::Ready => None,
            Self::Ping { id }
            | Self::ToolCall { id, .. }
            | Self::GetCapabilities { id }
            | Self::GetProtocolInfo { id } => id.as_ref(),
        }
    }
}

/// Extract the `id` field from a raw frame, for echoing on parse errors.
#[must_use]
pub fn extract_id(value: &Value) -> Option<MessageId> {
    value
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

/// Capability block of the server `hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloCapabilities {
    /// Tools served by the negotiated adapter.
    pub tools: Vec<String>,
    /// Feature advertisement.
    pub features: Vec<String>,
    /// Largest frame the server accepts, in bytes.
    pub max_message_size: usize,
}

/// Quota block of the `capabilities` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Largest frame the server accepts, in bytes.
    pub max_message_size: usize,
    /// Advisory per-minute tool-call budget.
    pub max_tool_calls_per_minute: u32,
    /// Advisory in-flight tool-call budget per connection.
    pub max_concurrent_calls: u32,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_tool_calls_per_minute: 100,
            max_concurrent_calls: 10,
        }
    }
}

/// Body of the `capabilities` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesBody {
    /// The negotiated protocol version.
    pub protocol_version: ProtocolVersion,
    /// Tools served by the negotiated adapter.
    pub tools: Vec<String>,
    /// Feature advertisement.
    pub features: Vec<String>,
    /// Quota limits.
    pub limits: QuotaLimits,
}

/// Feature summary inside a `protocol_info` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfoFeatures {
    /// Number of tools the version serves.
    pub tool_count: usize,
    /// Whether any older client version is declared compatible.
    pub backward_compatible: bool,
}

/// Body of the `protocol_info` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// The version described.
    pub version: ProtocolVersion,
    /// Tools served by this version's adapter.
    pub supported_tools: Vec<String>,
    /// Client versions this version is declared compatible with.
    pub compatible_with: Vec<String>,
    /// Feature summary.
    pub features: ProtocolInfoFeatures,
}

/// Error payload carried by `error` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// One of the stable codes in [`crate::error::code`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
    /// Server versions, present on negotiation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<String>>,
}

impl ErrorBody {
    /// Build an error body from a protocol error.
    #[must_use]
    pub fn from_error(err: &ProtocolError) -> Self {
        Self {
            code: err.wire_code().to_string(),
            message: err.to_string(),
            timestamp: Utc::now(),
            supported_versions: err.supported_versions().map(<[String]>::to_vec),
        }
    }
}

/// Error payload carried by `tool_error` replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorBody {
    /// One of the stable codes in [`crate::error::code`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// How long the failed dispatch ran.
    pub execution_time_ms: f64,
    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake reply carrying the negotiated version.
    Hello {
        /// The chosen protocol version.
        protocol_version: ProtocolVersion,
        /// Server identity.
        server_info: ServerInfo,
        /// Tool list, features and frame limit.
        capabilities: HelloCapabilities,
    },
    /// Reply to `ping`.
    Pong {
        /// Echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
    },
    /// Successful tool dispatch.
    ToolResponse {
        /// Echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
        /// The tool that ran.
        tool: String,
        /// Tool result map.
        result: Map<String, Value>,
        /// Measured dispatch time.
        execution_time_ms: f64,
        /// When the dispatch finished.
        timestamp: DateTime<Utc>,
    },
    /// Failed tool dispatch.
    ToolError {
        /// Echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
        /// The tool that failed.
        tool: String,
        /// Error details, including the measured dispatch time.
        error: ToolErrorBody,
    },
    /// Reply to `get_capabilities`.
    Capabilities {
        /// Echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
        /// Capability details.
        capabilities: CapabilitiesBody,
    },
    /// Reply to `get_protocol_info`.
    ProtocolInfo {
        /// Echoed request id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
        /// Version details.
        info: ProtocolInfo,
    },
    /// Non-fatal or final error report.
    Error {
        /// Echoed request id, when the failing request carried one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<MessageId>,
        /// Error details.
        error: ErrorBody,
    },
}

impl ServerMessage {
    /// Build an `error` message from a protocol error.
    #[must_use]
    pub fn error(id: Option<MessageId>, err: &ProtocolError) -> Self {
        Self::Error {
            id,
            error: ErrorBody::from_error(err),
        }
    }

    /// Build a `tool_error` reply.
    #[must_use]
    pub fn tool_error(
        id: Option<MessageId>,
        tool: impl Into<String>,
        err: &ProtocolError,
        execution_time_ms: f64,
    ) -> Self {
        Self::ToolError {
            id,
            tool: tool.into(),
            error: ToolErrorBody {
                code: err.wire_code().to_string(),
                message: err.to_string(),
                execution_time_ms,
                timestamp: Utc::now(),
            },
        }
    }

    /// The wire discriminator for this message.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Pong { .. } => "pong",
            Self::ToolResponse { .. } => "tool_response",
            Self::ToolError { .. } => "tool_error",
            Self::Capabilities { .. } => "capabilities",
            Self::ProtocolInfo { .. } => "protocol_info",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a single JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::server(format!("failed to encode reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_hello() {
        let msg = ClientMessage::from_json(
            r#"{"type":"hello","capabilities":{"protocolVersion":"1.0"},"client_info":{"name":"cli"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Hello {
                capabilities,
                client_info,
            } => {
                assert_eq!(
                    capabilities.declared_versions(),
                    vec![ProtocolVersion::new("1.0")]
                );
                assert_eq!(client_info["name"], "cli");
            }
            other => panic!("expected hello, got {other:?}"),
        }
    }

    #[test]
    fn parses_tool_call_with_numeric_id() {
        let msg = ClientMessage::from_json(
            r#"{"type":"tool_call","tool":"rag_search","parameters":{"query":"q"},"id":7}"#,
        )
        .unwrap();
        assert_eq!(msg.message_type(), "tool_call");
        assert_eq!(msg.id(), Some(&MessageId::Number(7)));
    }

    #[test]
    fn unknown_type_is_rejected_without_dispatch() {
        let err = ClientMessage::from_json(r#"{"type":"subscribe","id":"a"}"#).unwrap_err();
        match err {
            ProtocolError::UnknownMessageType(kind) => assert_eq!(kind, "subscribe"),
            other => panic!("expected unknown message type, got {other:?}"),
        }
    }

    #[test]
    fn missing_type_is_a_handler_error() {
        let err = ClientMessage::from_json(r#"{"id":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Handler { .. }));
    }

    #[test]
    fn malformed_known_type_is_a_handler_error() {
        // tool_call without the required `tool` field
        let err = ClientMessage::from_json(r#"{"type":"tool_call","id":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Handler { .. }));
    }

    #[test]
    fn id_extraction_from_raw_frames() {
        let value = json!({"type": "nope", "id": "req-1"});
        assert_eq!(extract_id(&value), Some(MessageId::String("req-1".into())));
        assert_eq!(extract_id(&json!({"type": "nope"})), None);
    }

    #[test]
    fn error_reply_round_trips() {
        let err = ProtocolError::NegotiationFailed {
            client_versions: vec!["2.0".into()],
            supported_versions: vec!["1.0".into(), "1.1".into()],
        };
        let reply = ServerMessage::error(None, &err);
        let text = reply.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["code"], "PROTOCOL_NEGOTIATION_FAILED");
        assert_eq!(value["error"]["supported_versions"], json!(["1.0", "1.1"]));

        let parsed: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, reply);
    }

    #[test]
    fn tool_response_round_trips() {
        let mut result = Map::new();
        result.insert("total_results".into(), json!(3));
        let reply = ServerMessage::ToolResponse {
            id: Some(MessageId::Number(42)),
            tool: "rag_search".into(),
            result,
            execution_time_ms: 12.5,
            timestamp: Utc::now(),
        };
        let text = reply.to_json().unwrap();
        let parsed: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, reply);
    }

    #[test]
    fn pong_echoes_id() {
        let reply = ServerMessage::Pong {
            id: Some(MessageId::String("p1".into())),
        };
        let value: Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], "p1");
    }
}
