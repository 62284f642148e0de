//! Unified protocol error type with stable wire codes.
//!
//! Every error that can cross the wire carries one of the stable string
//! codes in [`code`]. Errors are classified as fatal (the connection must
//! close: protocol violations, failed negotiation) or non-fatal (replied
//! as an `error` or `tool_error` message, connection stays usable).

use miette::Diagnostic;
use thiserror::Error;

use crate::version::ProtocolVersion;

/// Stable wire error codes.
///
/// These strings are part of the protocol contract and must never change.
pub mod code {
    /// Wrong message type or missing handshake. Fatal.
    pub const PROTOCOL_VIOLATION: &str = "PROTOCOL_VIOLATION";
    /// No server version is selectable for the client. Fatal.
    pub const PROTOCOL_NEGOTIATION_FAILED: &str = "PROTOCOL_NEGOTIATION_FAILED";
    /// Unrecognized `type` discriminator in the Ready state.
    pub const UNKNOWN_MESSAGE_TYPE: &str = "UNKNOWN_MESSAGE_TYPE";
    /// Tool name not in the negotiated adapter's tool set.
    pub const UNSUPPORTED_TOOL: &str = "UNSUPPORTED_TOOL";
    /// Missing or out-of-range tool parameter.
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    /// The tool itself failed while executing.
    pub const TOOL_EXECUTION_ERROR: &str = "TOOL_EXECUTION_ERROR";
    /// A message handler failed outside tool dispatch.
    pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
    /// Unexpected internal fault.
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
}

/// The primary error type for protocol operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    /// The client broke the message ordering rules (e.g. a `tool_call`
    /// before the handshake completed).
    #[error("protocol violation: {message}")]
    #[diagnostic(code(ragwire::protocol::violation))]
    Violation {
        /// What the client did wrong.
        message: String,
    },

    /// No compatible protocol version could be negotiated.
    #[error(
        "no compatible protocol version found; client supports {client_versions:?}, server supports {supported_versions:?}"
    )]
    #[diagnostic(
        code(ragwire::protocol::negotiation_failed),
        help("register an adapter for one of the client's versions or add a compatibility edge")
    )]
    NegotiationFailed {
        /// Versions the client declared.
        client_versions: Vec<String>,
        /// Versions the server has adapters for.
        supported_versions: Vec<String>,
    },

    /// An adapter was registered twice under the same version.
    #[error("protocol version {0} is already registered")]
    #[diagnostic(code(ragwire::registry::duplicate_version))]
    DuplicateVersion(ProtocolVersion),

    /// The `type` discriminator was not recognized.
    #[error("unknown message type: {0}")]
    #[diagnostic(code(ragwire::protocol::unknown_message_type))]
    UnknownMessageType(String),

    /// The tool name is not served by the negotiated adapter.
    #[error("unsupported tool: {0}")]
    #[diagnostic(code(ragwire::dispatch::unsupported_tool))]
    UnsupportedTool(String),

    /// A tool parameter was missing or invalid.
    #[error("invalid argument: {message}")]
    #[diagnostic(code(ragwire::dispatch::invalid_argument))]
    InvalidArgument {
        /// Which parameter, and why.
        message: String,
    },

    /// The tool ran but failed.
    #[error("tool '{tool}' failed: {message}")]
    #[diagnostic(code(ragwire::dispatch::tool_execution))]
    ToolExecution {
        /// The tool that failed.
        tool: String,
        /// What went wrong.
        message: String,
    },

    /// A non-dispatch message handler failed.
    #[error("handler error: {message}")]
    #[diagnostic(code(ragwire::server::handler))]
    Handler {
        /// What went wrong.
        message: String,
    },

    /// Unexpected internal fault.
    #[error("internal server error: {message}")]
    #[diagnostic(code(ragwire::server::internal))]
    Server {
        /// What went wrong.
        message: String,
    },
}

impl ProtocolError {
    /// Create a protocol violation error.
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error for a missing required parameter.
    pub fn missing_parameter(name: &str) -> Self {
        Self::InvalidArgument {
            message: format!("missing required parameter: {name}"),
        }
    }

    /// Create a tool execution error.
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create an internal server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// The stable wire code for this error.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Violation { .. } => code::PROTOCOL_VIOLATION,
            Self::NegotiationFailed { .. } => code::PROTOCOL_NEGOTIATION_FAILED,
            Self::UnknownMessageType(_) => code::UNKNOWN_MESSAGE_TYPE,
            Self::UnsupportedTool(_) => code::UNSUPPORTED_TOOL,
            Self::InvalidArgument { .. } => code::INVALID_ARGUMENT,
            Self::ToolExecution { .. } => code::TOOL_EXECUTION_ERROR,
            Self::Handler { .. } => code::HANDLER_ERROR,
            Self::DuplicateVersion(_) | Self::Server { .. } => code::SERVER_ERROR,
        }
    }

    /// Short variant tag, used by the monitor's error-type histogram.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Violation { .. } => "Violation",
            Self::NegotiationFailed { .. } => "NegotiationFailed",
            Self::DuplicateVersion(_) => "DuplicateVersion",
            Self::UnknownMessageType(_) => "UnknownMessageType",
            Self::UnsupportedTool(_) => "UnsupportedTool",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::ToolExecution { .. } => "ToolExecution",
            Self::Handler { .. } => "Handler",
            Self::Server { .. } => "Server",
        }
    }

    /// Whether this error terminates the connection.
    ///
    /// Non-fatal errors are replied as `error` or `tool_error` messages
    /// and the connection stays in the Ready state.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Violation { .. } | Self::NegotiationFailed { .. })
    }

    /// The versions list carried by negotiation failures, if any.
    #[must_use]
    pub fn supported_versions(&self) -> Option<&[String]> {
        match self {
            Self::NegotiationFailed {
                supported_versions, ..
            } => Some(supported_versions),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(
            ProtocolError::violation("x").wire_code(),
            "PROTOCOL_VIOLATION"
        );
        assert_eq!(
            ProtocolError::UnknownMessageType("zap".into()).wire_code(),
            "UNKNOWN_MESSAGE_TYPE"
        );
        assert_eq!(
            ProtocolError::UnsupportedTool("x".into()).wire_code(),
            "UNSUPPORTED_TOOL"
        );
        assert_eq!(
            ProtocolError::missing_parameter("query").wire_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            ProtocolError::tool_execution("rag_search", "boom").wire_code(),
            "TOOL_EXECUTION_ERROR"
        );
        assert_eq!(ProtocolError::server("boom").wire_code(), "SERVER_ERROR");
    }

    #[test]
    fn fatality_classification() {
        assert!(ProtocolError::violation("x").is_fatal());
        assert!(
            ProtocolError::NegotiationFailed {
                client_versions: vec!["2.0".into()],
                supported_versions: vec!["1.0".into()],
            }
            .is_fatal()
        );
        assert!(!ProtocolError::UnsupportedTool("x".into()).is_fatal());
        assert!(!ProtocolError::invalid_argument("x").is_fatal());
        assert!(!ProtocolError::handler("x").is_fatal());
    }

    #[test]
    fn negotiation_failure_carries_versions() {
        let err = ProtocolError::NegotiationFailed {
            client_versions: vec!["2.0".into()],
            supported_versions: vec!["1.0".into(), "1.1".into()],
        };
        assert_eq!(
            err.supported_versions(),
            Some(&["1.0".to_string(), "1.1".to_string()][..])
        );
        assert_eq!(ProtocolError::violation("x").supported_versions(), None);
    }
}
