//! The version-specific tool adapter contract.
//!
//! An adapter is a plug-in that serves one protocol version: it declares
//! the version, a finite tool set, optionally a JSON schema per tool, and
//! an asynchronous dispatch. The registry and server depend only on this
//! trait, never on concrete adapter types.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::version::ProtocolVersion;

/// A versioned tool adapter.
///
/// Implementations must be cheap to share (`Arc<dyn ToolAdapter>`); the
/// tool set is fixed for the adapter's lifetime.
///
/// Dispatch error contract:
/// - a missing or invalid required parameter is
///   [`ProtocolError::InvalidArgument`],
/// - a tool name outside [`tools()`](ToolAdapter::tools) is
///   [`ProtocolError::UnsupportedTool`],
/// - any internal fault is [`ProtocolError::ToolExecution`].
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The protocol version this adapter serves.
    fn version(&self) -> ProtocolVersion;

    /// The finite set of tool names this adapter serves.
    fn tools(&self) -> Vec<String>;

    /// JSON schema describing a tool's parameters.
    ///
    /// When present, the schema is the authoritative parameter contract;
    /// when absent, `dispatch` validates inline.
    fn tool_schema(&self, _tool: &str) -> Option<Value> {
        None
    }

    /// Whether a tool name is in this adapter's tool set.
    fn supports_tool(&self, tool: &str) -> bool {
        self.tools().iter().any(|t| t == tool)
    }

    /// Execute a tool call and return its result map.
    async fn dispatch(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    #[async_trait]
    impl ToolAdapter for EchoAdapter {
        fn version(&self) -> ProtocolVersion {
            ProtocolVersion::new("1.0")
        }

        fn tools(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn dispatch(
            &self,
            tool: &str,
            parameters: Map<String, Value>,
        ) -> Result<Map<String, Value>, ProtocolError> {
            if tool != "echo" {
                return Err(ProtocolError::UnsupportedTool(tool.to_string()));
            }
            Ok(parameters)
        }
    }

    #[tokio::test]
    async fn object_safe_dispatch() {
        let adapter: std::sync::Arc<dyn ToolAdapter> = std::sync::Arc::new(EchoAdapter);
        assert!(adapter.supports_tool("echo"));
        assert!(!adapter.supports_tool("other"));

        let mut params = Map::new();
        params.insert("k".into(), serde_json::json!("v"));
        let result = adapter.dispatch("echo", params.clone()).await.unwrap();
        assert_eq!(result, params);

        let err = adapter.dispatch("other", Map::new()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedTool(_)));
    }
}
