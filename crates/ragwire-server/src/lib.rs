//! The ragwire protocol server runtime.
//!
//! Puts the protocol pieces together: the [`registry::VersionRegistry`]
//! maps versions to adapters and holds the compatibility relation, the
//! [`negotiator::Negotiator`] picks a version per client, each accepted
//! transport becomes a [`connection::Connection`] driven by the
//! [`server::ProtocolServer`], and the [`monitor::Monitor`] aggregates
//! metrics and health across all of them.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ragwire_server::{Monitor, ProtocolServer, ServerConfig, VersionRegistry};
//! use ragwire_transport::MemoryTransport;
//! # use ragwire_core::{adapter::ToolAdapter, error::ProtocolError, version::ProtocolVersion};
//! # struct NoopAdapter;
//! # #[async_trait::async_trait]
//! # impl ToolAdapter for NoopAdapter {
//! #     fn version(&self) -> ProtocolVersion { ProtocolVersion::new("1.0") }
//! #     fn tools(&self) -> Vec<String> { vec![] }
//! #     async fn dispatch(
//! #         &self,
//! #         _tool: &str,
//! #         parameters: serde_json::Map<String, serde_json::Value>,
//! #     ) -> Result<serde_json::Map<String, serde_json::Value>, ProtocolError> { Ok(parameters) }
//! # }
//!
//! # tokio_test::block_on(async {
//! let mut registry = VersionRegistry::new();
//! registry.register(Arc::new(NoopAdapter)).unwrap();
//!
//! let server: ProtocolServer<MemoryTransport> = ProtocolServer::new(
//!     Arc::new(registry),
//!     Arc::new(Monitor::new()),
//!     ServerConfig::default(),
//! );
//! assert_eq!(server.active_connections().await, 0);
//! # });
//! ```

pub mod connection;
pub mod monitor;
pub mod negotiator;
pub mod registry;
pub mod server;

pub use connection::{Connection, ConnectionError};
pub use monitor::{HealthStatus, Monitor, MonitorSummary};
pub use negotiator::Negotiator;
pub use registry::VersionRegistry;
pub use server::{ProtocolServer, ServerConfig, ServerStats};
