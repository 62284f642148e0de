//! Core protocol types for the ragwire tool-invocation protocol.
//!
//! ragwire is a bidirectional, versioned tool-invocation protocol: a
//! client opens a duplex message channel, negotiates a protocol version,
//! and issues tool calls that the server dispatches to version-specific
//! adapters. This crate holds the protocol vocabulary shared by every
//! other crate in the workspace:
//!
//! - [`version`]: ordered protocol version strings
//! - [`message`]: the typed wire envelope (both directions)
//! - [`capability`]: client capability documents and peer info
//! - [`adapter`]: the [`adapter::ToolAdapter`] plug-in contract
//! - [`error`]: the unified [`error::ProtocolError`] with stable wire codes
//!
//! # Example
//!
//! ```rust
//! use ragwire_core::message::ClientMessage;
//! use ragwire_core::version::ProtocolVersion;
//!
//! let msg = ClientMessage::from_json(
//!     r#"{"type":"hello","capabilities":{"protocolVersion":"1.0"}}"#,
//! ).unwrap();
//! assert_eq!(msg.message_type(), "hello");
//! assert!(ProtocolVersion::new("1.0") < ProtocolVersion::new("1.1"));
//! ```

pub mod adapter;
pub mod capability;
pub mod error;
pub mod message;
pub mod version;

pub use adapter::ToolAdapter;
pub use capability::{ClientCapabilities, ServerInfo};
pub use error::ProtocolError;
pub use message::{ClientMessage, MessageId, ServerMessage};
pub use version::ProtocolVersion;
