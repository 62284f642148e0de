//! Transport abstractions for the ragwire protocol server.
//!
//! Transports carry UTF-8 JSON text frames over a full-duplex ordered
//! stream; each frame is exactly one JSON object. The protocol envelope
//! is parsed by the connection layer, never here.
//!
//! # Available Transports
//!
//! | Transport | Use case |
//! |-----------|----------|
//! | [`memory::MemoryTransport`] | Testing and in-process communication |
//! | [`websocket::WebSocketTransport`] | Accepted WebSocket connections |
//!
//! # Example
//!
//! ```no_run
//! use ragwire_transport::{TransportListener, WebSocketConfig, WebSocketListener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ragwire_transport::TransportError> {
//!     let listener =
//!         WebSocketListener::bind("127.0.0.1:8080", WebSocketConfig::default()).await?;
//!     loop {
//!         let transport = listener.accept().await?;
//!         tokio::spawn(async move {
//!             // hand the transport to the protocol server
//!             let _ = transport;
//!         });
//!     }
//! }
//! ```

pub mod error;
pub mod memory;
pub mod traits;
pub mod websocket;

pub use error::TransportError;
pub use memory::MemoryTransport;
pub use traits::{FrameTransport, TransportListener, TransportMetadata, close_code};
pub use websocket::{WebSocketConfig, WebSocketListener, WebSocketTransport};
