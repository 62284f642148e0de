//! Transport traits for the ragwire protocol.
//!
//! A transport is a full-duplex ordered stream of UTF-8 JSON text frames;
//! each frame is exactly one JSON object. The protocol envelope is parsed
//! one layer up, by the connection; transports never inspect frame
//! contents.

use std::future::Future;
use std::time::Instant;

/// Standard close codes used by the server.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The server hit an unexpected internal fault.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// The server is at its connection cap.
    pub const OVERLOADED: u16 = 1013;
}

/// Metadata about a transport connection.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    /// Transport type identifier (e.g., "websocket", "memory").
    pub transport_type: String,
    /// Remote address, if applicable.
    pub remote_addr: Option<String>,
    /// Local address, if applicable.
    pub local_addr: Option<String>,
    /// When the connection was established.
    pub connected_at: Option<Instant>,
}

impl TransportMetadata {
    /// Create new metadata for a transport type.
    #[must_use]
    pub fn new(transport_type: impl Into<String>) -> Self {
        Self {
            transport_type: transport_type.into(),
            remote_addr: None,
            local_addr: None,
            connected_at: None,
        }
    }

    /// Set the remote address.
    #[must_use]
    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the local address.
    #[must_use]
    pub fn local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    /// Mark the connection time.
    #[must_use]
    pub fn connected_now(mut self) -> Self {
        self.connected_at = Some(Instant::now());
        self
    }
}

/// Core transport trait: bidirectional text-frame passing.
///
/// Implementations must be `Send + Sync` and handle concurrent access
/// safely: the send and receive sides are independent and are called from
/// different tasks.
pub trait FrameTransport: Send + Sync {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one JSON text frame.
    fn send_text(&self, frame: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive one JSON text frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv_text(&self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

    /// Close the connection with a close code and reason.
    fn close(&self, code: u16, reason: &str)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Whether the transport is still connected.
    fn is_connected(&self) -> bool;

    /// Metadata about the connection.
    fn metadata(&self) -> TransportMetadata;
}

/// Listener trait for server-side transports.
///
/// Listeners accept incoming connections and produce one transport per
/// connection.
pub trait TransportListener: Send + Sync {
    /// The type of transport produced by this listener.
    type Transport: FrameTransport;

    /// The error type for listener operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Accept an incoming connection.
    fn accept(&self) -> impl Future<Output = Result<Self::Transport, Self::Error>> + Send;

    /// The local address the listener is bound to, if available.
    fn local_addr(&self) -> Option<String>;
}
