//! Per-connection state and framed message I/O.
//!
//! A [`Connection`] wraps one transport exclusively: no other component
//! reads from or writes to the transport directly. It carries the
//! negotiated version (set exactly once), activity timestamps and the
//! monotone per-connection counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use ragwire_core::error::ProtocolError;
use ragwire_core::message::ServerMessage;
use ragwire_core::version::ProtocolVersion;
use ragwire_transport::FrameTransport;

/// Errors surfaced by connection I/O.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport failed; fatal for the connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level failure; fatal only when the error is.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Create a transport error from any underlying error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// One received frame, decoded but not yet typed.
#[derive(Debug)]
pub struct ReceivedFrame {
    /// The decoded JSON object.
    pub value: Value,
    /// Size of the raw text frame in bytes.
    pub size: usize,
}

/// An active client connection.
pub struct Connection<T: FrameTransport> {
    id: Uuid,
    transport: T,
    negotiated_version: OnceLock<ProtocolVersion>,
    connected_at: DateTime<Utc>,
    last_activity: StdMutex<DateTime<Utc>>,
    message_count: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    error_count: AtomicU64,
    tool_calls: StdMutex<HashMap<String, u64>>,
    client_info: StdMutex<Value>,
}

impl<T: FrameTransport> Connection<T> {
    /// Wrap an accepted transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transport,
            negotiated_version: OnceLock::new(),
            connected_at: now,
            last_activity: StdMutex::new(now),
            message_count: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            tool_calls: StdMutex::new(HashMap::new()),
            client_info: StdMutex::new(Value::Null),
        }
    }

    /// Unique connection id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The negotiated version; `None` until the handshake completes.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<&ProtocolVersion> {
        self.negotiated_version.get()
    }

    /// Set the negotiated version. Immutable once set.
    pub(crate) fn set_negotiated_version(&self, version: ProtocolVersion) {
        let _ = self.negotiated_version.set(version);
    }

    /// When the transport was accepted.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// The last time a frame was received.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames received on this connection.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Bytes written to the transport.
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Bytes read from the transport.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Errors surfaced on this connection.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Per-tool call counts.
    #[must_use]
    pub fn tool_calls(&self) -> HashMap<String, u64> {
        self.tool_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The client identity from its `hello`.
    #[must_use]
    pub fn client_info(&self) -> Value {
        self.client_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_client_info(&self, info: Value) {
        *self
            .client_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = info;
    }

    pub(crate) fn record_tool_call(&self, tool: &str) {
        let mut calls = self
            .tool_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *calls.entry(tool.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    /// Whether the underlying transport is still connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send a typed message; returns the frame size in bytes.
    pub async fn send(&self, message: &ServerMessage) -> Result<usize, ConnectionError> {
        let text = message.to_json()?;
        self.send_frame(text).await
    }

    /// Send a raw JSON object (used by broadcast).
    pub async fn send_value(&self, message: &Value) -> Result<usize, ConnectionError> {
        let text = serde_json::to_string(message)
            .map_err(|e| ProtocolError::server(format!("failed to encode broadcast: {e}")))?;
        self.send_frame(text).await
    }

    async fn send_frame(&self, text: String) -> Result<usize, ConnectionError> {
        let size = text.len();
        self.transport
            .send_text(text)
            .await
            .map_err(ConnectionError::transport)?;
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
        tracing::trace!(connection_id = %self.id, size, "frame sent");
        Ok(size)
    }

    /// Receive one frame, decoded to a JSON object.
    ///
    /// Returns `Ok(None)` on clean close. An unparsable frame is a
    /// non-fatal [`ProtocolError::Handler`] error; the frame still counts
    /// toward the byte and message counters.
    pub async fn receive(&self) -> Result<Option<ReceivedFrame>, ConnectionError> {
        let Some(text) = self
            .transport
            .recv_text()
            .await
            .map_err(ConnectionError::transport)?
        else {
            return Ok(None);
        };

        let size = text.len();
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.touch();

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProtocolError::handler(format!("invalid JSON message: {e}")))?;
        Ok(Some(ReceivedFrame { value, size }))
    }

    /// Close the transport with a code and reason. Best-effort.
    pub async fn close(&self, code: u16, reason: &str) {
        if let Err(e) = self.transport.close(code, reason).await {
            tracing::debug!(connection_id = %self.id, error = %e, "close failed");
        }
    }
}
