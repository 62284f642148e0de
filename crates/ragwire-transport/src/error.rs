//! Transport error types.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// A frame exceeded the configured size limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The frame was not a UTF-8 JSON text frame.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Description of the problem.
        message: String,
    },
}

impl TransportError {
    /// Create an invalid-frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: message.into(),
        }
    }
}
