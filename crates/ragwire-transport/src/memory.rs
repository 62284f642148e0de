//! In-memory transport for testing.
//!
//! A connected pair of transports backed by channels, so servers can be
//! exercised in-process without network I/O. Close frames carry their
//! close code across the pair, which lets tests assert on codes like 1013.
//!
//! # Example
//!
//! ```rust
//! use ragwire_transport::{FrameTransport, MemoryTransport};
//!
//! # tokio_test::block_on(async {
//! let (client, server) = MemoryTransport::pair();
//! client.send_text(r#"{"type":"ping"}"#.to_string()).await.unwrap();
//! let frame = server.recv_text().await.unwrap().unwrap();
//! assert!(frame.contains("ping"));
//! # });
//! ```

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::channel::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::TransportError;
use crate::traits::{FrameTransport, TransportMetadata};

/// A close frame observed from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code (1000 normal, 1013 overloaded, ...).
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

#[derive(Debug)]
enum Frame {
    Text(String),
    Close(CloseFrame),
}

/// One end of an in-memory transport pair.
pub struct MemoryTransport {
    sender: mpsc::Sender<Frame>,
    receiver: AsyncMutex<mpsc::Receiver<Frame>>,
    connected: Arc<AtomicBool>,
    peer_close: StdMutex<Option<CloseFrame>>,
    metadata: TransportMetadata,
}

impl MemoryTransport {
    /// Create a connected pair of memory transports.
    ///
    /// Frames sent on the first transport are received on the second,
    /// and vice versa.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(32)
    }

    /// Create a connected pair with a specific buffer capacity.
    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (tx1, rx1) = mpsc::channel(capacity);
        let (tx2, rx2) = mpsc::channel(capacity);

        let connected1 = Arc::new(AtomicBool::new(true));
        let connected2 = Arc::clone(&connected1);

        let transport1 = Self {
            sender: tx2,
            receiver: AsyncMutex::new(rx1),
            connected: connected1,
            peer_close: StdMutex::new(None),
            metadata: TransportMetadata::new("memory")
                .remote_addr("peer-1")
                .local_addr("peer-0")
                .connected_now(),
        };

        let transport2 = Self {
            sender: tx1,
            receiver: AsyncMutex::new(rx2),
            connected: connected2,
            peer_close: StdMutex::new(None),
            metadata: TransportMetadata::new("memory")
                .remote_addr("peer-0")
                .local_addr("peer-1")
                .connected_now(),
        };

        (transport1, transport2)
    }

    /// The close frame received from the peer, if the peer closed first.
    #[must_use]
    pub fn peer_close(&self) -> Option<CloseFrame> {
        self.peer_close
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn record_peer_close(&self, frame: CloseFrame) {
        let mut guard = self
            .peer_close
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get_or_insert(frame);
    }
}

impl FrameTransport for MemoryTransport {
    type Error = TransportError;

    async fn send_text(&self, frame: String) -> Result<(), Self::Error> {
        use futures::SinkExt;

        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // Clone the sender to get a mutable handle
        let mut sender = self.sender.clone();
        sender
            .send(Frame::Text(frame))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv_text(&self) -> Result<Option<String>, Self::Error> {
        use futures::StreamExt;

        let mut receiver = self.receiver.lock().await;
        let frame = if self.is_connected() {
            receiver.next().await
        } else {
            // The pair is already closed; deliver whatever was queued
            // before the close frame, then report EOF.
            receiver.try_next().unwrap_or(None)
        };
        match frame {
            Some(Frame::Text(text)) => Ok(Some(text)),
            Some(Frame::Close(frame)) => {
                self.record_peer_close(frame);
                self.connected.store(false, Ordering::SeqCst);
                Ok(None)
            }
            None => {
                self.connected.store(false, Ordering::SeqCst);
                Ok(None)
            }
        }
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error> {
        use futures::SinkExt;

        // Best-effort close frame; the peer may already be gone.
        let mut sender = self.sender.clone();
        let _ = sender
            .send(Frame::Close(CloseFrame {
                code,
                reason: reason.to_string(),
            }))
            .await;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::close_code;

    #[tokio::test]
    async fn pair_is_connected() {
        let (client, server) = MemoryTransport::pair();
        assert!(client.is_connected());
        assert!(server.is_connected());
        assert_eq!(client.metadata().transport_type, "memory");
    }

    #[tokio::test]
    async fn send_and_receive() {
        let (client, server) = MemoryTransport::pair();

        client
            .send_text(r#"{"type":"ready"}"#.to_string())
            .await
            .unwrap();
        let frame = server.recv_text().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"ready"}"#);
    }

    #[tokio::test]
    async fn bidirectional() {
        let (client, server) = MemoryTransport::pair();

        client.send_text("a".to_string()).await.unwrap();
        server.send_text("b".to_string()).await.unwrap();

        assert_eq!(server.recv_text().await.unwrap().unwrap(), "a");
        assert_eq!(client.recv_text().await.unwrap().unwrap(), "b");
    }

    #[tokio::test]
    async fn close_code_crosses_the_pair() {
        let (client, server) = MemoryTransport::pair();

        server
            .close(close_code::OVERLOADED, "server overloaded")
            .await
            .unwrap();

        assert_eq!(client.recv_text().await.unwrap(), None);
        let frame = client.peer_close().unwrap();
        assert_eq!(frame.code, close_code::OVERLOADED);
        assert_eq!(frame.reason, "server overloaded");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (client, server) = MemoryTransport::pair();

        client.close(close_code::NORMAL, "bye").await.unwrap();
        let result = server.send_text("late".to_string()).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
