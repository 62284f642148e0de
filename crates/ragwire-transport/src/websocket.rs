//! Server-side WebSocket transport.
//!
//! [`WebSocketListener`] binds a TCP listener and upgrades each accepted
//! stream to a WebSocket; each upgrade yields a [`WebSocketTransport`]
//! carrying UTF-8 JSON text frames. Frames above the configured size limit
//! are rejected at this layer, before the protocol ever sees them.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig as WsProtocolConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::error::TransportError;
use crate::traits::{FrameTransport, TransportListener, TransportMetadata};

/// Configuration for the WebSocket listener.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size in bytes; larger frames error out at the
    /// transport layer.
    pub max_message_size: usize,
}

impl WebSocketConfig {
    /// Create a configuration with the given frame size limit.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Set the maximum message size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    fn protocol_config(&self) -> WsProtocolConfig {
        let mut config = WsProtocolConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: ragwire_core::message::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// WebSocket listener for server-side connections.
pub struct WebSocketListener {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketListener {
    /// Bind a listener on the given address.
    pub async fn bind(
        addr: impl tokio::net::ToSocketAddrs,
        config: WebSocketConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    /// The listener configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl TransportListener for WebSocketListener {
    type Transport = WebSocketTransport;
    type Error = TransportError;

    async fn accept(&self) -> Result<Self::Transport, Self::Error> {
        let (stream, peer_addr) = self.listener.accept().await?;
        tracing::debug!(peer = %peer_addr, "accepting WebSocket connection");

        let ws_stream = tokio_tungstenite::accept_async_with_config(
            stream,
            Some(self.config.protocol_config()),
        )
        .await?;

        let local_addr = self.local_addr().unwrap_or_default();
        Ok(WebSocketTransport::new(
            ws_stream,
            TransportMetadata::new("websocket")
                .remote_addr(peer_addr.to_string())
                .local_addr(local_addr)
                .connected_now(),
        ))
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

/// One accepted WebSocket connection.
///
/// The stream is split so sends and receives can proceed from different
/// tasks; each half sits behind its own async lock.
pub struct WebSocketTransport {
    writer: AsyncMutex<SplitSink<WebSocketStream<TcpStream>, WsMessage>>,
    reader: AsyncMutex<SplitStream<WebSocketStream<TcpStream>>>,
    connected: AtomicBool,
    metadata: TransportMetadata,
}

impl WebSocketTransport {
    fn new(stream: WebSocketStream<TcpStream>, metadata: TransportMetadata) -> Self {
        let (writer, reader) = stream.split();
        Self {
            writer: AsyncMutex::new(writer),
            reader: AsyncMutex::new(reader),
            connected: AtomicBool::new(true),
            metadata,
        }
    }
}

impl FrameTransport for WebSocketTransport {
    type Error = TransportError;

    async fn send_text(&self, frame: String) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut writer = self.writer.lock().await;
        writer.send(WsMessage::Text(frame)).await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            TransportError::from(e)
        })
    }

    async fn recv_text(&self) -> Result<Option<String>, Self::Error> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                // tungstenite answers pings internally; control frames and
                // pongs are not protocol messages.
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Binary(_))) => {
                    return Err(TransportError::invalid_frame(
                        "binary frames are not part of the protocol",
                    ));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(close = ?frame, "peer closed WebSocket");
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::from(e));
                }
            }
        }
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        // Best-effort: the peer may already be gone.
        let _ = writer.send(WsMessage::Close(Some(frame))).await;
        let _ = writer.flush().await;
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
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn accept_and_exchange_frames() {
        let listener = WebSocketListener::bind("127.0.0.1:0", WebSocketConfig::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let frame = transport.recv_text().await.unwrap().unwrap();
            assert_eq!(frame, r#"{"type":"ready"}"#);
            transport
                .send_text(r#"{"type":"pong"}"#.to_string())
                .await
                .unwrap();
            transport.close(close_code::NORMAL, "done").await.unwrap();
        });

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        client
            .send(WsMessage::Text(r#"{"type":"ready"}"#.to_string()))
            .await
            .unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, WsMessage::Text(r#"{"type":"pong"}"#.to_string()));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn close_carries_the_code() {
        let listener = WebSocketListener::bind("127.0.0.1:0", WebSocketConfig::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            transport
                .close(close_code::OVERLOADED, "server overloaded")
                .await
                .unwrap();
        });

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let frame = client.next().await.unwrap().unwrap();
        match frame {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), close_code::OVERLOADED);
                assert_eq!(frame.reason, "server overloaded");
            }
            other => panic!("expected close frame, got {other:?}"),
        }

        server.await.unwrap();
    }
}
