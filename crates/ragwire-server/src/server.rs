//! The protocol server runtime.
//!
//! Accepts transports, enforces the connection cap, drives the handshake
//! and the steady-state message loop per connection, and feeds the
//! monitor at every lifecycle point. A fault on one connection never
//! propagates to another: each connection runs in its own task and every
//! failure is handled inside it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use ragwire_core::adapter::ToolAdapter;
use ragwire_core::capability::ServerInfo;
use ragwire_core::error::ProtocolError;
use ragwire_core::message::{
    CapabilitiesBody, ClientMessage, DEFAULT_MAX_MESSAGE_SIZE, HelloCapabilities, MessageId,
    QuotaLimits, SERVER_FEATURES, ServerMessage, extract_id,
};
use ragwire_core::version::ProtocolVersion;
use ragwire_transport::{FrameTransport, close_code};

use crate::connection::{Connection, ConnectionError};
use crate::monitor::{MessageDirection, Monitor};
use crate::negotiator::Negotiator;
use crate::registry::VersionRegistry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Connection cap; transports beyond it are closed with 1013.
    pub max_connections: usize,
    /// Frame size limit advertised at handshake.
    pub max_message_size: usize,
    /// Identity advertised in the server `hello`.
    pub server_info: ServerInfo,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            server_info: ServerInfo::new("ragwire", env!("CARGO_PKG_VERSION"))
                .with_description("RAG server with versioned tool-invocation protocol"),
        }
    }
}

/// Server identity and uptime block of [`ServerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfoStats {
    /// Server name.
    pub name: String,
    /// Server software version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: f64,
    /// When the server started.
    pub started_at: DateTime<Utc>,
}

/// Connection counts block of [`ServerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    /// Currently active connections.
    pub active: usize,
    /// Lifetime accepted connections.
    pub total_since_start: u64,
    /// The configured cap.
    pub max_allowed: usize,
    /// Active connections per negotiated version.
    pub by_version: HashMap<String, usize>,
}

/// Message counts block of [`ServerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct MessageStats {
    /// Messages processed since start.
    pub total_processed: u64,
    /// Messages per lifetime connection.
    pub average_per_connection: f64,
}

/// Protocol block of [`ServerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolStats {
    /// Registered versions, ascending.
    pub supported_versions: Vec<String>,
    /// Shallow copy of the compatibility matrix.
    pub compatibility_matrix: HashMap<String, HashMap<String, bool>>,
}

/// Snapshot returned by [`ProtocolServer::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    /// Identity and uptime.
    pub server: ServerInfoStats,
    /// Connection counts.
    pub connections: ConnectionStats,
    /// Message counts.
    pub messages: MessageStats,
    /// Version and compatibility information.
    pub protocols: ProtocolStats,
}

/// The protocol server.
///
/// Owns the live connection set and the monitor; shares the registry
/// (read-only after startup) with the negotiator.
pub struct ProtocolServer<T: FrameTransport + 'static> {
    registry: Arc<VersionRegistry>,
    negotiator: Negotiator,
    monitor: Arc<Monitor>,
    config: ServerConfig,
    connections: AsyncMutex<HashMap<Uuid, Arc<Connection<T>>>>,
    total_connections: AtomicU64,
    total_messages: AtomicU64,
    started_at: DateTime<Utc>,
}

impl<T: FrameTransport + 'static> ProtocolServer<T> {
    /// Build a server from its parts.
    #[must_use]
    pub fn new(registry: Arc<VersionRegistry>, monitor: Arc<Monitor>, config: ServerConfig) -> Self {
        Self {
            negotiator: Negotiator::new(Arc::clone(&registry)),
            registry,
            monitor,
            config,
            connections: AsyncMutex::new(HashMap::new()),
            total_connections: AtomicU64::new(0),
            total_messages: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    /// The server's monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of live connections.
    pub async fn active_connections(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Drive one accepted transport through its entire lifecycle.
    ///
    /// Runs until the client disconnects or a fatal error occurs, then
    /// cleans up. Never panics across the task boundary.
    pub async fn handle_connection(&self, transport: T) {
        let connection = Arc::new(Connection::new(transport));

        // The cap check and insertion happen under one lock so a burst
        // cannot race past the cap.
        {
            let mut connections = self.connections.lock().await;
            if connections.len() >= self.config.max_connections {
                drop(connections);
                tracing::warn!(
                    connection_id = %connection.id(),
                    max_connections = self.config.max_connections,
                    "connection limit reached, rejecting"
                );
                connection
                    .close(close_code::OVERLOADED, "server overloaded")
                    .await;
                return;
            }
            connections.insert(connection.id(), Arc::clone(&connection));
        }
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        tracing::info!(connection_id = %connection.id(), "new connection");

        let mut close = (close_code::NORMAL, "");
        match self.run_connection(&connection).await {
            Ok(()) => {
                tracing::info!(connection_id = %connection.id(), "client disconnected");
            }
            Err(ConnectionError::Transport(e)) => {
                tracing::info!(connection_id = %connection.id(), error = %e, "transport closed");
            }
            Err(ConnectionError::Protocol(err)) if err.is_fatal() => {
                // The error frame was already sent before this bubbled up.
                tracing::warn!(connection_id = %connection.id(), error = %err, "connection terminated");
            }
            Err(ConnectionError::Protocol(err)) => {
                tracing::error!(connection_id = %connection.id(), error = %err, "internal error on connection");
                let reply =
                    ServerMessage::error(None, &ProtocolError::server("internal server error"));
                let _ = connection.send(&reply).await;
                close = (close_code::INTERNAL_ERROR, "internal server error");
            }
        }

        self.monitor.track_connection_ended(connection.id());
        self.connections.lock().await.remove(&connection.id());
        if connection.is_connected() {
            connection.close(close.0, close.1).await;
        }
        tracing::debug!(connection_id = %connection.id(), "connection cleanup complete");
    }

    async fn run_connection(&self, connection: &Arc<Connection<T>>) -> Result<(), ConnectionError> {
        let adapter = self.perform_handshake(connection).await?;

        let version = adapter.version();
        self.monitor.track_connection_started(
            connection.id(),
            &version,
            connection.client_info(),
        );

        self.message_loop(connection, adapter).await
    }

    /// Handshake: exactly one `hello`, negotiation, the server `hello`,
    /// then a tolerant wait for `ready`.
    async fn perform_handshake(
        &self,
        connection: &Arc<Connection<T>>,
    ) -> Result<Arc<dyn ToolAdapter>, ConnectionError> {
        let frame = match connection.receive().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(ConnectionError::transport("closed during handshake"));
            }
            Err(ConnectionError::Protocol(err)) => {
                let violation =
                    ProtocolError::violation(format!("expected 'hello' as the first message: {err}"));
                self.fail_handshake(connection, &violation).await;
                return Err(violation.into());
            }
            Err(e) => return Err(e),
        };

        let (capabilities, client_info) = match ClientMessage::from_value(frame.value) {
            Ok(ClientMessage::Hello {
                capabilities,
                client_info,
            }) => (capabilities, client_info),
            Ok(other) => {
                let violation = ProtocolError::violation(format!(
                    "expected 'hello' as the first message, got '{}'",
                    other.message_type()
                ));
                self.fail_handshake(connection, &violation).await;
                return Err(violation.into());
            }
            Err(err) => {
                let violation =
                    ProtocolError::violation(format!("expected 'hello' as the first message: {err}"));
                self.fail_handshake(connection, &violation).await;
                return Err(violation.into());
            }
        };

        let negotiated = match self.negotiator.negotiate(&capabilities) {
            Ok(version) => version,
            Err(err) => {
                let client_versions: Vec<String> = capabilities
                    .declared_versions()
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect();
                self.monitor
                    .track_negotiation_failure(&client_versions, &err.to_string());
                let reply = ServerMessage::error(None, &err);
                let _ = connection.send(&reply).await;
                return Err(err.into());
            }
        };

        connection.set_negotiated_version(negotiated.clone());
        connection.set_client_info(client_info);
        tracing::info!(connection_id = %connection.id(), version = %negotiated, "protocol negotiated");

        let adapter = self.registry.get(&negotiated).ok_or_else(|| {
            ProtocolError::server(format!("no adapter for negotiated version {negotiated}"))
        })?;

        let hello = ServerMessage::Hello {
            protocol_version: negotiated.clone(),
            server_info: self.config.server_info.clone(),
            capabilities: HelloCapabilities {
                tools: adapter.tools(),
                features: SERVER_FEATURES.iter().map(ToString::to_string).collect(),
                max_message_size: self.config.max_message_size,
            },
        };
        connection.send(&hello).await?;

        // The ready slot is tolerant: anything else is logged and the
        // connection proceeds to Ready anyway.
        match connection.receive().await {
            Ok(Some(frame)) => match ClientMessage::from_value(frame.value) {
                Ok(ClientMessage::Ready) => {}
                Ok(other) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        message_type = other.message_type(),
                        "unexpected message in the ready slot"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        error = %err,
                        "unparsable message in the ready slot"
                    );
                }
            },
            Ok(None) => {
                return Err(ConnectionError::transport("closed during handshake"));
            }
            Err(ConnectionError::Protocol(err)) => {
                tracing::warn!(connection_id = %connection.id(), error = %err, "unparsable message in the ready slot");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(connection_id = %connection.id(), "handshake complete");
        Ok(adapter)
    }

    async fn fail_handshake(&self, connection: &Arc<Connection<T>>, err: &ProtocolError) {
        self.monitor
            .track_handshake_failure("unknown", &err.to_string());
        let reply = ServerMessage::error(None, err);
        // Send failures here are swallowed; the connection closes either way.
        let _ = connection.send(&reply).await;
    }

    /// Steady-state loop: dispatch typed messages until close.
    async fn message_loop(
        &self,
        connection: &Arc<Connection<T>>,
        adapter: Arc<dyn ToolAdapter>,
    ) -> Result<(), ConnectionError> {
        loop {
            let frame = match connection.receive().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(ConnectionError::Protocol(err)) if !err.is_fatal() => {
                    connection.record_error();
                    self.send_error(connection, None, &err).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.total_messages.fetch_add(1, Ordering::Relaxed);
            let message_type = frame
                .value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            self.monitor.track_message(
                connection.id(),
                &message_type,
                frame.size,
                MessageDirection::Inbound,
            );
            let raw_id = extract_id(&frame.value);

            match ClientMessage::from_value(frame.value) {
                Ok(ClientMessage::ToolCall {
                    tool,
                    parameters,
                    id,
                }) => {
                    // Fan out so the receive side keeps accepting messages
                    // while this call is in flight; replies may interleave
                    // out of request order.
                    let connection = Arc::clone(connection);
                    let adapter = Arc::clone(&adapter);
                    let monitor = Arc::clone(&self.monitor);
                    tokio::spawn(dispatch_tool_call(
                        connection, adapter, monitor, tool, parameters, id,
                    ));
                }
                Ok(ClientMessage::Ping { id }) => {
                    self.send_reply(connection, ServerMessage::Pong { id }).await?;
                }
                Ok(ClientMessage::GetCapabilities { id }) => {
                    let reply = ServerMessage::Capabilities {
                        id,
                        capabilities: CapabilitiesBody {
                            protocol_version: adapter.version(),
                            tools: adapter.tools(),
                            features: SERVER_FEATURES.iter().map(ToString::to_string).collect(),
                            limits: QuotaLimits {
                                max_message_size: self.config.max_message_size,
                                ..QuotaLimits::default()
                            },
                        },
                    };
                    self.send_reply(connection, reply).await?;
                }
                Ok(ClientMessage::GetProtocolInfo { id }) => {
                    let version = adapter.version();
                    if let Some(info) = self.negotiator.protocol_info(&version) {
                        self.send_reply(connection, ServerMessage::ProtocolInfo { id, info })
                            .await?;
                    } else {
                        let err = ProtocolError::handler(format!(
                            "no protocol info for version {version}"
                        ));
                        connection.record_error();
                        self.send_error(connection, id, &err).await?;
                    }
                }
                Ok(other) => {
                    // hello/ready have no business in the Ready state
                    let err =
                        ProtocolError::UnknownMessageType(other.message_type().to_string());
                    connection.record_error();
                    self.send_error(connection, raw_id, &err).await?;
                }
                Err(err) => {
                    connection.record_error();
                    self.send_error(connection, raw_id, &err).await?;
                }
            }
        }
    }

    async fn send_reply(
        &self,
        connection: &Arc<Connection<T>>,
        reply: ServerMessage,
    ) -> Result<(), ConnectionError> {
        let size = connection.send(&reply).await?;
        self.monitor.track_message(
            connection.id(),
            reply.message_type(),
            size,
            MessageDirection::Outbound,
        );
        Ok(())
    }

    async fn send_error(
        &self,
        connection: &Arc<Connection<T>>,
        id: Option<MessageId>,
        err: &ProtocolError,
    ) -> Result<(), ConnectionError> {
        self.send_reply(connection, ServerMessage::error(id, err)).await
    }

    /// Broadcast a raw JSON object to every live connection.
    ///
    /// Per-connection send failures are logged and skipped; returns the
    /// number of successful sends.
    pub async fn broadcast(
        &self,
        message: &Value,
        version_filter: Option<&ProtocolVersion>,
    ) -> usize {
        let connections: Vec<Arc<Connection<T>>> = {
            self.connections.lock().await.values().cloned().collect()
        };

        let mut sent = 0;
        for connection in connections {
            if let Some(filter) = version_filter {
                if connection.negotiated_version() != Some(filter) {
                    continue;
                }
            }
            match connection.send_value(message).await {
                Ok(size) => {
                    sent += 1;
                    self.monitor.track_message(
                        connection.id(),
                        "broadcast",
                        size,
                        MessageDirection::Outbound,
                    );
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection.id(), error = %e, "broadcast send failed");
                }
            }
        }

        tracing::info!(recipients = sent, "broadcast complete");
        sent
    }

    /// Current server statistics.
    pub async fn stats(&self) -> ServerStats {
        let (active, by_version) = {
            let connections = self.connections.lock().await;
            let mut by_version: HashMap<String, usize> = HashMap::new();
            for connection in connections.values() {
                let version = connection
                    .negotiated_version()
                    .map_or_else(|| "unknown".to_string(), |v| v.as_str().to_string());
                *by_version.entry(version).or_insert(0) += 1;
            }
            (connections.len(), by_version)
        };

        let total_connections = self.total_connections.load(Ordering::Relaxed);
        let total_messages = self.total_messages.load(Ordering::Relaxed);

        ServerStats {
            server: ServerInfoStats {
                name: self.config.server_info.name.clone(),
                version: self.config.server_info.version.clone(),
                uptime_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
                started_at: self.started_at,
            },
            connections: ConnectionStats {
                active,
                total_since_start: total_connections,
                max_allowed: self.config.max_connections,
                by_version,
            },
            messages: MessageStats {
                total_processed: total_messages,
                average_per_connection: total_messages as f64 / total_connections.max(1) as f64,
            },
            protocols: ProtocolStats {
                supported_versions: self.registry.version_strings(),
                compatibility_matrix: self.negotiator.compatibility_matrix(),
            },
        }
    }
}

/// One tool dispatch, running as its own task.
///
/// Execution time is always reported, even on failure. The reply is
/// discarded if the transport closed while the call was in flight.
async fn dispatch_tool_call<T: FrameTransport>(
    connection: Arc<Connection<T>>,
    adapter: Arc<dyn ToolAdapter>,
    monitor: Arc<Monitor>,
    tool: String,
    parameters: Map<String, Value>,
    id: Option<MessageId>,
) {
    let started = Instant::now();
    let result = if adapter.supports_tool(&tool) {
        adapter.dispatch(&tool, parameters).await
    } else {
        Err(ProtocolError::UnsupportedTool(tool.clone()))
    };
    let elapsed = started.elapsed();
    let execution_time_ms = elapsed.as_secs_f64() * 1000.0;
    connection.record_tool_call(&tool);

    let reply = match result {
        Ok(result) => {
            monitor.track_tool_call(connection.id(), &tool, elapsed, true, None);
            ServerMessage::ToolResponse {
                id,
                tool: tool.clone(),
                result,
                execution_time_ms,
                timestamp: Utc::now(),
            }
        }
        Err(err) => {
            connection.record_error();
            monitor.track_tool_call(connection.id(), &tool, elapsed, false, Some(err.kind()));
            tracing::warn!(connection_id = %connection.id(), tool, error = %err, "tool call failed");
            // Unknown tools keep their specific code; every other failure
            // surfaces as a failed execution with the detail in the message.
            let wrapped = match err {
                ProtocolError::UnsupportedTool(_) | ProtocolError::ToolExecution { .. } => err,
                other => ProtocolError::tool_execution(tool.as_str(), other.to_string()),
            };
            ServerMessage::tool_error(id, tool.as_str(), &wrapped, execution_time_ms)
        }
    };

    match connection.send(&reply).await {
        Ok(size) => {
            monitor.track_message(
                connection.id(),
                reply.message_type(),
                size,
                MessageDirection::Outbound,
            );
        }
        Err(e) => {
            tracing::debug!(connection_id = %connection.id(), error = %e, "tool reply discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_message_size, 10 * 1024 * 1024);
        assert_eq!(config.server_info.name, "ragwire");
    }
}
