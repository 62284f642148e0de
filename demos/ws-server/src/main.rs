//! Runnable WebSocket server wired over the mock RAG providers.
//!
//! Configuration comes from the environment:
//! - `RAGWIRE_ADDR`: bind address (default `127.0.0.1:8080`)
//! - `RAGWIRE_MAX_CONNECTIONS`: connection cap (default 100)
//! - `RUST_LOG`: tracing filter (default `info`)

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ragwire_core::version::ProtocolVersion;
use ragwire_rag::mock::{MockDocumentStore, MockSearchProvider, MockSummaryProvider};
use ragwire_rag::{RagAdapterV1, RagService};
use ragwire_server::{Monitor, ProtocolServer, ServerConfig, VersionRegistry};
use ragwire_transport::websocket::{WebSocketConfig, WebSocketListener, WebSocketTransport};
use ragwire_transport::TransportListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::var("RAGWIRE_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let max_connections = std::env::var("RAGWIRE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);

    let service = Arc::new(RagService::new(
        Arc::new(MockSearchProvider::new()),
        Arc::new(MockDocumentStore::new()),
        Arc::new(MockSummaryProvider::new()),
    ));

    let mut registry = VersionRegistry::new();
    registry.register(Arc::new(RagAdapterV1::new(Arc::clone(&service))))?;
    registry.register(Arc::new(RagAdapterV1::with_version(
        service,
        ProtocolVersion::new("1.1"),
    )))?;
    for (server, client) in [("1.0", "1.0"), ("1.0", "0.9"), ("1.1", "1.1"), ("1.1", "1.0")] {
        registry.set_compatibility(
            ProtocolVersion::new(server),
            ProtocolVersion::new(client),
            true,
        );
    }

    let config = ServerConfig {
        max_connections,
        ..ServerConfig::default()
    };
    let server: Arc<ProtocolServer<WebSocketTransport>> = Arc::new(ProtocolServer::new(
        Arc::new(registry),
        Arc::new(Monitor::new()),
        config,
    ));

    let listener = WebSocketListener::bind(addr.as_str(), WebSocketConfig::default()).await?;
    tracing::info!(
        addr = %listener.local_addr().unwrap_or(addr),
        max_connections,
        "ragwire server listening"
    );

    loop {
        match listener.accept().await {
            Ok(transport) => {
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    server.handle_connection(transport).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection");
            }
        }
    }
}
