//! End-to-end protocol tests over the in-memory pair transport.
//!
//! Each test stands up a real server with the v1 adapter over mock
//! providers, drives it from the client side of a transport pair, and
//! asserts on the wire frames and the monitor's view.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;

use ragwire_core::version::ProtocolVersion;
use ragwire_rag::mock::{MockDocumentStore, MockSearchProvider, MockSummaryProvider};
use ragwire_rag::{RagAdapterV1, RagService};
use ragwire_server::{Monitor, ProtocolServer, ServerConfig, VersionRegistry};
use ragwire_transport::{FrameTransport, MemoryTransport, close_code};

fn rag_service() -> Arc<RagService> {
    Arc::new(RagService::new(
        Arc::new(MockSearchProvider::new()),
        Arc::new(MockDocumentStore::new()),
        Arc::new(MockSummaryProvider::new()),
    ))
}

/// Registry with adapters 1.0 and 1.1 and the edges
/// (1.0,1.0), (1.0,0.9), (1.1,1.1), (1.1,1.0).
fn build_server(max_connections: usize) -> Arc<ProtocolServer<MemoryTransport>> {
    let service = rag_service();
    let mut registry = VersionRegistry::new();
    registry
        .register(Arc::new(RagAdapterV1::new(Arc::clone(&service))))
        .unwrap();
    registry
        .register(Arc::new(RagAdapterV1::with_version(
            service,
            ProtocolVersion::new("1.1"),
        )))
        .unwrap();
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
    Arc::new(ProtocolServer::new(
        Arc::new(registry),
        Arc::new(Monitor::new()),
        config,
    ))
}

struct TestClient {
    transport: MemoryTransport,
}

impl TestClient {
    async fn send(&self, message: Value) {
        self.transport.send_text(message.to_string()).await.unwrap();
    }

    async fn send_raw(&self, frame: &str) {
        self.transport.send_text(frame.to_string()).await.unwrap();
    }

    async fn recv(&self) -> Value {
        let frame = self
            .transport
            .recv_text()
            .await
            .unwrap()
            .expect("connection closed unexpectedly");
        serde_json::from_str(&frame).unwrap()
    }

    async fn recv_closed(&self) {
        assert!(self.transport.recv_text().await.unwrap().is_none());
    }

    async fn handshake(&self, capabilities: Value) -> Value {
        self.send(json!({
            "type": "hello",
            "capabilities": capabilities,
            "client_info": {"name": "test-client", "version": "0.1"},
        }))
        .await;
        let hello = self.recv().await;
        self.send(json!({"type": "ready"})).await;
        hello
    }
}

fn connect(server: &Arc<ProtocolServer<MemoryTransport>>) -> (TestClient, JoinHandle<()>) {
    let (client_side, server_side) = MemoryTransport::pair();
    let server = Arc::clone(server);
    let handle = tokio::spawn(async move {
        server.handle_connection(server_side).await;
    });
    (
        TestClient {
            transport: client_side,
        },
        handle,
    )
}

#[tokio::test]
async fn exact_match_handshake() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);

    let hello = client
        .handshake(json!({"protocolVersion": "1.0", "features": []}))
        .await;

    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["protocol_version"], "1.0");
    let tools = hello["capabilities"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
    assert!(tools.contains(&json!("rag_search")));
    assert_eq!(
        hello["capabilities"]["max_message_size"],
        10 * 1024 * 1024
    );
    let features = hello["capabilities"]["features"].as_array().unwrap();
    assert!(features.contains(&json!("async_tools")));
}

#[tokio::test]
async fn newest_version_wins_among_exact_matches() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);

    let hello = client
        .handshake(json!({"supportedVersions": ["1.0", "1.1"]}))
        .await;
    assert_eq!(hello["protocol_version"], "1.1");
}

#[tokio::test]
async fn old_client_lands_on_a_compatible_version() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);

    let hello = client
        .handshake(json!({"supportedVersions": ["0.9"], "features": []}))
        .await;
    assert_eq!(hello["protocol_version"], "1.0");
}

#[tokio::test]
async fn negotiation_failure_reports_supported_versions_and_closes() {
    let server = build_server(100);
    let (client, handle) = connect(&server);

    client
        .send(json!({
            "type": "hello",
            "capabilities": {"supportedVersions": ["2.0"]},
            "client_info": {},
        }))
        .await;

    let reply = client.recv().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], "PROTOCOL_NEGOTIATION_FAILED");
    assert_eq!(reply["error"]["supported_versions"], json!(["1.0", "1.1"]));

    client.recv_closed().await;
    handle.await.unwrap();
    assert_eq!(server.active_connections().await, 0);
}

#[tokio::test]
async fn tool_call_before_hello_is_a_protocol_violation() {
    let server = build_server(100);
    let (client, handle) = connect(&server);

    client
        .send(json!({
            "type": "tool_call",
            "tool": "rag_search",
            "parameters": {"query": "sneaky"},
            "id": 1,
        }))
        .await;

    let reply = client.recv().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], "PROTOCOL_VIOLATION");

    client.recv_closed().await;
    handle.await.unwrap();

    // No dispatch happened: the monitor saw no tool calls.
    assert!(server.monitor().summary().tools.is_empty());
}

#[tokio::test]
async fn tool_error_accounting_and_recovery() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    // Missing required `query`
    client
        .send(json!({
            "type": "tool_call",
            "tool": "rag_search",
            "parameters": {},
            "id": "call-1",
        }))
        .await;

    let reply = client.recv().await;
    assert_eq!(reply["type"], "tool_error");
    assert_eq!(reply["id"], "call-1");
    assert_eq!(reply["tool"], "rag_search");
    assert_eq!(reply["error"]["code"], "TOOL_EXECUTION_ERROR");
    assert!(reply["error"]["execution_time_ms"].as_f64().unwrap() >= 0.0);

    // Connection is still Ready
    client.send(json!({"type": "ping", "id": "p1"})).await;
    let pong = client.recv().await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["id"], "p1");

    let summary = server.monitor().summary();
    let tool = &summary.tools["rag_search"];
    assert_eq!(tool.total_calls, 1);
    assert_eq!(tool.success_rate, 0.0);
    assert_eq!(tool.error_types["InvalidArgument"], 1);

    // A valid follow-up call brings the success rate to 0.5
    client
        .send(json!({
            "type": "tool_call",
            "tool": "rag_search",
            "parameters": {"query": "rust", "threshold": 0.0},
            "id": "call-2",
        }))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["type"], "tool_response");
    assert_eq!(reply["id"], "call-2");
    assert_eq!(reply["result"]["total_results"], 3);

    let summary = server.monitor().summary();
    let tool = &summary.tools["rag_search"];
    assert_eq!(tool.total_calls, 2);
    assert_eq!(tool.success_rate, 0.5);
}

#[tokio::test]
async fn capacity_overflow_closes_with_1013() {
    let server = build_server(100);

    let mut clients = Vec::new();
    for _ in 0..100 {
        clients.push(connect(&server));
    }
    // Wait for all hundred insertions; the cap check races the spawned tasks.
    for _ in 0..100 {
        if server.active_connections().await == 100 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.active_connections().await, 100);

    let monitor_before = server.monitor().summary();
    let (rejected, handle) = connect(&server);
    handle.await.unwrap();

    rejected.recv_closed().await;
    let close = rejected.transport.peer_close().unwrap();
    assert_eq!(close.code, close_code::OVERLOADED);
    assert_eq!(close.reason, "server overloaded");

    // Nothing was recorded for the rejected transport.
    let monitor_after = server.monitor().summary();
    assert_eq!(
        monitor_before.total_connections,
        monitor_after.total_connections
    );
    assert_eq!(server.active_connections().await, 100);
}

#[tokio::test]
async fn replies_echo_ids_across_message_types() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.1"})).await;

    client.send(json!({"type": "get_capabilities", "id": 7})).await;
    let caps = client.recv().await;
    assert_eq!(caps["type"], "capabilities");
    assert_eq!(caps["id"], 7);
    assert_eq!(caps["capabilities"]["protocol_version"], "1.1");
    assert_eq!(
        caps["capabilities"]["limits"]["max_message_size"],
        10 * 1024 * 1024
    );

    client
        .send(json!({"type": "get_protocol_info", "id": "info-1"}))
        .await;
    let info = client.recv().await;
    assert_eq!(info["type"], "protocol_info");
    assert_eq!(info["id"], "info-1");
    assert_eq!(info["info"]["version"], "1.1");
    assert_eq!(info["info"]["compatible_with"], json!(["1.0", "1.1"]));
    assert_eq!(info["info"]["features"]["tool_count"], 6);
}

#[tokio::test]
async fn unknown_message_type_is_non_fatal() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    client.send(json!({"type": "subscribe", "id": 5})).await;
    let reply = client.recv().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], "UNKNOWN_MESSAGE_TYPE");

    client.send(json!({"type": "ping", "id": 6})).await;
    assert_eq!(client.recv().await["type"], "pong");
}

#[tokio::test]
async fn invalid_json_gets_an_error_reply_and_the_connection_survives() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    client.send_raw("{definitely not json").await;
    let reply = client.recv().await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["error"]["code"], "HANDLER_ERROR");

    client.send(json!({"type": "ping", "id": 1})).await;
    assert_eq!(client.recv().await["type"], "pong");
}

#[tokio::test]
async fn a_non_ready_message_in_the_ready_slot_is_tolerated() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);

    client
        .send(json!({
            "type": "hello",
            "capabilities": {"protocolVersion": "1.0"},
            "client_info": {},
        }))
        .await;
    client.recv().await; // server hello

    // A ping lands where `ready` was expected: dropped, logged, tolerated.
    client.send(json!({"type": "ping", "id": "early"})).await;

    // The connection still reaches Ready.
    client.send(json!({"type": "ping", "id": "late"})).await;
    let pong = client.recv().await;
    assert_eq!(pong["id"], "late");
}

#[tokio::test]
async fn unsupported_tool_keeps_its_code() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    client
        .send(json!({
            "type": "tool_call",
            "tool": "rag_reindex",
            "parameters": {},
            "id": 9,
        }))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["type"], "tool_error");
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], "UNSUPPORTED_TOOL");
}

#[tokio::test]
async fn document_tools_round_trip_over_the_wire() {
    use base64::Engine as _;

    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    let content = base64::engine::general_purpose::STANDARD.encode(b"ragwire handles documents");
    client
        .send(json!({
            "type": "tool_call",
            "tool": "document_upload",
            "parameters": {"filename": "doc.txt", "content": content},
            "id": 1,
        }))
        .await;
    let uploaded = client.recv().await;
    assert_eq!(uploaded["type"], "tool_response");
    let doc_id = uploaded["result"]["document_id"].as_str().unwrap().to_string();

    client
        .send(json!({
            "type": "tool_call",
            "tool": "rag_summarize",
            "parameters": {"document_ids": [doc_id]},
            "id": 2,
        }))
        .await;
    let summary = client.recv().await;
    assert_eq!(summary["type"], "tool_response");
    assert_eq!(
        summary["result"]["summary"],
        "ragwire handles documents"
    );

    client
        .send(json!({
            "type": "tool_call",
            "tool": "document_list",
            "parameters": {},
            "id": 3,
        }))
        .await;
    let listed = client.recv().await;
    assert_eq!(listed["result"]["total_count"], 1);
}

#[tokio::test]
async fn broadcast_honors_the_version_filter() {
    let server = build_server(100);
    let (client_old, _h1) = connect(&server);
    client_old.handshake(json!({"protocolVersion": "1.0"})).await;
    let (client_new, _h2) = connect(&server);
    client_new.handshake(json!({"protocolVersion": "1.1"})).await;

    let message = json!({"type": "notice", "text": "maintenance at noon"});
    let sent = server
        .broadcast(&message, Some(&ProtocolVersion::new("1.1")))
        .await;
    assert_eq!(sent, 1);
    assert_eq!(client_new.recv().await["text"], "maintenance at noon");

    let sent_all = server.broadcast(&message, None).await;
    assert_eq!(sent_all, 2);
}

#[tokio::test]
async fn stats_reflect_live_connections_and_the_matrix() {
    let server = build_server(100);
    let (client, _handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;
    client.send(json!({"type": "ping", "id": 1})).await;
    client.recv().await;

    let stats = server.stats().await;
    assert_eq!(stats.server.name, "ragwire");
    assert_eq!(stats.connections.active, 1);
    assert_eq!(stats.connections.total_since_start, 1);
    assert_eq!(stats.connections.by_version["1.0"], 1);
    assert!(stats.messages.total_processed >= 1);
    assert_eq!(stats.protocols.supported_versions, vec!["1.0", "1.1"]);
    assert!(stats.protocols.compatibility_matrix["1.0"]["0.9"]);
}

#[tokio::test]
async fn monitor_sees_the_connection_through_its_lifecycle() {
    let server = build_server(100);
    let (client, handle) = connect(&server);
    client.handshake(json!({"protocolVersion": "1.0"})).await;

    let summary = server.monitor().summary();
    assert_eq!(summary.active_connections, 1);
    assert_eq!(summary.connections_by_version["1.0"], 1);

    drop(client);
    handle.await.unwrap();

    let summary = server.monitor().summary();
    assert_eq!(summary.active_connections, 0);
    assert_eq!(summary.total_connections, 1);
    assert_eq!(server.monitor().history_len(), 1);
}
