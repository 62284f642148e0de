//! Thread-safe metrics aggregation and health classification.
//!
//! All aggregates sit behind one internal lock; every entry point
//! acquires it briefly and releases before returning, and queries build
//! and return copies, never references into the live maps. Event
//! submissions never fail to callers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use ragwire_core::error::ProtocolError;
use ragwire_core::version::ProtocolVersion;

/// Rolling latency window size per tool.
const LATENCY_WINDOW: usize = 100;
/// Bound on the ended-connection history.
const HISTORY_LIMIT: usize = 10_000;

/// Direction of a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Client to server.
    Inbound,
    /// Server to client.
    Outbound,
}

/// Live metrics for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMetrics {
    /// The connection id.
    pub connection_id: Uuid,
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Client identity from its `hello`.
    pub client_info: Value,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Last observed activity.
    pub last_activity: DateTime<Utc>,
    /// Messages observed, both directions.
    pub message_count: u64,
    /// Bytes sent to the client.
    pub bytes_sent: u64,
    /// Bytes received from the client.
    pub bytes_received: u64,
    /// Errors observed on this connection.
    pub errors: u64,
    /// Per-tool call counts.
    pub tool_calls: HashMap<String, u64>,
}

/// A finished connection, kept in bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHistoryEntry {
    /// The connection id.
    pub connection_id: Uuid,
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Connection lifetime in seconds.
    pub duration_seconds: f64,
    /// Messages observed over the lifetime.
    pub message_count: u64,
    /// Errors observed over the lifetime.
    pub errors: u64,
    /// When the connection ended.
    pub ended_at: DateTime<Utc>,
}

/// Aggregate metrics for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolMetrics {
    /// Tool name.
    pub tool_name: String,
    /// All calls, successful and failed.
    pub total_calls: u64,
    /// Successful calls.
    pub successful_calls: u64,
    /// Failed calls.
    pub failed_calls: u64,
    /// Average over the rolling window, in seconds.
    pub avg_execution_time: f64,
    /// All-time minimum, in seconds.
    pub min_execution_time: f64,
    /// All-time maximum, in seconds.
    pub max_execution_time: f64,
    /// Failure counts by error-type tag.
    pub error_types: HashMap<String, u64>,
    #[serde(skip)]
    recent: VecDeque<f64>,
    #[serde(skip)]
    recent_sum: f64,
}

impl ToolMetrics {
    fn new(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            avg_execution_time: 0.0,
            min_execution_time: f64::INFINITY,
            max_execution_time: 0.0,
            error_types: HashMap::new(),
            recent: VecDeque::with_capacity(LATENCY_WINDOW),
            recent_sum: 0.0,
        }
    }

    fn record(&mut self, execution_secs: f64, success: bool, error_type: Option<&str>) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
        } else {
            self.failed_calls += 1;
            if let Some(tag) = error_type {
                *self.error_types.entry(tag.to_string()).or_insert(0) += 1;
            }
        }

        // Bounded window with a running sum, so the average stays O(1).
        if self.recent.len() == LATENCY_WINDOW {
            if let Some(evicted) = self.recent.pop_front() {
                self.recent_sum -= evicted;
            }
        }
        self.recent.push_back(execution_secs);
        self.recent_sum += execution_secs;
        self.avg_execution_time = self.recent_sum / self.recent.len() as f64;

        self.min_execution_time = self.min_execution_time.min(execution_secs);
        self.max_execution_time = self.max_execution_time.max(execution_secs);
    }

    /// Successful calls over total calls; 1.0 before any call.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// Aggregate metrics for one protocol version.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolMetrics {
    /// The version these metrics describe.
    pub protocol_version: String,
    /// Lifetime connection count.
    pub total_connections: u64,
    /// Currently active connections.
    pub active_connections: u64,
    /// Messages observed across all connections of this version.
    pub total_messages: u64,
    /// Failed handshakes.
    pub handshake_failures: u64,
    /// Failed negotiations.
    pub negotiation_failures: u64,
    /// Running mean connection lifetime, in seconds.
    pub avg_connection_duration: f64,
}

impl ProtocolMetrics {
    fn new(protocol_version: &str) -> Self {
        Self {
            protocol_version: protocol_version.to_string(),
            total_connections: 0,
            active_connections: 0,
            total_messages: 0,
            handshake_failures: 0,
            negotiation_failures: 0,
            avg_connection_duration: 0.0,
        }
    }
}

/// Alert thresholds driving health classification.
#[derive(Debug, Clone, Serialize)]
pub struct AlertThresholds {
    /// Active connections above this is a warning.
    pub max_connections: f64,
    /// A tool's failure ratio above this is critical.
    pub max_error_rate: f64,
    /// A tool's average latency above this (seconds) is a warning.
    pub max_response_time: f64,
    /// Idle time above this (seconds) marks a connection stale.
    pub connection_timeout: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_connections: 100.0,
            max_error_rate: 0.1,
            max_response_time: 30.0,
            connection_timeout: 300.0,
        }
    }
}

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No issues above info level.
    Healthy,
    /// Warning-level issues present.
    Degraded,
    /// Critical issues present.
    Unhealthy,
}

impl HealthStatus {
    /// The status as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Severity of a single health issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Listed, but does not alter status.
    Info,
    /// Degrades overall status.
    Warning,
    /// Makes overall status unhealthy.
    Critical,
}

/// One detected health issue.
#[derive(Debug, Clone, Serialize)]
pub struct HealthIssue {
    /// Machine-readable issue kind.
    pub kind: String,
    /// Issue severity.
    pub severity: IssueSeverity,
    /// Human-readable description.
    pub message: String,
}

/// Health report returned by [`Monitor::health`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall classification.
    pub status: HealthStatus,
    /// When the report was computed.
    pub timestamp: DateTime<Utc>,
    /// Active connections across all versions.
    pub active_connections: u64,
    /// Detected issues, all severities.
    pub issues: Vec<HealthIssue>,
}

/// Per-tool summary block inside [`MonitorSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    /// All calls, successful and failed.
    pub total_calls: u64,
    /// Successful calls over total calls.
    pub success_rate: f64,
    /// Average over the rolling window, in seconds.
    pub avg_execution_time: f64,
    /// Failure counts by error-type tag.
    pub error_types: HashMap<String, u64>,
}

/// Snapshot returned by [`Monitor::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Currently active connections.
    pub active_connections: u64,
    /// Lifetime connection count across all versions.
    pub total_connections: u64,
    /// Active connections per version.
    pub connections_by_version: HashMap<String, u64>,
    /// Per-tool summaries.
    pub tools: HashMap<String, ToolSummary>,
    /// Per-version metrics.
    pub protocols: HashMap<String, ProtocolMetrics>,
    /// Failed calls over total calls, across all tools.
    pub error_rate: f64,
    /// Messages per second since the earliest still-live connection.
    pub throughput_per_second: f64,
}

/// Details returned by [`Monitor::connection_details`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionDetails {
    /// The live metrics snapshot.
    #[serde(flatten)]
    pub metrics: ConnectionMetrics,
    /// Seconds since the connection was established.
    pub duration_seconds: f64,
}

#[derive(Default)]
struct MonitorState {
    connections: HashMap<Uuid, ConnectionMetrics>,
    history: VecDeque<ConnectionHistoryEntry>,
    tools: HashMap<String, ToolMetrics>,
    protocols: HashMap<String, ProtocolMetrics>,
    thresholds: AlertThresholds,
}

/// Concurrent protocol monitor.
///
/// Shared as `Arc<Monitor>` between the server and every connection
/// task. Event submissions never raise to callers.
pub struct Monitor {
    state: StdMutex<MonitorState>,
    retention: chrono::Duration,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// Create a monitor with the default 24-hour retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention_hours(24)
    }

    /// Create a monitor keeping history for the given number of hours.
    #[must_use]
    pub fn with_retention_hours(hours: i64) -> Self {
        Self {
            state: StdMutex::new(MonitorState::default()),
            retention: chrono::Duration::hours(hours),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new connection after a successful handshake.
    pub fn track_connection_started(
        &self,
        connection_id: Uuid,
        version: &ProtocolVersion,
        client_info: Value,
    ) {
        let now = Utc::now();
        let mut state = self.lock();
        state.connections.insert(
            connection_id,
            ConnectionMetrics {
                connection_id,
                protocol_version: version.as_str().to_string(),
                client_info,
                connected_at: now,
                last_activity: now,
                message_count: 0,
                bytes_sent: 0,
                bytes_received: 0,
                errors: 0,
                tool_calls: HashMap::new(),
            },
        );

        let protocol = state
            .protocols
            .entry(version.as_str().to_string())
            .or_insert_with(|| ProtocolMetrics::new(version.as_str()));
        protocol.total_connections += 1;
        protocol.active_connections += 1;

        tracing::info!(connection_id = %connection_id, version = %version, "connection started");
    }

    /// Record the end of a connection. Unknown ids are ignored.
    pub fn track_connection_ended(&self, connection_id: Uuid) {
        let now = Utc::now();
        let mut state = self.lock();
        let Some(metrics) = state.connections.remove(&connection_id) else {
            return;
        };

        let duration = (now - metrics.connected_at).num_milliseconds() as f64 / 1000.0;

        if let Some(protocol) = state.protocols.get_mut(&metrics.protocol_version) {
            protocol.active_connections = protocol.active_connections.saturating_sub(1);
            // Running mean over the lifetime total.
            let total = protocol.total_connections as f64;
            protocol.avg_connection_duration =
                (protocol.avg_connection_duration * (total - 1.0) + duration) / total;
        }

        if state.history.len() == HISTORY_LIMIT {
            state.history.pop_front();
        }
        state.history.push_back(ConnectionHistoryEntry {
            connection_id,
            protocol_version: metrics.protocol_version,
            duration_seconds: duration,
            message_count: metrics.message_count,
            errors: metrics.errors,
            ended_at: now,
        });

        tracing::info!(connection_id = %connection_id, duration_seconds = duration, "connection ended");
    }

    /// Record one message in either direction.
    pub fn track_message(
        &self,
        connection_id: Uuid,
        message_type: &str,
        size_bytes: usize,
        direction: MessageDirection,
    ) {
        let mut state = self.lock();
        let Some(metrics) = state.connections.get_mut(&connection_id) else {
            return;
        };
        metrics.message_count += 1;
        metrics.last_activity = Utc::now();
        match direction {
            MessageDirection::Inbound => metrics.bytes_received += size_bytes as u64,
            MessageDirection::Outbound => metrics.bytes_sent += size_bytes as u64,
        }

        let version = metrics.protocol_version.clone();
        if let Some(protocol) = state.protocols.get_mut(&version) {
            protocol.total_messages += 1;
        }
        tracing::trace!(connection_id = %connection_id, message_type, size_bytes, "message tracked");
    }

    /// Record a tool call outcome for a specific connection.
    pub fn track_tool_call(
        &self,
        connection_id: Uuid,
        tool: &str,
        execution: Duration,
        success: bool,
        error_type: Option<&str>,
    ) {
        let execution_secs = execution.as_secs_f64();
        let mut state = self.lock();

        if let Some(metrics) = state.connections.get_mut(&connection_id) {
            *metrics.tool_calls.entry(tool.to_string()).or_insert(0) += 1;
            if !success {
                metrics.errors += 1;
            }
        }

        state
            .tools
            .entry(tool.to_string())
            .or_insert_with(|| ToolMetrics::new(tool))
            .record(execution_secs, success, error_type);
    }

    /// Record a failed handshake attempt.
    pub fn track_handshake_failure(&self, version: &str, reason: &str) {
        let mut state = self.lock();
        state
            .protocols
            .entry(version.to_string())
            .or_insert_with(|| ProtocolMetrics::new(version))
            .handshake_failures += 1;
        tracing::warn!(version, reason, "handshake failure");
    }

    /// Record a failed negotiation.
    ///
    /// The failure is not attributable to any single version, so every
    /// known version's counter is incremented.
    pub fn track_negotiation_failure(&self, client_versions: &[String], reason: &str) {
        let mut state = self.lock();
        for protocol in state.protocols.values_mut() {
            protocol.negotiation_failures += 1;
        }
        tracing::warn!(?client_versions, reason, "negotiation failure");
    }

    /// Compute the current health classification.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let now = Utc::now();
        let state = self.lock();
        let mut issues = Vec::new();

        let active: u64 = state
            .protocols
            .values()
            .map(|p| p.active_connections)
            .sum();
        if active as f64 > state.thresholds.max_connections {
            issues.push(HealthIssue {
                kind: "high_connection_count".to_string(),
                severity: IssueSeverity::Warning,
                message: format!("high connection count: {active}"),
            });
        }

        for (tool, metrics) in &state.tools {
            if metrics.total_calls > 0 {
                let error_rate = metrics.failed_calls as f64 / metrics.total_calls as f64;
                if error_rate > state.thresholds.max_error_rate {
                    issues.push(HealthIssue {
                        kind: "high_error_rate".to_string(),
                        severity: IssueSeverity::Critical,
                        message: format!("high error rate for {tool}: {:.1}%", error_rate * 100.0),
                    });
                }
            }
            if metrics.avg_execution_time > state.thresholds.max_response_time {
                issues.push(HealthIssue {
                    kind: "slow_response".to_string(),
                    severity: IssueSeverity::Warning,
                    message: format!(
                        "slow response time for {tool}: {:.2}s",
                        metrics.avg_execution_time
                    ),
                });
            }
        }

        let stale = state
            .connections
            .values()
            .filter(|c| {
                (now - c.last_activity).num_milliseconds() as f64 / 1000.0
                    > state.thresholds.connection_timeout
            })
            .count();
        if stale > 0 {
            issues.push(HealthIssue {
                kind: "stale_connections".to_string(),
                severity: IssueSeverity::Info,
                message: format!("stale connections detected: {stale}"),
            });
        }

        let status = if issues.iter().any(|i| i.severity == IssueSeverity::Critical) {
            HealthStatus::Unhealthy
        } else if issues.iter().any(|i| i.severity == IssueSeverity::Warning) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            timestamp: now,
            active_connections: active,
            issues,
        }
    }

    /// Snapshot of all aggregates.
    #[must_use]
    pub fn summary(&self) -> MonitorSummary {
        let now = Utc::now();
        let state = self.lock();

        let tools: HashMap<String, ToolSummary> = state
            .tools
            .iter()
            .map(|(name, m)| {
                (
                    name.clone(),
                    ToolSummary {
                        total_calls: m.total_calls,
                        success_rate: m.success_rate(),
                        avg_execution_time: m.avg_execution_time,
                        error_types: m.error_types.clone(),
                    },
                )
            })
            .collect();

        let total_calls: u64 = state.tools.values().map(|m| m.total_calls).sum();
        let total_failures: u64 = state.tools.values().map(|m| m.failed_calls).sum();
        let error_rate = if total_calls == 0 {
            0.0
        } else {
            total_failures as f64 / total_calls as f64
        };

        let total_messages: u64 = state.protocols.values().map(|p| p.total_messages).sum();
        let throughput = state
            .connections
            .values()
            .map(|c| c.connected_at)
            .min()
            .map_or(0.0, |earliest| {
                let elapsed = (now - earliest).num_milliseconds() as f64 / 1000.0;
                if elapsed > 0.0 {
                    total_messages as f64 / elapsed
                } else {
                    0.0
                }
            });

        MonitorSummary {
            timestamp: now,
            active_connections: state.connections.len() as u64,
            total_connections: state.protocols.values().map(|p| p.total_connections).sum(),
            connections_by_version: state
                .protocols
                .iter()
                .map(|(v, p)| (v.clone(), p.active_connections))
                .collect(),
            tools,
            protocols: state.protocols.clone(),
            error_rate,
            throughput_per_second: throughput,
        }
    }

    /// Current snapshot for one connection, or `None`.
    #[must_use]
    pub fn connection_details(&self, connection_id: Uuid) -> Option<ConnectionDetails> {
        let state = self.lock();
        let metrics = state.connections.get(&connection_id)?.clone();
        let duration = (Utc::now() - metrics.connected_at).num_milliseconds() as f64 / 1000.0;
        Some(ConnectionDetails {
            metrics,
            duration_seconds: duration,
        })
    }

    /// Update an alert threshold. Unknown names are rejected.
    pub fn set_alert_threshold(&self, name: &str, value: f64) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        match name {
            "max_connections" => state.thresholds.max_connections = value,
            "max_error_rate" => state.thresholds.max_error_rate = value,
            "max_response_time" => state.thresholds.max_response_time = value,
            "connection_timeout" => state.thresholds.connection_timeout = value,
            other => {
                return Err(ProtocolError::invalid_argument(format!(
                    "unknown alert threshold: {other}"
                )));
            }
        }
        tracing::info!(threshold = name, value, "alert threshold updated");
        Ok(())
    }

    /// The current alert thresholds.
    #[must_use]
    pub fn thresholds(&self) -> AlertThresholds {
        self.lock().thresholds.clone()
    }

    /// Drop history entries older than the retention window.
    pub fn cleanup_old_data(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut state = self.lock();
        let before = state.history.len();
        state.history.retain(|entry| entry.ended_at > cutoff);
        let dropped = before - state.history.len();
        if dropped > 0 {
            tracing::info!(dropped, "old monitoring data cleaned up");
        }
    }

    /// Number of retained history entries.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version(s: &str) -> ProtocolVersion {
        ProtocolVersion::new(s)
    }

    #[test]
    fn start_then_end_restores_active_count() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();

        monitor.track_connection_started(id, &version("1.0"), json!({"name": "cli"}));
        let summary = monitor.summary();
        assert_eq!(summary.active_connections, 1);
        assert_eq!(summary.connections_by_version["1.0"], 1);

        monitor.track_connection_ended(id);
        let summary = monitor.summary();
        assert_eq!(summary.active_connections, 0);
        assert_eq!(summary.connections_by_version["1.0"], 0);
        assert_eq!(summary.total_connections, 1);
        assert_eq!(monitor.history_len(), 1);
    }

    #[test]
    fn ending_an_unknown_connection_is_a_no_op() {
        let monitor = Monitor::new();
        monitor.track_connection_ended(Uuid::new_v4());
        assert_eq!(monitor.summary().active_connections, 0);
        assert_eq!(monitor.history_len(), 0);
    }

    #[test]
    fn tool_call_conservation() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();
        monitor.track_connection_started(id, &version("1.0"), json!({}));

        monitor.track_tool_call(id, "rag_search", Duration::from_millis(10), true, None);
        monitor.track_tool_call(
            id,
            "rag_search",
            Duration::from_millis(20),
            false,
            Some("InvalidArgument"),
        );

        let summary = monitor.summary();
        let tool = &summary.tools["rag_search"];
        assert_eq!(tool.total_calls, 2);
        assert_eq!(tool.success_rate, 0.5);
        assert_eq!(tool.error_types["InvalidArgument"], 1);
        assert_eq!(summary.error_rate, 0.5);

        let details = monitor.connection_details(id).unwrap();
        assert_eq!(details.metrics.tool_calls["rag_search"], 2);
        assert_eq!(details.metrics.errors, 1);
    }

    #[test]
    fn rolling_window_is_bounded_and_min_max_are_all_time() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();

        // One slow call, then enough fast calls to evict it from the window.
        monitor.track_tool_call(id, "rag_search", Duration::from_secs(10), true, None);
        for _ in 0..LATENCY_WINDOW {
            monitor.track_tool_call(id, "rag_search", Duration::from_millis(10), true, None);
        }

        let state = monitor.lock();
        let tool = &state.tools["rag_search"];
        assert_eq!(tool.recent.len(), LATENCY_WINDOW);
        // The slow call left the window, so the average is fast again
        assert!(tool.avg_execution_time < 0.02);
        // ...but min/max are all-time
        assert_eq!(tool.max_execution_time, 10.0);
        assert!((tool.min_execution_time - 0.01).abs() < 1e-9);
    }

    #[test]
    fn message_tracking_updates_bytes_by_direction() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();
        monitor.track_connection_started(id, &version("1.0"), json!({}));

        monitor.track_message(id, "tool_call", 120, MessageDirection::Inbound);
        monitor.track_message(id, "tool_response", 450, MessageDirection::Outbound);

        let details = monitor.connection_details(id).unwrap();
        assert_eq!(details.metrics.message_count, 2);
        assert_eq!(details.metrics.bytes_received, 120);
        assert_eq!(details.metrics.bytes_sent, 450);

        let summary = monitor.summary();
        assert_eq!(summary.protocols["1.0"].total_messages, 2);
    }

    #[test]
    fn health_ladder() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();
        assert_eq!(monitor.health().status, HealthStatus::Healthy);

        // Warning: slow tool
        monitor.track_tool_call(id, "rag_summarize", Duration::from_secs(60), true, None);
        assert_eq!(monitor.health().status, HealthStatus::Degraded);

        // Critical: failing tool dominates
        monitor.track_tool_call(
            id,
            "rag_search",
            Duration::from_millis(5),
            false,
            Some("ToolExecution"),
        );
        let report = monitor.health();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.issues.iter().any(|i| i.kind == "high_error_rate"));
    }

    #[test]
    fn stale_connections_are_info_only() {
        let monitor = Monitor::new();
        let id = Uuid::new_v4();
        monitor.track_connection_started(id, &version("1.0"), json!({}));
        monitor.set_alert_threshold("connection_timeout", 0.0).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        let report = monitor.health();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.iter().any(|i| i.kind == "stale_connections"));
    }

    #[test]
    fn unknown_threshold_is_rejected() {
        let monitor = Monitor::new();
        assert!(monitor.set_alert_threshold("max_connections", 10.0).is_ok());
        assert_eq!(monitor.thresholds().max_connections, 10.0);
        assert!(monitor.set_alert_threshold("max_latency", 1.0).is_err());
    }

    #[test]
    fn negotiation_failures_hit_every_known_version() {
        let monitor = Monitor::new();
        monitor.track_connection_started(Uuid::new_v4(), &version("1.0"), json!({}));
        monitor.track_connection_started(Uuid::new_v4(), &version("1.1"), json!({}));

        monitor.track_negotiation_failure(&["2.0".to_string()], "no compatible version");

        let summary = monitor.summary();
        assert_eq!(summary.protocols["1.0"].negotiation_failures, 1);
        assert_eq!(summary.protocols["1.1"].negotiation_failures, 1);
    }

    #[test]
    fn handshake_failures_are_lazy_per_version() {
        let monitor = Monitor::new();
        monitor.track_handshake_failure("unknown", "first message was not hello");
        assert_eq!(monitor.summary().protocols["unknown"].handshake_failures, 1);
    }

    #[test]
    fn cleanup_drops_entries_past_retention() {
        let monitor = Monitor::with_retention_hours(0);
        let id = Uuid::new_v4();
        monitor.track_connection_started(id, &version("1.0"), json!({}));
        monitor.track_connection_ended(id);
        assert_eq!(monitor.history_len(), 1);

        std::thread::sleep(Duration::from_millis(10));
        monitor.cleanup_old_data();
        assert_eq!(monitor.history_len(), 0);
    }

    #[test]
    fn avg_connection_duration_is_a_running_mean() {
        let monitor = Monitor::new();
        for _ in 0..3 {
            let id = Uuid::new_v4();
            monitor.track_connection_started(id, &version("1.0"), json!({}));
            monitor.track_connection_ended(id);
        }
        let protocols = monitor.summary().protocols;
        let metrics = &protocols["1.0"];
        assert_eq!(metrics.total_connections, 3);
        assert!(metrics.avg_connection_duration >= 0.0);
    }
}
