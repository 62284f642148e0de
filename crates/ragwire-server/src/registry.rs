//! The protocol version registry.
//!
//! Authoritative map from version to adapter, plus the directed
//! compatibility relation between server and client versions. Populated
//! at startup and read-only afterwards, so the read path takes no lock.

use std::collections::HashMap;
use std::sync::Arc;

use ragwire_core::adapter::ToolAdapter;
use ragwire_core::error::ProtocolError;
use ragwire_core::version::ProtocolVersion;

/// Registry of version-specific adapters and compatibility edges.
#[derive(Default)]
pub struct VersionRegistry {
    adapters: HashMap<ProtocolVersion, Arc<dyn ToolAdapter>>,
    // server_version -> client_version -> compatible
    compatibility: HashMap<ProtocolVersion, HashMap<ProtocolVersion, bool>>,
}

impl VersionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own version.
    ///
    /// Replacing an existing entry is forbidden.
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) -> Result<(), ProtocolError> {
        let version = adapter.version();
        if self.adapters.contains_key(&version) {
            return Err(ProtocolError::DuplicateVersion(version));
        }
        tracing::debug!(version = %version, tools = adapter.tools().len(), "adapter registered");
        self.adapters.insert(version, adapter);
        Ok(())
    }

    /// Look up the adapter for a version.
    #[must_use]
    pub fn get(&self, version: &ProtocolVersion) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(version).cloned()
    }

    /// Whether a version has a registered adapter.
    #[must_use]
    pub fn contains(&self, version: &ProtocolVersion) -> bool {
        self.adapters.contains_key(version)
    }

    /// Registered versions, ascending by version order.
    ///
    /// The order is deterministic across runs; insertion order plays no
    /// part in it.
    #[must_use]
    pub fn versions(&self) -> Vec<ProtocolVersion> {
        let mut versions: Vec<ProtocolVersion> = self.adapters.keys().cloned().collect();
        versions.sort();
        versions
    }

    /// Registered versions as strings, ascending by version order.
    #[must_use]
    pub fn version_strings(&self) -> Vec<String> {
        self.versions()
            .into_iter()
            .map(|v| v.as_str().to_string())
            .collect()
    }

    /// Record one directed compatibility edge.
    pub fn set_compatibility(
        &mut self,
        server_version: ProtocolVersion,
        client_version: ProtocolVersion,
        compatible: bool,
    ) {
        self.compatibility
            .entry(server_version)
            .or_default()
            .insert(client_version, compatible);
    }

    /// Whether a server version can serve a client version.
    ///
    /// Defaults to false when no edge exists; an exact match of two
    /// registered versions is implicitly compatible.
    #[must_use]
    pub fn compatible(
        &self,
        server_version: &ProtocolVersion,
        client_version: &ProtocolVersion,
    ) -> bool {
        if let Some(edge) = self
            .compatibility
            .get(server_version)
            .and_then(|edges| edges.get(client_version))
        {
            return *edge;
        }
        server_version == client_version && self.contains(server_version)
    }

    /// Find the best server version for the given client versions.
    ///
    /// Exact intersection wins (maximum by version order); otherwise the
    /// maximum server version with a compatibility edge to some client
    /// version; otherwise `None`.
    #[must_use]
    pub fn find_best(&self, client_versions: &[ProtocolVersion]) -> Option<ProtocolVersion> {
        let exact = client_versions
            .iter()
            .filter(|v| self.contains(v))
            .max()
            .cloned();
        if exact.is_some() {
            return exact;
        }

        self.versions()
            .into_iter()
            .rev()
            .find(|server| client_versions.iter().any(|c| self.compatible(server, c)))
    }

    /// Client versions a server version is declared compatible with.
    ///
    /// Only explicit `true` edges are listed, ascending by version order.
    #[must_use]
    pub fn compatible_clients(&self, server_version: &ProtocolVersion) -> Vec<ProtocolVersion> {
        let mut clients: Vec<ProtocolVersion> = self
            .compatibility
            .get(server_version)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(_, compatible)| **compatible)
                    .map(|(client, _)| client.clone())
                    .collect()
            })
            .unwrap_or_default();
        clients.sort();
        clients
    }

    /// Shallow copy of the compatibility matrix, keyed by version string.
    #[must_use]
    pub fn compatibility_matrix(&self) -> HashMap<String, HashMap<String, bool>> {
        self.compatibility
            .iter()
            .map(|(server, edges)| {
                (
                    server.as_str().to_string(),
                    edges
                        .iter()
                        .map(|(client, compatible)| (client.as_str().to_string(), *compatible))
                        .collect(),
                )
            })
            .collect()
    }
}
