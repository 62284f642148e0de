//! Protocol version negotiation.
//!
//! Given a client's capability document, choose the server version to
//! speak, or fail. The priority order:
//!
//! 1. exact version match: highest priority, maximum by version order;
//! 2. a compatible version, newest server version first, provided the
//!    adapter can serve every tool the client requires;
//! 3. fallback to the oldest server version for clients inside the
//!    server's version span;
//! 4. failure, reported with the full list of server versions.
//!
//! Exact match is preferred because clients may tie behavior to a
//! specific version; otherwise newest-first maximizes available features.
//! A client newer than every server version gets the failure report with
//! the supported list instead, so it can downgrade knowingly. Version
//! strings that do not parse as dotted numbers are incomparable and never
//! satisfy the fallback check.

use std::sync::Arc;

use ragwire_core::capability::ClientCapabilities;
use ragwire_core::error::ProtocolError;
use ragwire_core::message::{ProtocolInfo, ProtocolInfoFeatures};
use ragwire_core::version::ProtocolVersion;

use crate::registry::VersionRegistry;

/// Chooses a server version for each connecting client.
pub struct Negotiator {
    registry: Arc<VersionRegistry>,
}

impl Negotiator {
    /// Create a negotiator over a registry.
    #[must_use]
    pub fn new(registry: Arc<VersionRegistry>) -> Self {
        Self { registry }
    }

    /// Negotiate the protocol version for a client.
    pub fn negotiate(
        &self,
        capabilities: &ClientCapabilities,
    ) -> Result<ProtocolVersion, ProtocolError> {
        let client_versions = capabilities.declared_versions();
        let client_features = capabilities.features();
        let server_versions = self.registry.versions();

        tracing::debug!(
            client_versions = ?client_versions,
            server_versions = ?server_versions,
            "starting protocol negotiation"
        );

        // Step 1: exact matches, maximum by version order.
        if let Some(exact) = client_versions
            .iter()
            .filter(|v| self.registry.contains(v))
            .max()
        {
            tracing::info!(version = %exact, "exact version match");
            return Ok(exact.clone());
        }

        // Step 2: newest compatible server version that can serve every
        // tool the client requires.
        for server_version in server_versions.iter().rev() {
            for client_version in &client_versions {
                if self.registry.compatible(server_version, client_version)
                    && self.provides_features(server_version, &client_features)
                {
                    tracing::info!(version = %server_version, client = %client_version, "compatible version selected");
                    return Ok(server_version.clone());
                }
            }
        }

        // Step 3: fallback to the oldest server version for clients
        // inside the server's span. Unparsable client versions are
        // incomparable and never match; clients newer than every server
        // version fail below instead.
        if let (Some(oldest), Some(newest)) = (server_versions.first(), server_versions.last()) {
            let client_can_degrade = oldest.is_numeric()
                && client_versions
                    .iter()
                    .any(|c| c.is_numeric() && oldest <= c && c <= newest);
            if client_can_degrade {
                tracing::warn!(version = %oldest, "using fallback version");
                return Ok(oldest.clone());
            }
        }

        Err(ProtocolError::NegotiationFailed {
            client_versions: client_versions
                .iter()
                .map(|v| v.as_str().to_string())
                .collect(),
            supported_versions: self.registry.version_strings(),
        })
    }

    fn provides_features(
        &self,
        version: &ProtocolVersion,
        required: &std::collections::BTreeSet<String>,
    ) -> bool {
        if required.is_empty() {
            return true;
        }
        let Some(adapter) = self.registry.get(version) else {
            return false;
        };
        let tools = adapter.tools();
        required.iter().all(|f| tools.iter().any(|t| t == f))
    }

    /// Detailed information about a registered version.
    ///
    /// Returns `None` for unregistered versions.
    #[must_use]
    pub fn protocol_info(&self, version: &ProtocolVersion) -> Option<ProtocolInfo> {
        let adapter = self.registry.get(version)?;
        let compatible_with: Vec<String> = self
            .registry
            .compatible_clients(version)
            .into_iter()
            .map(|v| v.as_str().to_string())
            .collect();
        let supported_tools = adapter.tools();

        Some(ProtocolInfo {
            version: version.clone(),
            features: ProtocolInfoFeatures {
                tool_count: supported_tools.len(),
                backward_compatible: !compatible_with.is_empty(),
            },
            supported_tools,
            compatible_with,
        })
    }

    /// Shallow copy of the compatibility matrix for stats reporting.
    #[must_use]
    pub fn compatibility_matrix(
        &self,
    ) -> std::collections::HashMap<String, std::collections::HashMap<String, bool>> {
        self.registry.compatibility_matrix()
    }
}
