//! Client capability documents and peer info records.
//!
//! A client's `hello` carries a free-form JSON capability document. Rather
//! than forcing one schema, the extraction rules accept every shape real
//! clients send, checked in a fixed precedence order:
//!
//! 1. `protocolVersion`: single preferred version,
//! 2. `supportedVersions`: array of versions,
//! 3. `versions`: array of versions,
//! 4. `version`: legacy single-version field,
//! 5. none of the above: default `"1.0"`.
//!
//! Features/required tools are collected from `features`, `tools`, and
//! `capabilities` (array elements or object keys).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::ProtocolVersion;

/// A client's declared capabilities, as received in its `hello`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientCapabilities {
    raw: Value,
}

impl ClientCapabilities {
    /// Wrap a raw capability document.
    #[must_use]
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// The raw capability document.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Versions the client declared, in the order the client listed them.
    ///
    /// Falls back to `"1.0"` when the document names no version at all.
    #[must_use]
    pub fn declared_versions(&self) -> Vec<ProtocolVersion> {
        if let Some(v) = self.raw.get("protocolVersion").and_then(Value::as_str) {
            return vec![ProtocolVersion::new(v)];
        }
        for key in ["supportedVersions", "versions"] {
            if let Some(list) = self.raw.get(key).and_then(Value::as_array) {
                let versions: Vec<ProtocolVersion> = list
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ProtocolVersion::new)
                    .collect();
                if !versions.is_empty() {
                    return versions;
                }
            }
        }
        if let Some(v) = self.raw.get("version").and_then(Value::as_str) {
            return vec![ProtocolVersion::new(v)];
        }
        vec![ProtocolVersion::default_version()]
    }

    /// Whether the document names any version explicitly.
    #[must_use]
    pub fn has_declared_version(&self) -> bool {
        ["protocolVersion", "supportedVersions", "versions", "version"]
            .iter()
            .any(|key| self.raw.get(key).is_some())
    }

    /// Features and required tools the client declared.
    #[must_use]
    pub fn features(&self) -> BTreeSet<String> {
        let mut features = BTreeSet::new();
        for key in ["features", "tools"] {
            if let Some(list) = self.raw.get(key).and_then(Value::as_array) {
                features.extend(list.iter().filter_map(Value::as_str).map(String::from));
            }
        }
        match self.raw.get("capabilities") {
            Some(Value::Array(list)) => {
                features.extend(list.iter().filter_map(Value::as_str).map(String::from));
            }
            Some(Value::Object(map)) => {
                features.extend(map.keys().cloned());
            }
            _ => {}
        }
        features
    }
}

/// Identity of the server, advertised in the server `hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Human-readable server name.
    pub name: String,
    /// Server software version (not the protocol version).
    pub version: String,
    /// One-line description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServerInfo {
    /// Create a server info record.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(value: Value) -> ClientCapabilities {
        ClientCapabilities::new(value)
    }

    #[test]
    fn preferred_version_field_wins() {
        let c = caps(json!({
            "protocolVersion": "1.1",
            "supportedVersions": ["1.0"],
        }));
        let versions = c.declared_versions();
        assert_eq!(versions, vec![ProtocolVersion::new("1.1")]);
    }

    #[test]
    fn supported_versions_preserve_client_order() {
        let c = caps(json!({"supportedVersions": ["1.1", "1.0", "0.9"]}));
        let declared = c.declared_versions();
        let versions: Vec<&str> = declared.iter().map(|v| v.as_str()).collect();
        assert_eq!(versions, vec!["1.1", "1.0", "0.9"]);
    }

    #[test]
    fn legacy_version_field() {
        let c = caps(json!({"version": "0.9"}));
        assert_eq!(c.declared_versions(), vec![ProtocolVersion::new("0.9")]);
    }

    #[test]
    fn defaults_when_nothing_declared() {
        let c = caps(json!({}));
        assert_eq!(c.declared_versions(), vec![ProtocolVersion::new("1.0")]);
        assert!(!c.has_declared_version());
    }

    #[test]
    fn features_union_across_fields() {
        let c = caps(json!({
            "features": ["streaming"],
            "tools": ["rag_search"],
            "capabilities": {"progress_tracking": true},
        }));
        let features = c.features();
        assert!(features.contains("streaming"));
        assert!(features.contains("rag_search"));
        assert!(features.contains("progress_tracking"));
    }

    #[test]
    fn capabilities_array_form() {
        let c = caps(json!({"capabilities": ["error_handling"]}));
        assert!(c.features().contains("error_handling"));
    }

    #[test]
    fn empty_features_for_bare_document() {
        let c = caps(json!({"protocolVersion": "1.0"}));
        assert!(c.features().is_empty());
    }
}
