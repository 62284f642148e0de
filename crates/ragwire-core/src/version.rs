//! Protocol version strings and their ordering.
//!
//! Versions are opaque strings (`"1.0"`, `"1.1"`, `"2.0"`) registered at
//! startup, not compile-time constants, so this is a newtype over `String`
//! rather than a closed enum. The total order is defined by the
//! dotted-numeric key: `"1.0" < "1.1" < "1.10" < "2.0"`. Version strings
//! that do not parse as dotted numbers sort after every numeric version
//! and fall back to lexicographic comparison among themselves.
//!
//! # Example
//!
//! ```rust
//! use ragwire_core::version::ProtocolVersion;
//!
//! let v10 = ProtocolVersion::new("1.0");
//! let v12 = ProtocolVersion::new("1.2");
//! assert!(v10 < v12);
//! assert!(v10.is_numeric());
//! assert!(!ProtocolVersion::new("beta").is_numeric());
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque protocol version string with dotted-numeric ordering.
///
/// Serializes as a plain JSON string, matching the wire format
/// (`"protocol_version": "1.0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(String);

/// Sort key for a version string.
///
/// Numeric keys order by tuple comparison and always sort before
/// lexical keys, so `"2.0" < "beta"`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionKey {
    Numeric(Vec<u64>),
    Lexical(String),
}

impl ProtocolVersion {
    /// The version assumed when a client declares nothing.
    pub const DEFAULT: &'static str = "1.0";

    /// Wrap a version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The version assumed for clients that declare no version at all.
    #[must_use]
    pub fn default_version() -> Self {
        Self::new(Self::DEFAULT)
    }

    /// The raw version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this version parses as a dotted-numeric key.
    ///
    /// Non-numeric versions are incomparable for negotiation fallback
    /// purposes: a fallback check `oldest <= client` never matches a
    /// client version like `"beta"`.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self.key(), VersionKey::Numeric(_))
    }

    fn key(&self) -> VersionKey {
        let parts: Result<Vec<u64>, _> = self.0.split('.').map(str::parse).collect();
        match parts {
            Ok(nums) => VersionKey::Numeric(nums),
            Err(_) => VersionKey::Lexical(self.0.clone()),
        }
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = match (self.key(), other.key()) {
            (VersionKey::Numeric(a), VersionKey::Numeric(b)) => a.cmp(&b),
            (VersionKey::Numeric(_), VersionKey::Lexical(_)) => Ordering::Less,
            (VersionKey::Lexical(_), VersionKey::Numeric(_)) => Ordering::Greater,
            (VersionKey::Lexical(a), VersionKey::Lexical(b)) => a.cmp(&b),
        };
        // Keys can tie for distinct strings ("1.0" vs "1.00"); break the
        // tie on the raw string so Ord stays consistent with Eq.
        ordering.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProtocolVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProtocolVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ProtocolVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ordering() {
        assert!(ProtocolVersion::new("1.0") < ProtocolVersion::new("1.1"));
        assert!(ProtocolVersion::new("1.1") < ProtocolVersion::new("2.0"));
        assert!(ProtocolVersion::new("0.9") < ProtocolVersion::new("1.0"));
        // Tuple comparison, not string comparison
        assert!(ProtocolVersion::new("1.2") < ProtocolVersion::new("1.10"));
        assert!(ProtocolVersion::new("1.0") < ProtocolVersion::new("1.0.1"));
    }

    #[test]
    fn non_numeric_sorts_after_numeric() {
        assert!(ProtocolVersion::new("2.0") < ProtocolVersion::new("beta"));
        assert!(ProtocolVersion::new("alpha") < ProtocolVersion::new("beta"));
    }

    #[test]
    fn numeric_probe() {
        assert!(ProtocolVersion::new("1.0").is_numeric());
        assert!(ProtocolVersion::new("1.2.3").is_numeric());
        assert!(!ProtocolVersion::new("beta").is_numeric());
        assert!(!ProtocolVersion::new("1.0-rc1").is_numeric());
        assert!(!ProtocolVersion::new("").is_numeric());
    }

    #[test]
    fn ord_consistent_with_eq() {
        let a = ProtocolVersion::new("1.0");
        let b = ProtocolVersion::new("1.00");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn serde_transparent() {
        let v = ProtocolVersion::new("1.1");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.1\"");
        let parsed: ProtocolVersion = serde_json::from_str("\"1.1\"").unwrap();
        assert_eq!(parsed, v);
    }

    #[test]
    fn max_selection() {
        let mut versions = vec![
            ProtocolVersion::new("1.1"),
            ProtocolVersion::new("2.0"),
            ProtocolVersion::new("1.0"),
        ];
        versions.sort();
        assert_eq!(versions.last().unwrap().as_str(), "2.0");
    }
}
