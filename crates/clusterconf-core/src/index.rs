//! Schema identity keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version whose lookup misses fall back to [`STABLE_VERSION`]
pub const ALPHA_VERSION: &str = "v1alpha1";

pub const STABLE_VERSION: &str = "v1";

/// Identity key `(kind, apiVersion)` used to locate a compiled schema
///
/// Several documents may share one index; it names a schema, not an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaIndex {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub version: String,
}

impl SchemaIndex {
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
        }
    }

    /// Both kind and apiVersion are present
    pub fn is_valid(&self) -> bool {
        !self.kind.is_empty() && !self.version.is_empty()
    }

    /// API group part of the apiVersion (empty for core kinds like `v1`)
    pub fn group(&self) -> &str {
        self.version
            .rsplit_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// Version part of the apiVersion without the group
    pub fn version_only(&self) -> &str {
        self.version
            .rsplit_once('/')
            .map(|(_, version)| version)
            .unwrap_or(&self.version)
    }

    /// Index to retry with when an exact lookup misses
    ///
    /// Only `v1alpha1` falls back (to `v1` of the same kind and group).
    pub fn fallback(&self) -> Option<SchemaIndex> {
        if self.version_only() != ALPHA_VERSION {
            return None;
        }

        let version = match self.group() {
            "" => STABLE_VERSION.to_string(),
            group => format!("{group}/{STABLE_VERSION}"),
        };
        Some(Self::new(self.kind.clone(), version))
    }
}

impl fmt::Display for SchemaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.version)
    }
}
