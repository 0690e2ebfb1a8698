//! Multi-document splitting and document classification
//!
//! A configuration stream is a YAML (or JSON) text holding several documents
//! separated by `---` lines. Each document carries its own `kind` and
//! `apiVersion`, which decide where the document is routed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::index::SchemaIndex;

/// Document boundary marker used when joining documents
pub const DOCUMENT_SEPARATOR: &str = "---";

static SEPARATOR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*---[ \t]*\r?$").expect("separator pattern is valid"));

pub const MODULE_CONFIG_KIND: &str = "ModuleConfig";
pub const INIT_CONFIGURATION_KIND: &str = "InitConfiguration";
pub const CLUSTER_CONFIGURATION_KIND: &str = "ClusterConfiguration";
pub const STATIC_CLUSTER_CONFIGURATION_KIND: &str = "StaticClusterConfiguration";

/// Kinds ending with this suffix (other than the ones above) are provider configurations
pub const PROVIDER_CONFIGURATION_SUFFIX: &str = "ClusterConfiguration";

/// Configuration class of a document, derived from its kind alone
///
/// Everything except [`DocumentClass::Resource`] is a configuration class:
/// it is validated strictly and guarded against unsafe changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentClass {
    ModuleConfig,
    InitConfiguration,
    ClusterConfiguration,
    StaticClusterConfiguration,
    ProviderClusterConfiguration,
    /// Arbitrary cluster resource outside the configuration contract
    Resource,
}

impl DocumentClass {
    pub fn of(kind: &str) -> Self {
        match kind {
            MODULE_CONFIG_KIND => Self::ModuleConfig,
            INIT_CONFIGURATION_KIND => Self::InitConfiguration,
            CLUSTER_CONFIGURATION_KIND => Self::ClusterConfiguration,
            STATIC_CLUSTER_CONFIGURATION_KIND => Self::StaticClusterConfiguration,
            k if k.ends_with(PROVIDER_CONFIGURATION_SUFFIX) => Self::ProviderClusterConfiguration,
            _ => Self::Resource,
        }
    }

    /// Whether documents of this class are subject to change-safety checks
    pub fn is_guarded(self) -> bool {
        !matches!(self, Self::Resource)
    }
}

#[derive(Deserialize)]
struct IndexProbe {
    #[serde(default)]
    kind: Option<serde_yaml::Value>,
    #[serde(default, rename = "apiVersion")]
    api_version: Option<serde_yaml::Value>,
}

/// One document of a configuration stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Zero-based position in the stream it was split from
    pub position: usize,
    /// Trimmed document text
    pub content: String,
}

impl Document {
    pub fn new(position: usize, content: impl Into<String>) -> Self {
        Self {
            position,
            content: content.into(),
        }
    }

    /// Read `kind` and `apiVersion`, rejecting documents where either is missing
    pub fn schema_index(&self) -> Result<SchemaIndex> {
        parse_index(&self.content).map_err(|e| e.at_position(self.position))
    }

    /// Decode the whole document into a JSON value tree
    pub fn decode(&self) -> Result<JsonValue> {
        serde_yaml::from_str(&self.content)
            .map_err(|e| CoreError::malformed(self.position, e.to_string(), &self.content))
    }

    /// `metadata.name` if present
    pub fn name(&self) -> Option<String> {
        let value: serde_yaml::Value = serde_yaml::from_str(&self.content).ok()?;
        value
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .map(String::from)
    }
}

/// Parse the schema index of a raw document
pub fn parse_index(content: &str) -> Result<SchemaIndex> {
    let probe: IndexProbe = serde_yaml::from_str(content)
        .map_err(|e| CoreError::malformed(0, e.to_string(), content))?;

    let as_string = |value: Option<serde_yaml::Value>| {
        value
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let index = SchemaIndex::new(as_string(probe.kind), as_string(probe.api_version));
    if !index.is_valid() {
        return Err(CoreError::malformed(
            0,
            "document must define both 'kind' and 'apiVersion'",
            content,
        ));
    }
    Ok(index)
}

/// Split a multi-document text, dropping empty documents
pub fn split(text: &str) -> Vec<Document> {
    SEPARATOR_LINE
        .split(text)
        .map(str::trim)
        .filter(|doc| !doc.is_empty())
        .enumerate()
        .map(|(position, doc)| Document::new(position, doc))
        .collect()
}

/// Join documents back into one stream
pub fn join(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join(&format!("\n{DOCUMENT_SEPARATOR}\n"))
}
