//! Schema descriptors and compiled schemas
//!
//! A descriptor file declares one kind and one OpenAPI spec per apiVersion:
//!
//! ```yaml
//! kind: ClusterConfiguration
//! apiVersions:
//!   - apiVersion: deckhouse.io/v1
//!     openAPISpec:
//!       type: object
//!       properties:
//!         podSubnetCIDR:
//!           type: string
//!           x-unsafe: true
//! ```
//!
//! Each spec is compiled once: internal `$ref`s are inlined, the structural
//! validator is built, and the property tree is decoded into [`PropertyNode`]s
//! carrying the `x-unsafe` and `x-unsafe-rules` extensions.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result, ValidationErrorInfo};
use crate::rules::RuleKind;

/// Marks a field immutable outside the bootstrap phase
pub const UNSAFE_EXTENSION: &str = "x-unsafe";

/// Lists named rules invoked when a field changes
pub const UNSAFE_RULES_EXTENSION: &str = "x-unsafe-rules";

/// Path shown for the document root
pub const ROOT_PATH: &str = "(root)";

const MAX_REF_DEPTH: usize = 32;

/// On-disk schema descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    pub kind: String,
    #[serde(default)]
    pub api_versions: Vec<VersionedSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionedSpec {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "openAPISpec")]
    pub open_api_spec: JsonValue,
}

impl SchemaDescriptor {
    /// Parse a descriptor, returning it together with the raw document
    ///
    /// The raw document is kept for resolving references that point outside
    /// of an `openAPISpec` block.
    pub fn parse(origin: &str, text: &str) -> Result<(Self, JsonValue)> {
        let document: JsonValue =
            serde_yaml::from_str(text).map_err(|e| CoreError::InvalidDescriptor {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;

        let descriptor: SchemaDescriptor =
            serde_json::from_value(document.clone()).map_err(|e| CoreError::InvalidDescriptor {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;

        if descriptor.kind.trim().is_empty() {
            return Err(CoreError::InvalidDescriptor {
                origin: origin.to_string(),
                message: "descriptor has an empty kind".to_string(),
            });
        }

        Ok((descriptor, document))
    }
}

/// Inline every `#/...` reference in `spec`
///
/// A reference is looked up in `spec` first, then in `document`. Keys next
/// to a `$ref` are laid over the resolved target.
pub fn resolve_refs(spec: &JsonValue, document: &JsonValue) -> std::result::Result<JsonValue, String> {
    resolve_value(spec, spec, document, 0)
}

fn resolve_value(
    value: &JsonValue,
    spec: &JsonValue,
    document: &JsonValue,
    depth: usize,
) -> std::result::Result<JsonValue, String> {
    match value {
        JsonValue::Object(map) => {
            let Some(reference) = map.get("$ref").and_then(JsonValue::as_str) else {
                let mut resolved = Map::with_capacity(map.len());
                for (key, child) in map {
                    resolved.insert(key.clone(), resolve_value(child, spec, document, depth)?);
                }
                return Ok(JsonValue::Object(resolved));
            };

            let Some(pointer) = reference.strip_prefix('#') else {
                return Err(format!("only internal references are supported, got '{reference}'"));
            };
            if depth >= MAX_REF_DEPTH {
                return Err(format!("reference '{reference}' nests deeper than {MAX_REF_DEPTH} levels"));
            }

            let target = spec
                .pointer(pointer)
                .or_else(|| document.pointer(pointer))
                .ok_or_else(|| format!("unresolved reference '{reference}'"))?;

            let mut resolved = resolve_value(target, spec, document, depth + 1)?;
            if let JsonValue::Object(target_map) = &mut resolved {
                for (key, child) in map {
                    if key != "$ref" {
                        target_map.insert(key.clone(), resolve_value(child, spec, document, depth)?);
                    }
                }
            }
            Ok(resolved)
        }
        JsonValue::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, spec, document, depth))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        other => Ok(other.clone()),
    }
}

/// Safety extensions declared on one property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaExtensions {
    /// `x-unsafe`
    pub immutable: bool,
    /// `x-unsafe-rules`
    pub rules: Vec<RuleKind>,
}

impl SchemaExtensions {
    pub fn is_empty(&self) -> bool {
        !self.immutable && self.rules.is_empty()
    }
}

/// Typed property tree compiled from an OpenAPI spec
#[derive(Debug, Clone, Default)]
pub struct PropertyNode {
    extensions: SchemaExtensions,
    properties: BTreeMap<String, PropertyNode>,
    /// This node or one of its descendants carries an extension
    guarded: bool,
}

impl PropertyNode {
    /// Compile the property tree of a ref-resolved spec
    pub fn compile(origin: &str, spec: &JsonValue) -> Result<Self> {
        Self::compile_at(origin, spec, &mut Vec::new())
    }

    fn compile_at(origin: &str, spec: &JsonValue, path: &mut Vec<String>) -> Result<Self> {
        let extensions = read_extensions(origin, spec, path)?;

        let mut properties = BTreeMap::new();
        if let Some(props) = spec.get("properties").and_then(JsonValue::as_object) {
            for (name, child) in props {
                path.push(name.clone());
                let node = Self::compile_at(origin, child, path)?;
                path.pop();
                properties.insert(name.clone(), node);
            }
        }

        let guarded = !extensions.is_empty() || properties.values().any(|p| p.guarded);
        Ok(Self {
            extensions,
            properties,
            guarded,
        })
    }

    pub fn extensions(&self) -> &SchemaExtensions {
        &self.extensions
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyNode> {
        &self.properties
    }

    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Get a nested property by dotted path (e.g. "masterNodeGroup.replicas")
    pub fn get_nested(&self, path: &str) -> Option<&PropertyNode> {
        let mut current = self;
        for part in path.split('.') {
            current = current.properties.get(part)?;
        }
        Some(current)
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        ROOT_PATH.to_string()
    } else {
        path.join(".")
    }
}

fn read_extensions(origin: &str, spec: &JsonValue, path: &[String]) -> Result<SchemaExtensions> {
    let invalid = |message: String| CoreError::InvalidDescriptor {
        origin: origin.to_string(),
        message,
    };

    let immutable = match spec.get(UNSAFE_EXTENSION) {
        None => false,
        Some(JsonValue::Bool(flag)) => *flag,
        Some(other) => {
            return Err(invalid(format!(
                "'{UNSAFE_EXTENSION}' at '{}' must be a boolean, got {other}",
                display_path(path)
            )));
        }
    };

    let names = match spec.get(UNSAFE_RULES_EXTENSION) {
        None => Vec::new(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    invalid(format!(
                        "'{UNSAFE_RULES_EXTENSION}' at '{}' must list strings, got {item}",
                        display_path(path)
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(invalid(format!(
                "'{UNSAFE_RULES_EXTENSION}' at '{}' must be a list, got {other}",
                display_path(path)
            )));
        }
    };

    let rules = names
        .into_iter()
        .map(|name| {
            name.parse::<RuleKind>().map_err(|_| CoreError::UnknownRule {
                origin: origin.to_string(),
                path: display_path(path),
                name: name.to_string(),
                suggestion: RuleKind::suggest(name),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SchemaExtensions { immutable, rules })
}

/// Result of structural validation
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationErrorInfo>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    pub fn failure(errors: Vec<ValidationErrorInfo>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

/// Compiled schema for one `(kind, apiVersion)`
pub struct Schema {
    origin: String,
    spec: JsonValue,
    validator: jsonschema::Validator,
    root: PropertyNode,
}

impl Schema {
    /// Compile a ref-resolved OpenAPI spec
    pub fn compile(origin: impl Into<String>, spec: JsonValue) -> Result<Self> {
        let origin = origin.into();

        let validator = jsonschema::options()
            .with_draft(jsonschema::Draft::Draft4)
            .build(&spec)
            .map_err(|e| CoreError::InvalidDescriptor {
                origin: origin.clone(),
                message: format!("invalid openAPISpec: {e}"),
            })?;

        let root = PropertyNode::compile(&origin, &spec)?;

        Ok(Self {
            origin,
            spec,
            validator,
            root,
        })
    }

    /// Resolve references against `document` and compile
    pub fn from_descriptor_spec(
        origin: impl Into<String>,
        spec: &JsonValue,
        document: &JsonValue,
    ) -> Result<Self> {
        let origin = origin.into();
        let resolved = resolve_refs(spec, document).map_err(|message| CoreError::InvalidDescriptor {
            origin: origin.clone(),
            message,
        })?;
        Self::compile(origin, resolved)
    }

    /// Where this schema came from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Ref-resolved spec
    pub fn spec(&self) -> &JsonValue {
        &self.spec
    }

    pub fn root(&self) -> &PropertyNode {
        &self.root
    }

    /// Validate a decoded document, collecting every violation
    pub fn validate(&self, value: &JsonValue) -> ValidationResult {
        if self.validator.is_valid(value) {
            return ValidationResult::success();
        }

        let errors = self
            .validator
            .iter_errors(value)
            .map(|e| {
                let path = e.instance_path.to_string();
                ValidationErrorInfo {
                    path: if path.is_empty() {
                        ROOT_PATH.to_string()
                    } else {
                        path
                    },
                    message: e.to_string().replace('"', "'"),
                }
            })
            .collect();

        ValidationResult::failure(errors)
    }

    /// Insert schema defaults for absent properties
    pub fn apply_defaults(&self, value: &mut JsonValue) {
        apply_defaults(&self.spec, value);
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("origin", &self.origin)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn apply_defaults(spec: &JsonValue, value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let Some(props) = spec.get("properties").and_then(JsonValue::as_object) else {
                return;
            };
            for (name, prop) in props {
                match map.get_mut(name) {
                    Some(child) => apply_defaults(prop, child),
                    None => {
                        if let Some(default) = prop.get("default") {
                            let mut inserted = default.clone();
                            apply_defaults(prop, &mut inserted);
                            map.insert(name.clone(), inserted);
                        }
                    }
                }
            }
        }
        JsonValue::Array(items) => {
            if let Some(item_spec) = spec.get("items").filter(|s| s.is_object()) {
                for item in items {
                    apply_defaults(item_spec, item);
                }
            }
        }
        _ => {}
    }
}
