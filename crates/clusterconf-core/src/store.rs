//! Schema store
//!
//! Holds one compiled [`Schema`] per `(kind, apiVersion)` plus optional
//! per-module settings schemas. A store is populated once and read-only
//! afterwards; it is `Send + Sync` and can be shared by reference.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::document::parse_index;
use crate::error::{CoreError, DocumentViolations, Result, ValidationErrorInfo};
use crate::index::SchemaIndex;
use crate::schema::{ROOT_PATH, Schema, SchemaDescriptor};

/// Descriptor file extensions
const DESCRIPTOR_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Files with this prefix hold localized documentation, not descriptors
const DOC_FILE_PREFIX: &str = "doc-";

/// Location of a module's settings schema inside its directory
const MODULE_SCHEMA_PATH: &str = "openapi/config-values.yaml";

/// Ordering prefix of module directories (`020-common`)
static MODULE_ORDER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-").expect("module prefix pattern is valid"));

/// Compiled schemas keyed by index
#[derive(Debug, Default)]
pub struct SchemaStore {
    schemas: HashMap<SchemaIndex, Schema>,
    modules: BTreeMap<String, Schema>,
}

impl SchemaStore {
    /// Empty store, independent of every other store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every root named by `config`
    pub fn load(config: &StoreConfig) -> Result<Self> {
        let mut store = Self::new();
        for root in &config.schema_paths {
            store.load_descriptors(root)?;
        }
        for root in &config.module_paths {
            store.load_modules(root)?;
        }

        tracing::info!(
            schemas = store.schemas.len(),
            modules = store.modules.len(),
            "schema store loaded"
        );
        Ok(store)
    }

    /// Load descriptor roots only
    pub fn from_paths<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut store = Self::new();
        for root in paths {
            store.load_descriptors(root.as_ref())?;
        }
        Ok(store)
    }

    /// Walk `root` and compile every descriptor found
    ///
    /// Returns the number of schemas added. Two descriptors declaring the
    /// same `(kind, apiVersion)` are rejected.
    pub fn load_descriptors(&mut self, root: &Path) -> Result<usize> {
        let mut added = 0;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_descriptor_file(path) {
                continue;
            }

            tracing::debug!(path = %path.display(), "loading schema descriptor");
            let text = std::fs::read_to_string(path)?;
            added += self
                .insert_descriptor(&path.display().to_string(), &text, false)?
                .len();
        }

        tracing::info!(root = %root.display(), schemas = added, "loaded schema descriptors");
        Ok(added)
    }

    /// Compile and insert a descriptor given as text, replacing existing schemas
    ///
    /// Mutation requires `&mut self`: no reader can observe the store while
    /// an upload is in progress.
    pub fn upload_descriptor(&mut self, text: &str) -> Result<Vec<SchemaIndex>> {
        self.insert_descriptor("<upload>", text, true)
    }

    fn insert_descriptor(&mut self, origin: &str, text: &str, replace: bool) -> Result<Vec<SchemaIndex>> {
        let (descriptor, document) = SchemaDescriptor::parse(origin, text)?;

        let mut indexes = Vec::with_capacity(descriptor.api_versions.len());
        for version in &descriptor.api_versions {
            let index = SchemaIndex::new(descriptor.kind.trim(), version.api_version.trim());
            if !index.is_valid() {
                return Err(CoreError::InvalidDescriptor {
                    origin: origin.to_string(),
                    message: format!("kind {} declares an empty apiVersion", descriptor.kind),
                });
            }
            if !replace && self.schemas.contains_key(&index) {
                return Err(CoreError::InvalidDescriptor {
                    origin: origin.to_string(),
                    message: format!("duplicate schema for {index}"),
                });
            }

            let schema = Schema::from_descriptor_spec(
                format!("{index} ({origin})"),
                &version.open_api_spec,
                &document,
            )?;
            self.schemas.insert(index.clone(), schema);
            indexes.push(index);
        }
        Ok(indexes)
    }

    /// Load module settings schemas from `<root>/<NNN-name>/openapi/config-values.yaml`
    pub fn load_modules(&mut self, root: &Path) -> Result<usize> {
        let mut added = 0;

        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let schema_path = entry.path().join(MODULE_SCHEMA_PATH);
            if !schema_path.is_file() {
                continue;
            }

            let dir_name = entry.file_name().to_string_lossy();
            let name = MODULE_ORDER_PREFIX.replace(&dir_name, "").into_owned();
            let text = std::fs::read_to_string(&schema_path)?;
            self.upload_module_schema(&name, &text)?;
            added += 1;
        }

        tracing::info!(root = %root.display(), modules = added, "loaded module schemas");
        Ok(added)
    }

    /// Compile and insert the settings schema of one module
    pub fn upload_module_schema(&mut self, name: &str, text: &str) -> Result<()> {
        let origin = format!("module {name}");
        let spec: JsonValue = serde_yaml::from_str(text).map_err(|e| CoreError::InvalidDescriptor {
            origin: origin.clone(),
            message: e.to_string(),
        })?;

        let schema = Schema::from_descriptor_spec(origin, &spec, &spec)?;
        self.modules.insert(name.to_string(), schema);
        Ok(())
    }

    /// Look up a schema, falling back from `v1alpha1` to `v1`
    pub fn get(&self, index: &SchemaIndex) -> Option<&Schema> {
        self.schemas
            .get(index)
            .or_else(|| index.fallback().and_then(|fallback| self.schemas.get(&fallback)))
    }

    pub fn contains(&self, index: &SchemaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Registered indexes in sorted order
    pub fn indexes(&self) -> Vec<SchemaIndex> {
        let mut indexes: Vec<_> = self.schemas.keys().cloned().collect();
        indexes.sort();
        indexes
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Validate a raw document, rewriting it into its normalized form
    pub fn validate(&self, document: &mut String) -> Result<SchemaIndex> {
        let index = parse_index(document)?;
        self.validate_with_index(&index, document)?;
        Ok(index)
    }

    /// Validate a raw document against the schema registered for `index`
    ///
    /// On success schema defaults are merged in and `document` is replaced
    /// with the normalized JSON text. On failure `document` is untouched.
    pub fn validate_with_index(&self, index: &SchemaIndex, document: &mut String) -> Result<()> {
        let schema = self.get(index).ok_or_else(|| CoreError::SchemaNotFound {
            index: index.clone(),
        })?;

        let mut value: JsonValue = serde_yaml::from_str(document)
            .map_err(|e| CoreError::malformed(0, e.to_string(), document))?;

        let result = schema.validate(&value);
        if !result.is_valid {
            let name = value
                .pointer("/metadata/name")
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            return Err(CoreError::StructuralValidationFailed(
                DocumentViolations::new(index, name, &result.errors).into(),
            ));
        }

        schema.apply_defaults(&mut value);
        *document = serde_json::to_string(&value)?;
        Ok(())
    }

    /// Whether any module settings schema is loaded
    pub fn has_module_catalog(&self) -> bool {
        !self.modules.is_empty()
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Validate and default the settings of module `name`
    ///
    /// Modules without a settings schema accept anything. Violations are
    /// reported against the owning `ModuleConfig` document.
    pub fn validate_module_settings(
        &self,
        index: &SchemaIndex,
        name: &str,
        settings: &mut JsonValue,
    ) -> Result<()> {
        let Some(schema) = self.modules.get(name) else {
            return Ok(());
        };

        let result = schema.validate(settings);
        if !result.is_valid {
            let errors: Vec<ValidationErrorInfo> = result
                .errors
                .into_iter()
                .map(|e| ValidationErrorInfo {
                    path: if e.path == ROOT_PATH {
                        "/spec/settings".to_string()
                    } else {
                        format!("/spec/settings{}", e.path)
                    },
                    message: e.message,
                })
                .collect();
            return Err(CoreError::StructuralValidationFailed(
                DocumentViolations::new(index, name, &errors).into(),
            ));
        }

        schema.apply_defaults(settings);
        Ok(())
    }
}

fn is_descriptor_file(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DESCRIPTOR_EXTENSIONS.contains(&e));
    let is_doc = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(DOC_FILE_PREFIX));
    has_extension && !is_doc
}

/// Store loaded at most once, on first use
///
/// Concurrent first callers block until the single load finishes and then
/// all observe the same instance.
#[derive(Debug)]
pub struct SharedStore {
    config: StoreConfig,
    cell: OnceCell<SchemaStore>,
}

impl SharedStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Loaded store, loading it on the first call
    ///
    /// A failed load is not cached; the next call tries again.
    pub fn get(&self) -> Result<&SchemaStore> {
        self.cell.get_or_try_init(|| SchemaStore::load(&self.config))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
