//! Change safety policy
//!
//! Compares the configuration a cluster runs with against a proposed one.
//! Only guarded documents backed by a loaded schema take part; every other
//! document may change freely. For each guarded document the schema's
//! property tree is walked against both versions:
//!
//! - a property marked `x-unsafe` must keep its value
//! - a property listing `x-unsafe-rules` must pass every listed rule, even
//!   when its value did not change
//!
//! The first violation is returned.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::document::{self, DocumentClass};
use crate::error::{CoreError, Result};
use crate::index::SchemaIndex;
use crate::phase::OperationPhase;
use crate::schema::{PropertyNode, ROOT_PATH};
use crate::store::SchemaStore;

static NULL: JsonValue = JsonValue::Null;

/// Validates configuration changes against a schema store
#[derive(Debug, Clone, Copy)]
pub struct ChangeValidator<'a> {
    store: &'a SchemaStore,
}

impl<'a> ChangeValidator<'a> {
    pub fn new(store: &'a SchemaStore) -> Self {
        Self { store }
    }

    /// Check that moving from `old` to `new` is safe in `phase`
    pub fn compare(&self, phase: OperationPhase, old: &str, new: &str) -> Result<()> {
        if phase.bypasses_change_safety() {
            tracing::debug!(%phase, "phase bypasses change safety checks");
            return Ok(());
        }

        let old_docs = self.guarded_documents(old)?;
        let new_docs = self.guarded_documents(new)?;

        if old_docs.len() != new_docs.len() {
            return Err(CoreError::ConfigAmountChanged {
                old: old_docs.len(),
                new: new_docs.len(),
            });
        }

        for (index, new_value) in &new_docs {
            let old_value = old_docs
                .get(index)
                .ok_or_else(|| CoreError::AdditionalConfig {
                    index: index.clone(),
                })?;

            let schema = self.store.get(index).ok_or_else(|| CoreError::SchemaNotFound {
                index: index.clone(),
            })?;

            tracing::debug!(%index, "checking configuration changes");
            check_node(index, schema.root(), old_value, new_value, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Guarded, schema-backed documents keyed by index; the last one of an index wins
    fn guarded_documents(&self, text: &str) -> Result<BTreeMap<SchemaIndex, JsonValue>> {
        let mut documents = BTreeMap::new();

        for doc in document::split(text) {
            let index = doc.schema_index()?;
            if !DocumentClass::of(&index.kind).is_guarded() || !self.store.contains(&index) {
                tracing::debug!(position = doc.position, %index, "document is not guarded");
                continue;
            }

            let value = doc.decode()?;
            if documents.insert(index.clone(), value).is_some() {
                tracing::debug!(
                    %index,
                    name = doc.name().as_deref().unwrap_or_default(),
                    "several documents share an index, keeping the last one"
                );
            }
        }
        Ok(documents)
    }
}

/// Check the changes of a running cluster's configuration
pub fn validate_cluster_settings_changes(
    store: &SchemaStore,
    phase: OperationPhase,
    old: &str,
    new: &str,
) -> Result<()> {
    ChangeValidator::new(store).compare(phase, old, new)
}

fn check_node(
    index: &SchemaIndex,
    node: &PropertyNode,
    old: &JsonValue,
    new: &JsonValue,
    path: &mut Vec<String>,
) -> Result<()> {
    if !node.is_guarded() {
        return Ok(());
    }

    let extensions = node.extensions();
    if extensions.immutable && old != new {
        return Err(CoreError::UnsafeFieldChanged {
            index: index.clone(),
            path: field_path(path),
        });
    }

    for rule in &extensions.rules {
        rule.check(old, new)
            .map_err(|source| CoreError::ValidationRuleFailed {
                index: index.clone(),
                path: field_path(path),
                rule: *rule,
                source,
            })?;
    }

    for (name, child) in node.properties() {
        let old_child = old.get(name).unwrap_or(&NULL);
        let new_child = new.get(name).unwrap_or(&NULL);

        path.push(name.clone());
        check_node(index, child, old_child, new_child, path)?;
        path.pop();
    }
    Ok(())
}

fn field_path(path: &[String]) -> String {
    if path.is_empty() {
        ROOT_PATH.to_string()
    } else {
        path.join(".")
    }
}
