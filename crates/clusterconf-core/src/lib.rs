//! clusterconf core - configuration safety for Kubernetes cluster lifecycle tooling
//!
//! This crate provides:
//! - `SchemaStore`: compiled, versioned schemas with defaulting validation
//! - `document`: multi-document stream splitting and kind classification
//! - `MetaConfig`: the typed aggregate of a configuration stream
//! - `RuleKind`: named change-safety rules referenced from schemas
//! - `ChangeValidator`: phase-gated comparison of old and new configuration

pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod meta;
pub mod phase;
pub mod policy;
pub mod prepare;
pub mod rules;
pub mod schema;
pub mod store;

pub use config::StoreConfig;
pub use document::{Document, DocumentClass};
pub use error::{CoreError, DocumentViolations, ErrorKind, ValidationErrorInfo, ValidationErrors};
pub use index::SchemaIndex;
pub use meta::{MetaConfig, ModuleConfig};
pub use phase::OperationPhase;
pub use policy::{ChangeValidator, validate_cluster_settings_changes};
pub use prepare::{NoopPreparator, PreparatorRegistry, ProviderPreparator};
pub use rules::{RuleKind, RuleViolation};
pub use schema::{PropertyNode, Schema, SchemaExtensions, ValidationResult};
pub use store::{SchemaStore, SharedStore};
