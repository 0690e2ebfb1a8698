//! Core error types
//!
//! Every failure the core can report is a variant of [`CoreError`]. Callers
//! branch on [`CoreError::kind`], never on the rendered message.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::index::SchemaIndex;
use crate::rules::{RuleKind, RuleViolation};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("malformed document #{position}: {reason}\n{excerpt}")]
    MalformedDocument {
        position: usize,
        reason: String,
        excerpt: String,
    },

    #[error("schema not found for {index}")]
    SchemaNotFound { index: SchemaIndex },

    #[error("{0}")]
    StructuralValidationFailed(ValidationErrors),

    #[error("the number of configuration documents has changed ({old} -> {new})")]
    ConfigAmountChanged { old: usize, new: usize },

    #[error("cannot add additional configuration file {index}")]
    AdditionalConfig { index: SchemaIndex },

    #[error("unsafe change of field '{path}' in {index}")]
    UnsafeFieldChanged { index: SchemaIndex, path: String },

    #[error("rule '{rule}' rejected the change of field '{path}' in {index}: {source}")]
    ValidationRuleFailed {
        index: SchemaIndex,
        path: String,
        rule: RuleKind,
        source: RuleViolation,
    },

    #[error("unknown rule '{name}' at '{path}' in {origin}{}", suggestion_hint(.suggestion))]
    UnknownRule {
        origin: String,
        path: String,
        name: String,
        suggestion: Option<&'static str>,
    },

    #[error("invalid schema descriptor {origin}: {message}")]
    InvalidDescriptor { origin: String, message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

fn suggestion_hint(suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Closed set of error categories, stable across message changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedDocument,
    SchemaNotFound,
    StructuralValidationFailed,
    ConfigAmountChanged,
    AdditionalConfig,
    UnsafeFieldChanged,
    ValidationRuleFailed,
    UnknownRule,
    InvalidDescriptor,
    InvalidConfig,
    Io,
    Parse,
}

impl CoreError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            Self::SchemaNotFound { .. } => ErrorKind::SchemaNotFound,
            Self::StructuralValidationFailed(_) => ErrorKind::StructuralValidationFailed,
            Self::ConfigAmountChanged { .. } => ErrorKind::ConfigAmountChanged,
            Self::AdditionalConfig { .. } => ErrorKind::AdditionalConfig,
            Self::UnsafeFieldChanged { .. } => ErrorKind::UnsafeFieldChanged,
            Self::ValidationRuleFailed { .. } => ErrorKind::ValidationRuleFailed,
            Self::UnknownRule { .. } => ErrorKind::UnknownRule,
            Self::InvalidDescriptor { .. } => ErrorKind::InvalidDescriptor,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
            Self::YamlParse(_) | Self::JsonParse(_) => ErrorKind::Parse,
        }
    }

    /// Whether this error rejects a change to a running cluster
    pub fn is_unsafe_change(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConfigAmountChanged
                | ErrorKind::AdditionalConfig
                | ErrorKind::UnsafeFieldChanged
                | ErrorKind::ValidationRuleFailed
        )
    }

    pub(crate) fn malformed(position: usize, reason: impl Into<String>, content: &str) -> Self {
        Self::MalformedDocument {
            position,
            reason: reason.into(),
            excerpt: numbered_excerpt(content),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Re-label document-scoped errors with the position of the document in its stream
    pub(crate) fn at_position(self, position: usize) -> Self {
        match self {
            Self::MalformedDocument {
                reason, excerpt, ..
            } => Self::MalformedDocument {
                position,
                reason,
                excerpt,
            },
            Self::StructuralValidationFailed(errors) => {
                Self::StructuralValidationFailed(errors.at_position(position))
            }
            other => other,
        }
    }
}

const EXCERPT_LINES: usize = 20;

/// Render the head of a document with line numbers
pub(crate) fn numbered_excerpt(content: &str) -> String {
    let total = content.lines().count();
    let width = total.min(EXCERPT_LINES).to_string().len();

    let mut out = String::new();
    for (number, line) in content.lines().enumerate().take(EXCERPT_LINES) {
        out.push_str(&format!("{:>width$} | {}\n", number + 1, line, width = width));
    }
    if total > EXCERPT_LINES {
        out.push_str(&format!("{:>width$} | ...\n", "", width = width));
    }
    out
}

/// Single schema violation with its location in the document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrorInfo {
    /// JSON pointer to the offending value
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Violations found in one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentViolations {
    /// Position of the document in its stream
    pub position: usize,
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
    pub messages: Vec<String>,
}

impl DocumentViolations {
    pub fn new(index: &SchemaIndex, name: impl Into<String>, errors: &[ValidationErrorInfo]) -> Self {
        Self {
            position: 0,
            group: index.group().to_string(),
            version: index.version_only().to_string(),
            kind: index.kind.clone(),
            name: name.into(),
            messages: errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Ordered list of per-document violations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    pub documents: Vec<DocumentViolations>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.documents.extend(other.documents);
    }

    /// Total number of violation messages across all documents
    pub fn violation_count(&self) -> usize {
        self.documents.iter().map(|d| d.messages.len()).sum()
    }

    fn at_position(mut self, position: usize) -> Self {
        for document in &mut self.documents {
            document.position = position;
        }
        self
    }
}

impl From<DocumentViolations> for ValidationErrors {
    fn from(document: DocumentViolations) -> Self {
        Self {
            documents: vec![document],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for doc in &self.documents {
            write!(
                f,
                "\ndocument #{} ({}, Kind={}, Name={}):",
                doc.position,
                if doc.group.is_empty() {
                    doc.version.clone()
                } else {
                    format!("{}/{}", doc.group, doc.version)
                },
                doc.kind,
                doc.name
            )?;
            for message in &doc.messages {
                write!(f, "\n  - {message}")?;
            }
        }
        Ok(())
    }
}
