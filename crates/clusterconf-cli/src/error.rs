//! CLI error types with exit code handling
//!
//! Core errors are folded into a handful of user-facing categories, each
//! with its own exit code.

use clusterconf_core::{CoreError, ErrorKind};
use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration is malformed or violates its schema
    #[error("Validation failed: {message}")]
    #[diagnostic(code(clusterconf::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The proposed configuration may not replace the running one
    #[error("Unsafe change: {message}")]
    #[diagnostic(code(clusterconf::cli::unsafe_change))]
    UnsafeChange {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Schema store or CLI configuration could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(code(clusterconf::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(clusterconf::cli::io))]
    Io { message: String },

    /// Output could not be produced
    #[error("Internal error: {message}")]
    #[diagnostic(code(clusterconf::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::UnsafeChange { .. } => exit_codes::UNSAFE_CHANGE,
            CliError::Config { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an IO error naming the file it happened on
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {err}", path.display()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::MalformedDocument | ErrorKind::Parse => CliError::Validation {
                message,
                help: Some("every document needs both 'apiVersion' and 'kind'".to_string()),
            },
            ErrorKind::StructuralValidationFailed => CliError::Validation {
                message,
                help: None,
            },
            ErrorKind::SchemaNotFound => CliError::Validation {
                message,
                help: Some("list the loaded schemas with 'clusterconf schemas'".to_string()),
            },
            ErrorKind::ConfigAmountChanged | ErrorKind::AdditionalConfig => {
                CliError::UnsafeChange {
                    message,
                    help: Some(
                        "configuration documents cannot be added to or removed from a running cluster"
                            .to_string(),
                    ),
                }
            }
            ErrorKind::UnsafeFieldChanged | ErrorKind::ValidationRuleFailed => {
                CliError::UnsafeChange {
                    message,
                    help: Some("revert the field or apply the change while bootstrapping (--phase BaseInfra)".to_string()),
                }
            }
            ErrorKind::UnknownRule | ErrorKind::InvalidDescriptor | ErrorKind::InvalidConfig => {
                CliError::Config {
                    message,
                    help: None,
                }
            }
            ErrorKind::Io => CliError::Io { message },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
