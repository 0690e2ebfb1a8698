//! CLI commands

pub mod check_changes;
pub mod schemas;
pub mod validate;

use clusterconf_core::{SchemaStore, StoreConfig};
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Where the store comes from, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct StoreArgs {
    pub schemas: Vec<PathBuf>,
    pub modules: Vec<PathBuf>,
    pub config: Option<PathBuf>,
}

impl StoreArgs {
    /// Resolve the store configuration: config file first, then flags
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load_from(path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "using default config file");
                    StoreConfig::load_from(&path)?
                }
                None => StoreConfig::from_env(),
            },
        };

        if !self.schemas.is_empty() {
            config.schema_paths = self.schemas.clone();
        }
        if !self.modules.is_empty() {
            config.module_paths = self.modules.clone();
        }
        Ok(config)
    }

    /// Build the one store this invocation works with
    pub fn load_store(&self) -> Result<SchemaStore> {
        let config = self.store_config()?;
        SchemaStore::load(&config).map_err(|err| match CliError::from(err) {
            CliError::Io { message } => CliError::Config {
                message: format!("cannot load schemas: {message}"),
                help: Some(
                    "point --schemas (or CLUSTERCONF_SCHEMAS_DIR) at a directory of schema descriptors"
                        .to_string(),
                ),
            },
            other => other,
        })
    }
}

/// Default CLI config file (~/.config/clusterconf/config.yaml)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clusterconf").join("config.yaml"))
}

pub(crate) fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| CliError::io_at(path, err))
}
