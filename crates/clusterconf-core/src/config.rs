//! Schema store configuration
//!
//! Read from a YAML file or from the environment:
//!
//! ```yaml
//! schemaPaths:
//!   - /etc/clusterconf/schemas
//! modulePaths:
//!   - /etc/clusterconf/modules
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Environment variable listing schema descriptor roots (`:`-delimited)
pub const SCHEMAS_DIR_ENV: &str = "CLUSTERCONF_SCHEMAS_DIR";

/// Environment variable listing module roots (`:`-delimited)
pub const MODULES_DIR_ENV: &str = "CLUSTERCONF_MODULES_DIR";

pub const DEFAULT_SCHEMAS_DIR: &str = "/etc/clusterconf/schemas";

/// Where the schema store loads from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Roots holding schema descriptor files
    #[serde(default = "default_schema_paths")]
    pub schema_paths: Vec<PathBuf>,

    /// Roots holding module directories with `openapi/config-values.yaml`
    #[serde(default)]
    pub module_paths: Vec<PathBuf>,
}

fn default_schema_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_SCHEMAS_DIR)]
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_paths: default_schema_paths(),
            module_paths: Vec::new(),
        }
    }
}

impl StoreConfig {
    pub fn new<I, P>(schema_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            schema_paths: schema_paths.into_iter().map(Into::into).collect(),
            module_paths: Vec::new(),
        }
    }

    pub fn with_module_paths<I, P>(mut self, module_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.module_paths = module_paths.into_iter().map(Into::into).collect();
        self
    }

    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            CoreError::invalid_config(format!("{}: {e}", path.display()))
        })?;

        if config.schema_paths.is_empty() {
            return Err(CoreError::invalid_config(format!(
                "{}: schemaPaths must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }

    /// Build configuration from `CLUSTERCONF_SCHEMAS_DIR` and `CLUSTERCONF_MODULES_DIR`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = std::env::var_os(SCHEMAS_DIR_ENV) {
            let paths: Vec<PathBuf> = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                config.schema_paths = paths;
            }
        }

        if let Some(value) = std::env::var_os(MODULES_DIR_ENV) {
            config.module_paths = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        config
    }
}
