use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RelayError;

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// Relay configuration, usually loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub categories: Categories,
    /// Render parameter values; when false every value is written as `?`
    #[serde(default = "default_enabled")]
    pub log_parameter_values: bool,
    /// chrono format string used for `{Timestamp}` placeholders
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

/// Which event categories produce output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    #[serde(default = "default_enabled")]
    pub command: bool,
    #[serde(default = "default_enabled")]
    pub connection: bool,
    #[serde(default = "default_enabled")]
    pub transaction: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl Default for Categories {
    fn default() -> Self {
        Self {
            command: true,
            connection: true,
            transaction: true,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            categories: Categories::default(),
            log_parameter_values: true,
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl RelayConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, RelayError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RelayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded relay config from {:?}", path);
        Ok(config)
    }

    pub fn with_parameter_values(mut self, enabled: bool) -> Self {
        self.log_parameter_values = enabled;
        self
    }

    pub fn with_categories(mut self, categories: Categories) -> Self {
        self.categories = categories;
        self
    }
}
