//! # Host Configuration
//!
//! The demo host reads one TOML file holding the database path, logging
//! settings and the table catalog.
//!
//! ```toml
//! database = "fieldgroup.redb"
//!
//! [logging]
//! format = "text"          # or "json"
//! filter = "fieldgroup=debug"
//!
//! [[tables]]
//! name = "tl_content"
//!
//! [[tables.fields]]
//! name = "slides"
//! input_type = "group"
//! palette = ["title", "image"]
//! min = 1
//! max = 5
//!
//! [[tables.fields]]
//! name = "title"
//! input_type = "text"
//! ```

use fieldgroup_core::{Catalog, GroupError, TableSchema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fieldgroup.toml";

/// Default database file.
pub const DEFAULT_DATABASE: &str = "fieldgroup.redb";

/// Default log filter when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_LOG_FILTER: &str = "fieldgroup=info,fieldgroup_core=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            logging: LoggingConfig::default(),
            tables: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, GroupError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| GroupError::InvalidArgument(format!("Invalid configuration: {e}")))?;

        let mut seen = std::collections::BTreeSet::new();
        for table in &config.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(GroupError::InvalidArgument(format!(
                    "Invalid configuration: table '{}' is declared twice",
                    table.name
                )));
            }
        }

        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, GroupError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GroupError::IoError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load `path`, or the default config file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, GroupError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// The table catalog declared by this configuration.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.tables.iter().cloned())
    }

    /// Effective log filter directives.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
