//! Configuration management
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (star-schema.toml)
//! - Environment variables (STAR_SCHEMA__*)
//!
//! ## Example config file (star-schema.toml):
//! ```toml
//! [build]
//! default_join_kind = "left_outer"
//! infer_reverse_foreign_keys = true
//!
//! [render]
//! pretty = true
//! quote_identifiers = false
//!
//! [logging]
//! filter = "star_schema=debug"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::JoinKind;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarSchemaConfig {
    /// Graph construction settings
    #[serde(default)]
    pub build: BuildConfig,

    /// SQL rendering settings for the reference query builder
    #[serde(default)]
    pub render: RenderConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Graph construction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Join kind used for joins inferred from foreign keys
    #[serde(default)]
    pub default_join_kind: JoinKind,

    /// Also consider foreign keys declared on the child that point at the parent
    #[serde(default = "default_true")]
    pub infer_reverse_foreign_keys: bool,
}

/// SQL rendering configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Put each clause on its own line
    #[serde(default)]
    pub pretty: bool,

    /// Quote every identifier, not only those that need it
    #[serde(default)]
    pub quote_identifiers: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "warn".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            default_join_kind: JoinKind::LeftOuter,
            infer_reverse_foreign_keys: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl StarSchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "star-schema.toml",
            ".star-schema.toml",
            "config/star-schema.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "star-schema", "star-schema") {
            let xdg_config = config_dir.config_dir().join("star-schema.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("STAR_SCHEMA")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
