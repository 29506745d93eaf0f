// src/utils/config.rs
//! Library configuration
//!
//! Loaded from (in increasing priority) built-in defaults, an optional
//! `interpose.{toml,yaml,json}` file in the working directory, and
//! `INTERPOSE__<SECTION>__<KEY>` environment variables.

use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterposeConfig {
    /// Proxy generation settings
    #[serde(default)]
    pub generator: GeneratorSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Settings consulted while generating implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Namespace prefix for generated implementation names
    pub type_prefix: String,

    /// Whether `Internal` types are visible to the generator
    pub allow_internal_types: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            type_prefix: "Interpose.Proxies".to_string(),
            allow_internal_types: true,
        }
    }
}

/// Settings for the tracing subscriber and cache event reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,

    /// Emit JSON lines instead of the compact format
    pub json: bool,

    /// Report shape cache hits and builds through the tracing sink
    pub cache_events: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            cache_events: true,
        }
    }
}

impl InterposeConfig {
    /// Load configuration from the default file and environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name("interpose").required(false))
    }

    /// Load configuration from an explicit file, still honoring the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);
        Self::build(File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = GeneratorSettings::default();
        let logging = LoggingSettings::default();

        let settings = Config::builder()
            .set_default("generator.type_prefix", defaults.type_prefix)?
            .set_default("generator.allow_internal_types", defaults.allow_internal_types)?
            .set_default("logging.level", logging.level)?
            .set_default("logging.json", logging.json)?
            .set_default("logging.cache_events", logging.cache_events)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("INTERPOSE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
