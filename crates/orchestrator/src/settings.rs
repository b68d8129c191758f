/*
 * Settings loading for the command line tool.
 *
 * Sources, lowest to highest precedence:
 * 1. Built-in defaults
 * 2. Optional TOML file (`--config <path>`)
 * 3. Environment variables, e.g. CONSOLIDATOR__CONSOLIDATION__MIN_FILES_TO_CONSOLIDATE=10
 *
 * Command line overrides are applied by the caller afterwards.
 */

use config::{Config, ConfigError, Environment, File};
use consolidation_common::{ConsolidationConfig, RemoteCallPolicy, RemoteConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "CONSOLIDATOR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub consolidation: ConsolidationConfig,
    pub remote: RemoteConfig,
    pub policy: RemoteCallPolicy,
}

impl AppSettings {
    /// Loads settings from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
