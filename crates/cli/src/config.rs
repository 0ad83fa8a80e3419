//! CLI configuration loading
//!
//! Layers, lowest first: built-in defaults, config file, `FEEDBACK_*`
//! environment variables. Command-line flags are applied by the caller.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use feedback_client::ClientConfig;
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "FEEDBACK";

/// Load client configuration.
///
/// An explicit `path` must exist; `default_path` is used only if present.
pub fn load_client_config(path: Option<&Path>, default_path: &Path) -> Result<ClientConfig> {
    let defaults = Config::try_from(&ClientConfig::default())
        .context("Failed to build default configuration")?;

    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        debug!("Loading configuration from: {}", path.display());
        builder = builder.add_source(File::from(path).required(true));
    } else if default_path.exists() {
        debug!("Loading configuration from: {}", default_path.display());
        builder = builder.add_source(File::from(default_path).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("Failed to load configuration")?;

    config
        .try_deserialize()
        .context("Invalid configuration values")
}
