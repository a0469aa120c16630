//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Environment, Settings};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable selecting development/test/production.
pub const ENV_VAR: &str = "SLICEKIT_ENV";

/// Environment variable holding a comma-separated slice allow-list.
pub const SLICES_VAR: &str = "SLICEKIT_SLICES";

/// Error type for configuration loading and mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Invalid overrides for slice '{slice}': {source}")]
    SliceOverride {
        slice: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration is frozen")]
    Frozen,

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Serialize(_) => "config_serialize",
            ConfigError::Env { .. } => "config_env",
            ConfigError::SliceOverride { .. } => "config_slice_override",
            ConfigError::Frozen => "config_frozen",
            ConfigError::Validation(_) => "config_validation",
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, honouring
/// `SLICEKIT_ENV` and `SLICEKIT_SLICES`.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// Like [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: &Path, env: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = fs::read_to_string(path)?;
    let mut settings: Settings = toml::from_str(&content)?;

    // A relative root is relative to the directory holding the config file.
    if settings.app.root.is_relative() {
        if let Some(dir) = path.parent() {
            settings.app.root = dir.join(&settings.app.root);
        }
    }

    apply_env_overrides(&mut settings, env)?;
    validate_config(&settings).map_err(ConfigError::Validation)?;

    Ok(settings)
}

/// Apply the environment-variable driven overrides.
pub fn apply_env_overrides<F>(settings: &mut Settings, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(ENV_VAR).filter(|v| !v.trim().is_empty()) {
        settings.env = value
            .parse::<Environment>()
            .map_err(|reason| ConfigError::Env { var: ENV_VAR, reason })?;
    }

    if let Some(value) = env(SLICES_VAR) {
        let allowed: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        settings.slices = Some(allowed);
    }

    tracing::debug!(
        env = %settings.env,
        slices = ?settings.slices,
        "Environment overrides applied"
    );
    Ok(())
}
