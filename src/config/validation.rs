//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check names used as slice identifiers
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::Settings;
use crate::slice::naming::is_valid_slice_name;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("app.name must not be empty")]
    EmptyAppName,

    #[error("'{0}' is not a valid slice name")]
    InvalidSliceName(String),

    #[error("slice '{0}' listed twice in the allow-list")]
    DuplicateAllowListEntry(String),

    #[error("logger.level '{0}' is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("server.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("server.request_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("shared_component_keys contains an empty key")]
    EmptySharedKey,
}

/// Validate settings, collecting every error.
pub fn validate_config(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.app.name.trim().is_empty() {
        errors.push(ValidationError::EmptyAppName);
    }

    if let Some(allowed) = &settings.slices {
        let mut seen = HashSet::new();
        for name in allowed {
            if !is_valid_slice_name(name) {
                errors.push(ValidationError::InvalidSliceName(name.clone()));
            } else if !seen.insert(name.as_str()) {
                errors.push(ValidationError::DuplicateAllowListEntry(name.clone()));
            }
        }
    }

    for name in settings.slice_overrides.keys() {
        if !is_valid_slice_name(name) {
            errors.push(ValidationError::InvalidSliceName(name.clone()));
        }
    }

    if !LOG_LEVELS.contains(&settings.logger.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(settings.logger.level.clone()));
    }

    if settings.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            settings.server.bind_address.clone(),
        ));
    }

    if settings.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if settings.shared_component_keys.iter().any(|k| k.trim().is_empty()) {
        errors.push(ValidationError::EmptySharedKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
