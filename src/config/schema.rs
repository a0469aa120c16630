//! Configuration schema definitions.
//!
//! This module defines the complete settings tree of an application and its slices.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Components every slice borrows from the application container by default.
pub const DEFAULT_SHARED_KEYS: &[&str] = &["settings", "logger", "notifications", "inflector"];

/// Root settings for an application (and, seeded, for each slice).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Application identity and root path.
    pub app: AppSection,

    /// Runtime environment (development, test, production).
    pub env: Environment,

    /// Logger component settings.
    pub logger: LoggerConfig,

    /// Settings applied to every action of a slice.
    pub actions: ActionsConfig,

    /// Router behaviour.
    pub router: RouterConfig,

    /// Boot pipeline settings.
    pub boot: BootConfig,

    /// Component registry policy.
    pub container: ContainerConfig,

    /// HTTP listener settings (used by the bundled server).
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Allow-list of slices to register. `None` registers every declared slice.
    pub slices: Option<Vec<String>>,

    /// Application component keys every slice imports unless it registers its own.
    pub shared_component_keys: Vec<String>,

    /// Per-slice override tables, merged over the application defaults.
    #[serde(rename = "slice")]
    pub slice_overrides: BTreeMap<String, toml::Table>,

    /// Application-defined settings, reachable through dotted lookups (`custom.*`).
    pub custom: toml::Table,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            env: Environment::default(),
            logger: LoggerConfig::default(),
            actions: ActionsConfig::default(),
            router: RouterConfig::default(),
            boot: BootConfig::default(),
            container: ContainerConfig::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            slices: None,
            shared_component_keys: DEFAULT_SHARED_KEYS.iter().map(|k| k.to_string()).collect(),
            slice_overrides: BTreeMap::new(),
            custom: toml::Table::new(),
        }
    }
}

impl Settings {
    /// Settings with the given application name and otherwise default values.
    pub fn named(name: impl Into<String>) -> Self {
        let mut settings = Self::default();
        settings.app.name = name.into();
        settings
    }

    /// Whether the boot pipeline should resolve every component eagerly.
    ///
    /// An explicit `boot.eager` wins; otherwise production boots and every other
    /// environment only prepares.
    pub fn eager_boot(&self) -> bool {
        self.boot.eager.unwrap_or(self.env == Environment::Production)
    }

    /// Whether containers may be released for code reloading.
    pub fn code_reloading(&self) -> bool {
        self.boot
            .code_reloading
            .unwrap_or(self.env == Environment::Development)
    }

    /// Whether a slice with the given name passes the allow-list.
    pub fn slice_enabled(&self, name: &str) -> bool {
        match &self.slices {
            Some(allowed) => allowed.iter().any(|s| s == name),
            None => true,
        }
    }
}

/// Application identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    /// Application name, used as the root slice name.
    pub name: String,

    /// Root directory of the application source tree.
    pub root: PathBuf,

    /// Directory (relative to root) holding the application's own code.
    pub app_dir: String,

    /// Directory (relative to root) holding slice directories.
    pub slices_dir: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            root: PathBuf::from("."),
            app_dir: "app".to_string(),
            slices_dir: "slices".to_string(),
        }
    }
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Logger component configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Parameter names replaced by `[FILTERED]` in request logs.
    pub filters: Vec<String>,

    /// Emit one log line per request.
    pub log_requests: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filters: vec!["password".to_string(), "password_confirmation".to_string()],
            log_requests: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings applied to every action of a slice.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ActionsConfig {
    /// Headers added to every action response unless the action set them.
    pub default_headers: BTreeMap<String, String>,

    /// Default response content type.
    pub default_content_type: String,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("x-frame-options".to_string(), "DENY".to_string());
        default_headers.insert("x-content-type-options".to_string(), "nosniff".to_string());
        Self {
            default_headers,
            default_content_type: "text/html; charset=utf-8".to_string(),
        }
    }
}

/// Router behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Body returned for unmatched requests.
    pub not_found_body: String,

    /// Body returned when only other verbs match.
    pub not_allowed_body: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            not_found_body: "Not Found".to_string(),
            not_allowed_body: "Method Not Allowed".to_string(),
        }
    }
}

/// Boot pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct BootConfig {
    /// Force eager (`true`) or lazy (`false`) boot. Defaults by environment.
    pub eager: Option<bool>,

    /// Allow container release and route table rebuilds. Defaults to development only.
    pub code_reloading: Option<bool>,
}

/// Component registry policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct ContainerConfig {
    /// Allow re-registering a key that has not been resolved yet.
    pub allow_overwrite: bool,
}

/// Listener configuration for the bundled HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:2300").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2300".to_string(),
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.env, Environment::Development);
        assert_eq!(settings.app.slices_dir, "slices");
        assert!(!settings.eager_boot());
        assert!(settings.code_reloading());
        assert!(settings.slice_enabled("anything"));
    }

    #[test]
    fn test_eager_boot_defaults_by_env() {
        let mut settings = Settings::default();
        settings.env = Environment::Production;
        assert!(settings.eager_boot());
        assert!(!settings.code_reloading());

        settings.boot.eager = Some(false);
        assert!(!settings.eager_boot());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            env = "production"
            slices = ["admin"]

            [app]
            name = "bookshelf"

            [slice.admin.actions]
            default_content_type = "application/json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.app.name, "bookshelf");
        assert_eq!(settings.app.app_dir, "app");
        assert!(settings.slice_enabled("admin"));
        assert!(!settings.slice_enabled("main"));
        assert!(settings.slice_overrides.contains_key("admin"));
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("PRODUCTION".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }
}
