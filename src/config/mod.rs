//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + SLICEKIT_ENV / SLICEKIT_SLICES
//!     → loader.rs (parse, apply environment overrides)
//!     → validation.rs (semantic checks)
//!     → Configuration (mutable until freeze, Arc<Settings> snapshots after)
//!     → seeded copy per slice (defaults + [slice.<name>] overrides)
//!
//! In development:
//!     watcher.rs detects a change under the app root
//!     → reload request sent to the server loop
//!     → Application::reload() swaps the route table
//! ```
//!
//! # Design Decisions
//! - Settings are frozen when the boot pipeline finishes preparing
//! - All fields have defaults to allow minimal configs
//! - Slices never mutate the application's settings; they receive their own copy
//! - Validation separates syntactic (serde) from semantic checks

pub mod configuration;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use configuration::Configuration;
pub use loader::{load_config, ConfigError};
pub use schema::{
    ActionsConfig, Environment, LogFormat, LoggerConfig, RouterConfig, ServerConfig, Settings,
};
