//! Application subsystem.
//!
//! # Data Flow
//! ```text
//! Application::builder(settings)
//!     → root slice + base components (settings, logger, notifications, inflector)
//!     → slices, actions and routes registered by the caller
//!
//! prepare() / boot() / start()
//!     → plugins prepare
//!     → every slice prepared (shared imports, settings frozen)
//!     → instrumentation composed on the canonical bus
//!     ├─ prepare: route table compiled, actions deferred
//!     └─ boot:    every container finalized, every action validated
//!     → dispatcher installed
//! ```
//!
//! # Design Decisions
//! - One pipeline serves both modes; the mode only decides where it stops
//! - Runs are serialized; the first failure is recorded and later runs are
//!   refused, so a failed application never serves
//! - Process-wide state lives in [`context`], nowhere else

pub mod application;
pub mod boot;
pub mod context;
pub mod plugin;

pub use application::{Application, ApplicationBuilder};
pub use boot::{BootError, BootMode, BootState};
pub use context::ContextError;
pub use plugin::Plugin;
