//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → server stops accepting → in-flight requests drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP         → reload request (development only takes effect)
//! ```
//!
//! # Design Decisions
//! - Booting happens before the listener binds; traffic only reaches a started app
//! - SIGHUP goes through the same reload channel as the source watcher

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handlers;
