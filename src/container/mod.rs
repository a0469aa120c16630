//! Component registry subsystem.
//!
//! # Data Flow
//! ```text
//! Load phase:
//!     register / register_with / register_value / register_import
//!     → key → factory (not yet invoked) or value
//!
//! First resolve(key):
//!     → claim entry → factory(&container), no lock held → memoized Arc
//!
//! Eager boot:
//!     finalize() → resolve every key in registration order → freeze
//!
//! Development reload:
//!     release() → memoized instances dropped, factories kept
//! ```
//!
//! # Design Decisions
//! - Components are `Arc<dyn Any + Send + Sync>`; typed access via `resolve_as`
//! - Identity is the contract: two resolutions return the same `Arc`
//! - Release is refused outside code reloading

pub mod error;
pub mod registry;

pub use error::{BoxError, ContainerError};
pub use registry::{Component, Container, ContainerPolicy};
