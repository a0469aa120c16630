//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route declaration (load phase):
//!     Routes DSL (get/post/.../slice/scope/redirect)
//!     → definition.rs (plain declarations, nothing resolved)
//!
//! Route compilation:
//!     app routes + each slice's own routes
//!     → matcher.rs (prefix join, pattern parse)
//!     → router.rs (last declaration per verb+path wins)
//!     → booted:   resolve every action now (fail fast)
//!     → prepared: defer resolution to the first matching request
//!     → immutable RouteTable
//!
//! Incoming request (verb, path)
//!     → RouteTable::recognize
//!     → Found { route, params } | MethodNotAllowed | NotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime; reload builds a new table
//! - Every route is owned by exactly one slice; its action comes from that
//!   slice's container only
//! - Deterministic: same declarations always produce the same table

pub mod definition;
pub mod error;
pub mod matcher;
pub mod router;

pub use definition::{inline, RouteDecl, RouteHandle, Routes, Target};
pub use error::{RouteError, SliceLoadError};
pub use matcher::PathPattern;
pub use router::{Endpoint, Recognition, RouteEntry, RouteInfo, RouteTable};
