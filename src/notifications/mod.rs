//! Notifications subsystem.
//!
//! # Data Flow
//! ```text
//! Composition (boot pipeline):
//!     root container "notifications" → the canonical bus
//!     → RequestMonitor::attach(bus) registers request.start/finish/error
//!     → request logger and metrics subscribe to request.finish
//!
//! Per request (dispatcher):
//!     monitor.start(&request)     → request.start
//!     action runs
//!     in_flight.finish(status)    → request.finish { verb, path, status, elapsed, ... }
//!     in_flight.fail(status, err) → request.error, request.finish
//! ```
//!
//! # Design Decisions
//! - One bus per application, stored in the root container and shared with slices
//! - Events must be registered before subscription; the monitor registers its own
//!   on the canonical bus, whatever else materialized first
//! - Finish is published from a guard so failed and panicking requests are logged

pub mod bus;
pub mod event;
pub mod monitor;

pub use bus::{NotificationError, Notifications, SubscriptionId};
pub use event::{Event, Payload, RequestPayload, REQUEST_ERROR, REQUEST_FINISH, REQUEST_START};
pub use monitor::{InFlight, RequestMonitor};
