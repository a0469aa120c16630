//! Actions: the request handlers routes point at.
//!
//! # Data Flow
//! ```text
//! RouteEntry (to: "users.index", slice: main)
//!     → resolver.rs: ActionKey "actions.users.index"
//!     → main's container.resolve(key)
//!         ├─ found     → Arc<dyn Action>
//!         └─ not found → MissingActionError { key, type_name, slice, expected_path }
//!     → Action::call(&Request, &mut Response)
//! ```
//!
//! # Design Decisions
//! - One capability trait for container-backed and inline handlers alike
//! - Closures with the right signature are actions
//! - Handler errors are returned, never swallowed; the dispatcher reports them

pub mod request;
pub mod resolver;
pub mod response;

use std::sync::Arc;

pub use request::{Params, Request};
pub use resolver::{ActionResolver, MissingActionError, ResolveError};
pub use response::Response;

/// Error returned by a handler while processing a request.
pub type HandlerError = crate::container::BoxError;

/// Processes one request by filling in the response.
pub trait Action: Send + Sync + 'static {
    fn call(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError>;
}

impl<F> Action for F
where
    F: Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn call(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError> {
        self(request, response)
    }
}

/// Shared handle to an action, as stored in containers and route entries.
pub type ActionRef = Arc<dyn Action>;

/// Wrap a closure as an action handle, fixing its signature for inference.
pub fn handler<F>(f: F) -> ActionRef
where
    F: Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}
