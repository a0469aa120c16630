//! Extensions hooked into the boot pipeline.

use crate::app::Application;
use crate::container::BoxError;

/// Runs during the pipeline, after the base components are registered and
/// before any slice is prepared.
///
/// Plugins typically register components or routes, or subscribe to events.
/// The pipeline is running while `prepare` is called: `Application::prepare`,
/// `boot`, `reload` and a first `call` made from inside it return
/// `BootError::InvalidState` rather than waiting on themselves.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn prepare(&self, app: &Application) -> Result<(), BoxError>;
}
