//! Process-wide application state.
//!
//! Everything global lives here: the current application and the plugin list
//! accumulated before an application is installed.
//!
//! # Lifecycle
//! ```text
//! register_plugin(p)*     plugins accumulate
//! Application::builder    takes a copy of the plugin list
//! install(app)            current = app, plugin list sealed
//! current()               read-only from here on
//! reset()                 tests and development reload only
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use arc_swap::ArcSwapOption;
use thiserror::Error;

use crate::app::{Application, Plugin};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("application {current} is already installed")]
    AlreadyInstalled { current: String },

    #[error("plugin {plugin} registered after an application was installed")]
    Sealed { plugin: String },
}

impl ContextError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ContextError::AlreadyInstalled { .. } => "context_already_installed",
            ContextError::Sealed { .. } => "context_sealed",
        }
    }
}

struct ProcessContext {
    current: ArcSwapOption<Application>,
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    sealed: AtomicBool,
}

fn context() -> &'static ProcessContext {
    static CONTEXT: OnceLock<ProcessContext> = OnceLock::new();
    CONTEXT.get_or_init(|| ProcessContext {
        current: ArcSwapOption::empty(),
        plugins: Mutex::new(Vec::new()),
        sealed: AtomicBool::new(false),
    })
}

/// Add a plugin every subsequently built application runs.
pub fn register_plugin<P: Plugin>(plugin: P) -> Result<(), ContextError> {
    let ctx = context();
    let mut plugins = ctx.plugins.lock().expect("plugin list poisoned");
    if ctx.sealed.load(Ordering::Acquire) {
        return Err(ContextError::Sealed {
            plugin: plugin.name().to_string(),
        });
    }
    tracing::debug!(plugin = %plugin.name(), "Plugin registered");
    plugins.push(Arc::new(plugin));
    Ok(())
}

/// Plugins registered so far.
pub fn plugins() -> Vec<Arc<dyn Plugin>> {
    context().plugins.lock().expect("plugin list poisoned").clone()
}

/// Make `app` the current application and seal the plugin list.
pub fn install(app: Arc<Application>) -> Result<(), ContextError> {
    let ctx = context();
    // Held so install and register_plugin cannot interleave.
    let _plugins = ctx.plugins.lock().expect("plugin list poisoned");
    if let Some(current) = ctx.current.load_full() {
        return Err(ContextError::AlreadyInstalled {
            current: current.name().to_string(),
        });
    }
    tracing::info!(app = %app.name(), "Application installed");
    ctx.current.store(Some(app));
    ctx.sealed.store(true, Ordering::Release);
    Ok(())
}

/// The installed application, if any.
pub fn current() -> Option<Arc<Application>> {
    context().current.load_full()
}

/// Forget the current application and all registered plugins.
///
/// For test suites and development reload; never call while serving.
pub fn reset() {
    let ctx = context();
    let mut plugins = ctx.plugins.lock().expect("plugin list poisoned");
    plugins.clear();
    ctx.current.store(None);
    ctx.sealed.store(false, Ordering::Release);
    tracing::debug!("Process context reset");
}
