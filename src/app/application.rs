//! The application: root slice plus the boot pipeline.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use arc_swap::ArcSwapOption;

use crate::action::{Action, Request, Response};
use crate::app::boot::{BootError, BootMode, BootState};
use crate::app::{context, Plugin};
use crate::config::{Configuration, Settings};
use crate::container::{BoxError, Container, ContainerError};
use crate::http::dispatch::Dispatcher;
use crate::notifications::{Notifications, RequestMonitor};
use crate::observability::{metrics, Logger};
use crate::routing::{RouteTable, Routes};
use crate::slice::naming::Inflector;
use crate::slice::{Slice, SliceError};

/// Builds an [`Application`].
pub struct ApplicationBuilder {
    settings: Settings,
    plugins: Vec<Arc<dyn Plugin>>,
    inflector: Inflector,
}

impl ApplicationBuilder {
    /// Add a plugin for this application only.
    pub fn plugin<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Use a customized inflector (e.g. with acronyms).
    pub fn inflector(mut self, inflector: Inflector) -> Self {
        self.inflector = inflector;
        self
    }

    /// Create the application and register its base components:
    /// `settings`, `logger`, `notifications` and `inflector`.
    pub fn build(self) -> Result<Arc<Application>, BootError> {
        let root = Slice::application(self.settings);
        register_base_components(&root, self.inflector)?;

        // Process-wide plugins run before application-specific ones.
        let mut plugins = context::plugins();
        plugins.extend(self.plugins);

        tracing::info!(
            app = %root.name(),
            env = %root.settings().env,
            plugins = plugins.len(),
            "Application created"
        );

        Ok(Arc::new(Application {
            root,
            plugins,
            state: AtomicU8::new(BootState::Unbooted as u8),
            boot_lock: Mutex::new(()),
            pipeline_owner: Mutex::new(None),
            failure: Mutex::new(None),
            monitor: ArcSwapOption::empty(),
            dispatcher: ArcSwapOption::empty(),
        }))
    }
}

fn register_base_components(root: &Arc<Slice>, inflector: Inflector) -> Result<(), ContainerError> {
    let container = root.container();

    let weak: Weak<Slice> = Arc::downgrade(root);
    container.register_with("settings", move |_| {
        let root = weak.upgrade().ok_or("application dropped")?;
        Ok(Settings::clone(&root.settings()))
    })?;
    container.register_with("logger", |c: &Container| {
        let settings = c.resolve_as::<Settings>("settings")?;
        Ok(Logger::from_settings(&settings))
    })?;
    // A value, so releasing containers never replaces the bus subscribers hang off.
    container.register_value("notifications", Notifications::new())?;
    container.register_value("inflector", inflector)?;
    Ok(())
}

/// The root slice with its boot pipeline and request entry point.
pub struct Application {
    root: Arc<Slice>,
    plugins: Vec<Arc<dyn Plugin>>,
    state: AtomicU8,
    /// Serializes pipeline runs and reloads.
    boot_lock: Mutex<()>,
    /// Thread holding `boot_lock`, so a plugin calling back in fails instead of deadlocking.
    pipeline_owner: Mutex<Option<ThreadId>>,
    /// First pipeline failure; once set, the application never starts.
    failure: Mutex<Option<String>>,
    monitor: ArcSwapOption<RequestMonitor>,
    dispatcher: ArcSwapOption<Dispatcher>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("slices", &self.root.child_names())
            .finish()
    }
}

impl Application {
    pub fn builder(settings: Settings) -> ApplicationBuilder {
        ApplicationBuilder {
            settings,
            plugins: Vec::new(),
            inflector: Inflector::default(),
        }
    }

    /// Build with no extra plugins.
    pub fn new(settings: Settings) -> Result<Arc<Self>, BootError> {
        Self::builder(settings).build()
    }

    pub fn name(&self) -> &str {
        self.root.name()
    }

    /// The application's own slice.
    pub fn root(&self) -> &Arc<Slice> {
        &self.root
    }

    pub fn container(&self) -> &Arc<Container> {
        self.root.container()
    }

    pub fn config(&self) -> &Configuration {
        self.root.config()
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.root.settings()
    }

    pub fn state(&self) -> BootState {
        BootState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_booted(&self) -> bool {
        self.state() == BootState::Booted
    }

    /// The reason an earlier pipeline run failed, if one did.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().expect("boot failure mutex poisoned").clone()
    }

    /// The canonical notifications bus.
    pub fn notifications(&self) -> Result<Arc<Notifications>, ContainerError> {
        self.container().resolve_as::<Notifications>("notifications")
    }

    pub fn register_slice(&self, name: &str, at: &str) -> Result<Option<Arc<Slice>>, SliceError> {
        self.root.register_slice(name, at)
    }

    /// Look up a registered slice by name, searching the whole tree depth first.
    pub fn slice(&self, name: &str) -> Option<Arc<Slice>> {
        let mut found = None;
        self.root.walk(&mut |slice| {
            if found.is_none() && !slice.is_root() && slice.name() == name {
                found = Some(Arc::clone(slice));
            }
        });
        found
    }

    pub fn register_action<A, F>(&self, target: &str, factory: F) -> Result<(), SliceError>
    where
        A: Action,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.root.register_action(target, factory)
    }

    pub fn register_action_with<A, F>(&self, target: &str, factory: F) -> Result<(), SliceError>
    where
        A: Action,
        F: Fn(&Container) -> Result<A, BoxError> + Send + Sync + 'static,
    {
        self.root.register_action_with(target, factory)
    }

    /// Declare the application's routes.
    pub fn routes<F>(&self, define: F) -> Result<(), SliceError>
    where
        F: FnOnce(&mut Routes),
    {
        self.root.routes(define)
    }

    /// Lazy load: everything is declared and settings are frozen, but actions
    /// are only resolved by the first request that needs them.
    pub fn prepare(&self) -> Result<(), BootError> {
        self.run_pipeline(BootMode::Prepare)
    }

    /// Eager load: prepare, construct every component in every slice and
    /// validate every route's action. Fails before any request is served.
    pub fn boot(&self) -> Result<(), BootError> {
        self.run_pipeline(BootMode::Boot)
    }

    /// Boot or prepare, as the settings' environment dictates.
    pub fn start(&self) -> Result<(), BootError> {
        if self.settings().eager_boot() {
            self.boot()
        } else {
            self.prepare()
        }
    }

    /// The installed dispatcher; `None` before preparing or after a failed boot.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.dispatcher.load_full()
    }

    /// Compile a fresh dispatcher, preparing first if nothing has run yet.
    ///
    /// A booted application validates every action target now; a prepared one
    /// leaves them to the first request that reaches them.
    pub fn to_dispatcher(&self) -> Result<Dispatcher, BootError> {
        if self.state() < BootState::Prepared {
            self.prepare()?;
        }
        self.ensure_not_failed()?;
        let routes = RouteTable::compile(&self.root, self.is_booted())?;
        Ok(Dispatcher::new(
            Arc::new(routes),
            self.current_monitor()?,
            self.settings().router.clone(),
        ))
    }

    /// Handle one request through the installed dispatcher, preparing the
    /// application first if needed.
    pub fn call(&self, request: Request) -> crate::Result<Response> {
        let dispatcher = match self.dispatcher() {
            Some(dispatcher) => dispatcher,
            None => {
                self.prepare()?;
                self.dispatcher().ok_or_else(|| BootError::InvalidState {
                    app: self.name().to_string(),
                    operation: "dispatch",
                    state: self.state(),
                })?
            }
        };
        Ok(dispatcher.call(request)?)
    }

    /// Recompiled route table, for inspection. Does not change the installed one.
    pub fn route_table(&self) -> Result<RouteTable, BootError> {
        Ok(RouteTable::compile(&self.root, false)?)
    }

    /// Drop memoized components everywhere and swap in a freshly compiled route
    /// table. Development only.
    ///
    /// A failed reload keeps the previous dispatcher serving.
    pub fn reload(&self) -> Result<usize, BootError> {
        let _guard = self.lock_pipeline("reload")?;
        self.ensure_not_failed()?;
        if !self.settings().code_reloading() {
            return Err(BootError::ReloadDisabled {
                app: self.name().to_string(),
            });
        }
        let state = self.state();
        if state < BootState::Prepared {
            return Err(BootError::InvalidState {
                app: self.name().to_string(),
                operation: "reload",
                state,
            });
        }

        let released = self.root.release()?;
        let routes = match RouteTable::compile(&self.root, state == BootState::Booted) {
            Ok(routes) => routes,
            Err(err) => {
                tracing::warn!(app = %self.name(), error = %err, "Reload failed, keeping previous routes");
                return Err(err.into());
            }
        };
        self.install(routes, self.current_monitor()?);
        tracing::info!(app = %self.name(), released, state = %state, "Application reloaded");
        Ok(released)
    }

    fn run_pipeline(&self, mode: BootMode) -> Result<(), BootError> {
        let operation = match mode {
            BootMode::Prepare => "prepare",
            BootMode::Boot => "boot",
        };
        let _guard = self.lock_pipeline(operation)?;
        self.ensure_not_failed()?;
        if self.state() >= mode.target() {
            return Ok(());
        }

        let result = self.advance(mode);
        if let Err(err) = &result {
            tracing::error!(
                app = %self.name(),
                state = %self.state(),
                error = %err,
                label = err.as_label(),
                "Boot pipeline failed"
            );
            *self.failure.lock().expect("boot failure mutex poisoned") = Some(err.to_string());
            self.dispatcher.store(None);
            self.set_state(BootState::Failed);
        }
        result
    }

    fn advance(&self, mode: BootMode) -> Result<(), BootError> {
        if self.state() < BootState::Prepared {
            self.set_state(BootState::Preparing);
            for plugin in &self.plugins {
                plugin.prepare(self).map_err(|source| BootError::Plugin {
                    plugin: plugin.name().to_string(),
                    source,
                })?;
                tracing::debug!(plugin = %plugin.name(), "Plugin prepared");
            }
            self.root.prepare()?;
            let monitor = self.compose()?;
            self.monitor.store(Some(Arc::new(monitor.clone())));

            if mode == BootMode::Prepare {
                let routes = RouteTable::compile(&self.root, false)?;
                self.install(routes, monitor);
            }
            self.set_state(BootState::Prepared);
            tracing::info!(app = %self.name(), "Application prepared");
        }

        if mode == BootMode::Boot {
            self.root.boot()?;
            let routes = RouteTable::compile(&self.root, true)?;
            self.install(routes, self.current_monitor()?);
            self.set_state(BootState::Booted);
            tracing::info!(
                app = %self.name(),
                slices = self.root.children().len(),
                "Application booted"
            );
        }
        Ok(())
    }

    /// Wire instrumentation to the canonical bus: request events, request
    /// logging and metrics.
    fn compose(&self) -> Result<RequestMonitor, BootError> {
        let bus = self.notifications()?;
        let monitor = RequestMonitor::attach(Arc::clone(&bus));

        let logger = self.container().resolve_as::<Logger>("logger")?;
        logger.subscribe(&bus)?;
        if self.settings().observability.metrics_enabled {
            metrics::subscribe(&bus)?;
        }
        tracing::debug!(app = %self.name(), events = bus.events().len(), "Instrumentation composed");
        Ok(monitor)
    }

    fn install(&self, routes: RouteTable, monitor: RequestMonitor) {
        let router = self.settings().router.clone();
        tracing::debug!(app = %self.name(), routes = routes.len(), "Dispatcher installed");
        self.dispatcher
            .store(Some(Arc::new(Dispatcher::new(Arc::new(routes), monitor, router))));
    }

    fn current_monitor(&self) -> Result<RequestMonitor, BootError> {
        match self.monitor.load_full() {
            Some(monitor) => Ok(RequestMonitor::clone(&monitor)),
            None => Err(BootError::InvalidState {
                app: self.name().to_string(),
                operation: "dispatch",
                state: self.state(),
            }),
        }
    }

    fn lock_pipeline(&self, operation: &'static str) -> Result<PipelineGuard<'_>, BootError> {
        let me = thread::current().id();
        if *self.owner_slot() == Some(me) {
            return Err(BootError::InvalidState {
                app: self.name().to_string(),
                operation,
                state: self.state(),
            });
        }
        let lock = self.boot_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner_slot() = Some(me);
        Ok(PipelineGuard { _lock: lock, app: self })
    }

    fn owner_slot(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.pipeline_owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_not_failed(&self) -> Result<(), BootError> {
        match self.failure() {
            Some(reason) => Err(BootError::Aborted {
                app: self.name().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn set_state(&self, state: BootState) {
        self.state.store(state as u8, Ordering::Release);
        tracing::debug!(app = %self.name(), state = %state, "Boot state changed");
    }
}

/// Held for one pipeline run or reload.
struct PipelineGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    app: &'a Application,
}

impl Drop for PipelineGuard<'_> {
    fn drop(&mut self) {
        // Runs before `_lock` is released.
        *self.app.owner_slot() = None;
    }
}
