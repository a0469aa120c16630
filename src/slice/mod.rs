//! Slices: isolated, path-prefixed sub-applications.
//!
//! # Data Flow
//! ```text
//! Application (root slice)
//!     → register_slice("admin", "/admin")
//!         → allow-list check (top level only)
//!         → settings seeded from the parent + [slice.admin] overrides
//!         → own Container, own Configuration
//!     → register_action("users.index", factory) → key "actions.users.index"
//!     → routes(|r| ...) → the slice's own route declarations
//!
//! prepare():
//!     shared keys imported from the root container → config frozen → sealed
//!
//! boot():
//!     prepare() → container finalized → children, in registration order
//! ```
//!
//! # Design Decisions
//! - A slice resolves actions only from its own container
//! - Children hold a weak parent link; the root owns the tree
//! - Structure (children, routes, registrations) is sealed once prepared

pub mod naming;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use thiserror::Error;

use crate::action::{Action, ActionRef};
use crate::config::{ConfigError, Configuration, Settings};
use crate::container::{BoxError, Container, ContainerError, ContainerPolicy};
use crate::routing::Routes;
use naming::{ActionKey, Inflector, InvalidTarget, SliceLayout};

/// Errors raised while assembling or booting the slice tree.
#[derive(Debug, Error)]
pub enum SliceError {
    #[error("slice \"{name}\" is already registered in {parent}")]
    DuplicateSliceName { name: String, parent: String },

    #[error("invalid slice name \"{name}\": use lowercase letters, digits and underscores")]
    InvalidName { name: String },

    #[error(transparent)]
    InvalidActionTarget(#[from] InvalidTarget),

    #[error("slice {slice} is already prepared; its structure can no longer change")]
    Sealed { slice: String },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("slice {slice} failed to boot: {source}")]
    Boot {
        slice: String,
        #[source]
        source: ContainerError,
    },
}

impl SliceError {
    pub fn as_label(&self) -> &'static str {
        match self {
            SliceError::DuplicateSliceName { .. } => "slice_duplicate_name",
            SliceError::InvalidName { .. } => "slice_invalid_name",
            SliceError::InvalidActionTarget(_) => "slice_invalid_action_target",
            SliceError::Sealed { .. } => "slice_sealed",
            SliceError::Container(_) => "slice_container",
            SliceError::Config(_) => "slice_config",
            SliceError::Boot { .. } => "slice_boot_failed",
        }
    }
}

/// A named sub-application with its own settings and component registry.
pub struct Slice {
    name: String,
    layout: SliceLayout,
    mount: String,
    parent: Option<Weak<Slice>>,
    config: Configuration,
    container: Arc<Container>,
    children: RwLock<Vec<Arc<Slice>>>,
    /// Names declared but left out by the allow-list.
    skipped: RwLock<Vec<String>>,
    routes: RwLock<Option<Arc<Routes>>>,
    prepared: AtomicBool,
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("mount", &self.mount)
            .field("children", &self.child_names())
            .field("prepared", &self.is_prepared())
            .finish()
    }
}

impl Slice {
    /// Create the root slice of an application from its settings.
    pub fn application(settings: Settings) -> Arc<Slice> {
        let name = settings.app.name.clone();
        let layout = SliceLayout::application(&name, &settings.app.app_dir);
        Arc::new(Self::build(name, layout, "/".to_string(), None, settings))
    }

    fn build(
        name: String,
        layout: SliceLayout,
        mount: String,
        parent: Option<Weak<Slice>>,
        settings: Settings,
    ) -> Self {
        let policy = ContainerPolicy {
            allow_overwrite: settings.container.allow_overwrite,
            allow_release: settings.code_reloading(),
        };
        Self {
            container: Arc::new(Container::new(name.clone(), policy)),
            config: Configuration::new(settings),
            name,
            layout,
            mount,
            parent,
            children: RwLock::new(Vec::new()),
            skipped: RwLock::new(Vec::new()),
            routes: RwLock::new(None),
            prepared: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &SliceLayout {
        &self.layout
    }

    /// Mount path this slice was registered at.
    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn parent(&self) -> Option<Arc<Slice>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<Settings> {
        self.config.settings()
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    /// Inflector used for type names: this slice's, else the nearest ancestor's.
    pub fn inflector(&self) -> Inflector {
        if self.container.is_registered("inflector") {
            if let Ok(inflector) = self.container.resolve_as::<Inflector>("inflector") {
                return Inflector::clone(&inflector);
            }
        }
        self.parent()
            .map(|parent| parent.inflector())
            .unwrap_or_default()
    }

    /// Create and attach a child slice mounted at `at`.
    ///
    /// Returns `Ok(None)` when the application's allow-list leaves the slice out;
    /// only top-level slices are subject to the allow-list.
    pub fn register_slice(
        self: &Arc<Self>,
        name: &str,
        at: &str,
    ) -> Result<Option<Arc<Slice>>, SliceError> {
        self.ensure_open()?;
        if !naming::is_valid_slice_name(name) {
            return Err(SliceError::InvalidName {
                name: name.to_string(),
            });
        }
        if self.child(name).is_some() || self.is_skipped(name) {
            return Err(SliceError::DuplicateSliceName {
                name: name.to_string(),
                parent: self.name.clone(),
            });
        }

        let parent_settings = self.settings();
        if self.is_root() && !parent_settings.slice_enabled(name) {
            tracing::info!(slice = %name, "Slice not in allow-list, skipping");
            self.skipped
                .write()
                .expect("slice skip list poisoned")
                .push(name.to_string());
            return Ok(None);
        }

        let settings = self.config.seed_for_slice(name)?;
        let layout = if self.is_root() {
            SliceLayout::top_level(name, &parent_settings.app.slices_dir)
        } else {
            self.layout.nested(name, &parent_settings.app.slices_dir)
        };
        let mount = normalize_mount(at);

        let child = Arc::new(Self::build(
            name.to_string(),
            layout,
            mount,
            Some(Arc::downgrade(self)),
            settings,
        ));

        let mut children = self.children.write().expect("slice children poisoned");
        // Re-check under the write lock for concurrent registrations.
        if children.iter().any(|c| c.name == name) {
            return Err(SliceError::DuplicateSliceName {
                name: name.to_string(),
                parent: self.name.clone(),
            });
        }
        children.push(Arc::clone(&child));
        drop(children);

        tracing::info!(
            slice = %name,
            parent = %self.name,
            mount = %child.mount,
            source_dir = %child.layout.source_dir,
            "Slice registered"
        );
        Ok(Some(child))
    }

    /// Direct child by name.
    pub fn child(&self, name: &str) -> Option<Arc<Slice>> {
        self.children
            .read()
            .expect("slice children poisoned")
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Children in registration order.
    pub fn children(&self) -> Vec<Arc<Slice>> {
        self.children.read().expect("slice children poisoned").clone()
    }

    pub fn child_names(&self) -> Vec<String> {
        self.children
            .read()
            .expect("slice children poisoned")
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// True if `name` was declared here but excluded by the allow-list.
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped
            .read()
            .expect("slice skip list poisoned")
            .iter()
            .any(|s| s == name)
    }

    /// Register an action under the key derived from `target`.
    pub fn register_action<A, F>(&self, target: &str, factory: F) -> Result<(), SliceError>
    where
        A: Action,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.register_action_with(target, move |_| Ok(factory()))
    }

    /// Register an action whose construction resolves dependencies and may fail.
    pub fn register_action_with<A, F>(&self, target: &str, factory: F) -> Result<(), SliceError>
    where
        A: Action,
        F: Fn(&Container) -> Result<A, BoxError> + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let key = ActionKey::parse(target)?;
        self.container.register_with(key.container_key(), move |c| {
            factory(c).map(|action| Arc::new(action) as ActionRef)
        })?;
        Ok(())
    }

    /// Import `keys` from another slice's container as `"<other>.<key>"`.
    ///
    /// The aliases resolve to the other slice's memoized instances. Action lookup
    /// never goes through them, since action keys live under `actions.`.
    pub fn import_from(&self, other: &Slice, keys: &[&str]) -> Result<(), SliceError> {
        for key in keys {
            let alias = format!("{}.{}", other.name, key);
            self.container.register_import(alias, &other.container, *key)?;
        }
        tracing::debug!(slice = %self.name, from = %other.name, keys = ?keys, "Components imported");
        Ok(())
    }

    /// Declare this slice's own routes. Repeated calls append.
    pub fn routes<F>(&self, define: F) -> Result<(), SliceError>
    where
        F: FnOnce(&mut Routes),
    {
        self.ensure_open()?;
        let mut slot = self.routes.write().expect("slice routes poisoned");
        let mut routes = slot.as_deref().cloned().unwrap_or_default();
        define(&mut routes);
        *slot = Some(Arc::new(routes));
        Ok(())
    }

    /// Route declarations made through [`Slice::routes`].
    pub fn route_definitions(&self) -> Option<Arc<Routes>> {
        self.routes.read().expect("slice routes poisoned").clone()
    }

    /// Non-eager load: import shared components, freeze settings, seal structure.
    ///
    /// Constructs nothing. Idempotent.
    pub fn prepare(&self) -> Result<(), SliceError> {
        if !self.prepared.swap(true, Ordering::AcqRel) {
            if let Some(root) = self.root() {
                self.import_shared(&root)?;
            }
            self.config.freeze();
            tracing::debug!(slice = %self.name, "Slice prepared");
        }

        for child in self.children() {
            child.prepare()?;
        }
        Ok(())
    }

    /// Prepare, then construct every registered component: this slice's first,
    /// then each child in registration order. The first failure aborts.
    pub fn boot(&self) -> Result<(), SliceError> {
        self.prepare()?;
        self.container
            .finalize()
            .map_err(|source| SliceError::Boot {
                slice: self.name.clone(),
                source,
            })?;
        tracing::debug!(slice = %self.name, components = self.container.len(), "Slice booted");

        for child in self.children() {
            child.boot()?;
        }
        Ok(())
    }

    /// Drop memoized components in this slice and all descendants.
    pub fn release(&self) -> Result<usize, SliceError> {
        let mut released = self.container.release()?;
        for child in self.children() {
            released += child.release()?;
        }
        Ok(released)
    }

    /// Visit this slice and every descendant, depth first.
    pub fn walk(self: &Arc<Self>, visit: &mut dyn FnMut(&Arc<Slice>)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// The application slice, if this is not it.
    fn root(&self) -> Option<Arc<Slice>> {
        let mut current = self.parent()?;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        Some(current)
    }

    fn import_shared(&self, root: &Arc<Slice>) -> Result<(), SliceError> {
        let keys = self.settings().shared_component_keys.clone();
        for key in keys {
            if self.container.is_registered(&key) || !root.container.is_registered(&key) {
                continue;
            }
            self.container.register_import(key.as_str(), &root.container, key.as_str())?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SliceError> {
        if self.is_prepared() {
            return Err(SliceError::Sealed {
                slice: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// `"admin"`, `"/admin/"` → `"/admin"`; empty → `"/"`.
fn normalize_mount(at: &str) -> String {
    let trimmed = at.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
