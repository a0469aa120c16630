//! Keyed component registry with memoized, lazily constructed entries.
//!
//! # Responsibilities
//! - Store factories and pre-built values under string keys
//! - Construct each entry at most once and hand out the same `Arc` afterwards
//! - Report presence without constructing (`is_resolved`)
//! - Resolve everything up front when finalized (eager boot)
//! - Drop memoized instances on release (code reloading only)
//!
//! # Design Decisions
//! - One builder per entry: a second resolver of the same key waits until the first
//!   finishes, then sees the memoized instance
//! - Factories run with no lock held; a factory that fails or panics leaves the
//!   entry unbuilt, and the next resolver constructs it again
//! - Factories receive the container, so components can resolve their dependencies
//! - Cycles become `CircularDependency` instead of a deadlock. A thread-local stack
//!   catches them on one thread; a process-wide wait-for graph of builders and
//!   waiters catches them across threads and across containers (imports)

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::container::error::{BoxError, ContainerError};

/// A resolved component.
pub type Component = Arc<dyn Any + Send + Sync>;

type FactoryFn = dyn Fn(&Container) -> Result<Component, BoxError> + Send + Sync;

/// (container id, key): identifies an entry across every container in the process.
type EntryId = (u64, String);

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Entries currently being constructed on this thread.
    static RESOLVING: RefCell<Vec<EntryId>> = const { RefCell::new(Vec::new()) };
}

/// Registration policy, derived from settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerPolicy {
    /// Allow replacing a key that has not been resolved yet.
    pub allow_overwrite: bool,
    /// Allow [`Container::release`]. Only set under code reloading.
    pub allow_release: bool,
}

enum Source {
    Factory(Arc<FactoryFn>),
    Value,
}

#[derive(Default)]
struct Slot {
    instance: Option<Component>,
    /// Thread running the factory right now.
    builder: Option<ThreadId>,
}

struct Entry {
    source: Source,
    slot: Mutex<Slot>,
    built: Condvar,
    resolved: AtomicBool,
}

impl Entry {
    fn factory(factory: Arc<FactoryFn>) -> Self {
        Self {
            source: Source::Factory(factory),
            slot: Mutex::new(Slot::default()),
            built: Condvar::new(),
            resolved: AtomicBool::new(false),
        }
    }

    fn value(value: Component) -> Self {
        Self {
            source: Source::Value,
            slot: Mutex::new(Slot {
                instance: Some(value),
                builder: None,
            }),
            built: Condvar::new(),
            resolved: AtomicBool::new(true),
        }
    }

    // No factory ever runs under this lock, so a poisoned guard still holds a consistent slot.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Component registry owned by a slice.
pub struct Container {
    id: u64,
    name: String,
    entries: DashMap<String, Arc<Entry>>,
    order: Mutex<Vec<String>>,
    frozen: AtomicBool,
    policy: ContainerPolicy,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("keys", &self.keys())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Container {
    /// Create an empty container. `name` is the owning slice's name.
    pub fn new(name: impl Into<String>, policy: ContainerPolicy) -> Self {
        Self {
            id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entries: DashMap::new(),
            order: Mutex::new(Vec::new()),
            frozen: AtomicBool::new(false),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> ContainerPolicy {
        self.policy
    }

    /// Register a pre-built value. It counts as resolved immediately.
    pub fn register_value<T>(&self, key: impl Into<String>, value: T) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.insert(key.into(), Entry::value(Arc::new(value)))
    }

    /// Register an infallible factory, invoked on first resolution.
    pub fn register<T, F>(&self, key: impl Into<String>, factory: F) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_with(key, move |_| Ok(factory()))
    }

    /// Register a factory that may resolve dependencies from this container and may fail.
    pub fn register_with<T, F>(&self, key: impl Into<String>, factory: F) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let factory: Arc<FactoryFn> =
            Arc::new(move |c: &Container| factory(c).map(|v| Arc::new(v) as Component));
        self.insert(key.into(), Entry::factory(factory))
    }

    /// Register `key` as an alias of `source_key` in another container.
    ///
    /// The alias resolves to the very instance the other container memoizes. Holds
    /// only a weak reference so slices importing from each other do not leak.
    pub fn register_import(
        &self,
        key: impl Into<String>,
        source: &Arc<Container>,
        source_key: impl Into<String>,
    ) -> Result<(), ContainerError> {
        let key = key.into();
        let source_key = source_key.into();
        let weak: Weak<Container> = Arc::downgrade(source);
        let source_name = source.name().to_string();

        let factory: Arc<FactoryFn> = Arc::new(move |_: &Container| {
            let source = weak.upgrade().ok_or_else(|| ContainerError::NotFound {
                key: source_key.clone(),
                container: source_name.clone(),
            })?;
            source.resolve(&source_key).map_err(BoxError::from)
        });
        self.insert(key, Entry::factory(factory))
    }

    fn insert(&self, key: String, entry: Entry) -> Result<(), ContainerError> {
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                let taken = self.is_frozen()
                    || occupied.get().resolved.load(Ordering::Acquire)
                    || !self.policy.allow_overwrite;
                if taken {
                    return Err(ContainerError::DuplicateRegistration {
                        key: occupied.key().clone(),
                        container: self.name.clone(),
                    });
                }
                tracing::debug!(container = %self.name, key = %occupied.key(), "Overwriting registration");
                occupied.insert(Arc::new(entry));
            }
            MapEntry::Vacant(vacant) => {
                if self.is_frozen() {
                    return Err(ContainerError::Frozen {
                        key: vacant.key().clone(),
                        container: self.name.clone(),
                    });
                }
                self.order_lock().push(vacant.key().clone());
                vacant.insert(Arc::new(entry));
            }
        }
        Ok(())
    }

    fn order_lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a component, constructing it on first access.
    pub fn resolve(&self, key: &str) -> Result<Component, ContainerError> {
        let entry = self
            .entries
            .get(key)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ContainerError::NotFound {
                key: key.to_string(),
                container: self.name.clone(),
            })?;

        // Must run before looking at the slot, or self-dependency would wait on itself.
        let _frame = ResolutionFrame::enter(self.id, key)?;

        let factory = {
            let mut slot = entry.lock();
            loop {
                if let Some(instance) = slot.instance.as_ref() {
                    return Ok(Arc::clone(instance));
                }
                if slot.builder.is_none() {
                    break;
                }
                let _edge = WaitEdge::enter(self.id, key)?;
                slot = entry.built.wait(slot).unwrap_or_else(PoisonError::into_inner);
            }

            let Source::Factory(factory) = &entry.source else {
                // Values are stored at registration and never released.
                unreachable!("value entry without instance");
            };
            let me = thread::current().id();
            slot.builder = Some(me);
            construction().owners.insert((self.id, key.to_string()), me);
            Arc::clone(factory)
        };

        // Clears the builder on every exit, unwinding included.
        let build = BuildGuard {
            entry: &entry,
            id: (self.id, key.to_string()),
        };

        let instance = factory(self).map_err(|source| match source.downcast::<ContainerError>() {
            Ok(inner) if matches!(*inner, ContainerError::CircularDependency { .. }) => *inner,
            Ok(inner) => ContainerError::Construction {
                key: key.to_string(),
                container: self.name.clone(),
                source: inner,
            },
            Err(source) => ContainerError::Construction {
                key: key.to_string(),
                container: self.name.clone(),
                source,
            },
        })?;

        entry.lock().instance = Some(Arc::clone(&instance));
        entry.resolved.store(true, Ordering::Release);
        drop(build);
        tracing::trace!(container = %self.name, key = %key, "Component constructed");
        Ok(instance)
    }

    /// Resolve and downcast to a concrete type.
    pub fn resolve_as<T>(&self, key: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// True if something is registered under `key`, resolved or not.
    pub fn is_registered(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True if `key` has a materialized instance. Never constructs anything.
    pub fn is_resolved(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.resolved.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.order_lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every registered component in registration order, then freeze.
    ///
    /// Stops at the first failure; the container is left unfrozen in that case.
    pub fn finalize(&self) -> Result<(), ContainerError> {
        let keys = self.keys();
        for key in &keys {
            self.resolve(key)?;
        }
        self.freeze();
        tracing::debug!(container = %self.name, components = keys.len(), "Container finalized");
        Ok(())
    }

    /// Refuse new registrations from now on.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Drop every memoized factory instance; factories are kept.
    ///
    /// Only allowed when the policy permits it (code reloading). Values registered
    /// with [`Container::register_value`] survive.
    pub fn release(&self) -> Result<usize, ContainerError> {
        if !self.policy.allow_release {
            tracing::error!(container = %self.name, "Refusing to release components outside code reloading");
            return Err(ContainerError::ReleaseForbidden {
                container: self.name.clone(),
            });
        }

        let entries: Vec<Arc<Entry>> = self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        let mut released = 0;
        for entry in entries {
            if let Source::Factory(_) = entry.source {
                if entry.lock().instance.take().is_some() {
                    released += 1;
                }
                entry.resolved.store(false, Ordering::Release);
            }
        }

        tracing::info!(container = %self.name, released, "Container released");
        Ok(released)
    }
}

/// RAII marker for a key under construction on the current thread.
struct ResolutionFrame;

impl ResolutionFrame {
    fn enter(container: u64, key: &str) -> Result<Self, ContainerError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().position(|(id, k)| *id == container && k == key) {
                let mut chain: Vec<String> = stack[pos..].iter().map(|(_, k)| k.clone()).collect();
                chain.push(key.to_string());
                return Err(ContainerError::CircularDependency {
                    key: key.to_string(),
                    chain,
                });
            }
            stack.push((container, key.to_string()));
            Ok(ResolutionFrame)
        })
    }
}

impl Drop for ResolutionFrame {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Who builds what, and who waits for what, across all threads.
#[derive(Default)]
struct Construction {
    owners: HashMap<EntryId, ThreadId>,
    waiting: HashMap<ThreadId, EntryId>,
}

// Lock order: entry slot, then this graph. The graph never takes a slot lock.
fn construction() -> MutexGuard<'static, Construction> {
    static GRAPH: OnceLock<Mutex<Construction>> = OnceLock::new();
    GRAPH
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Marks the current thread as waiting for another thread's build.
struct WaitEdge;

impl WaitEdge {
    /// Fails instead of waiting when the builder is (transitively) waiting on us.
    fn enter(container: u64, key: &str) -> Result<Self, ContainerError> {
        let me = thread::current().id();
        let mut graph = construction();

        let mut wanted: EntryId = (container, key.to_string());
        let mut chain = vec![key.to_string()];
        for _ in 0..=graph.waiting.len() {
            let Some(&owner) = graph.owners.get(&wanted) else {
                break;
            };
            if owner == me {
                chain.insert(0, wanted.1.clone());
                return Err(ContainerError::CircularDependency {
                    key: key.to_string(),
                    chain,
                });
            }
            let Some(next) = graph.waiting.get(&owner) else {
                break;
            };
            wanted = next.clone();
            chain.push(wanted.1.clone());
        }

        graph.waiting.insert(me, (container, key.to_string()));
        Ok(WaitEdge)
    }
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        construction().waiting.remove(&thread::current().id());
    }
}

/// Releases an entry's builder claim and wakes its waiters.
struct BuildGuard<'a> {
    entry: &'a Entry,
    id: EntryId,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.entry.lock();
        slot.builder = None;
        construction().owners.remove(&self.id);
        drop(slot);
        self.entry.built.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug)]
    struct Repo {
        id: usize,
    }

    fn dev() -> ContainerPolicy {
        ContainerPolicy {
            allow_overwrite: false,
            allow_release: true,
        }
    }

    #[test]
    fn test_resolve_is_memoized() {
        let container = Container::new("main", dev());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        container
            .register("repos.users", move || Repo {
                id: c.fetch_add(1, Ordering::SeqCst),
            })
            .unwrap();

        assert!(!container.is_resolved("repos.users"));
        let a = container.resolve_as::<Repo>("repos.users").unwrap();
        let b = container.resolve_as::<Repo>("repos.users").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(container.is_resolved("repos.users"));
    }

    #[test]
    fn test_release_constructs_new_instance() {
        let container = Container::new("main", dev());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        container
            .register("repo", move || Repo {
                id: c.fetch_add(1, Ordering::SeqCst),
            })
            .unwrap();

        let before = container.resolve_as::<Repo>("repo").unwrap();
        assert_eq!(container.release().unwrap(), 1);
        assert!(!container.is_resolved("repo"));
        let after = container.resolve_as::<Repo>("repo").unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.id, 1);
    }

    #[test]
    fn test_release_forbidden_in_production() {
        let container = Container::new("main", ContainerPolicy::default());
        container.register_value("answer", 42u32).unwrap();
        let err = container.release().unwrap_err();
        assert_eq!(err.as_label(), "container_release_forbidden");
        assert_eq!(*container.resolve_as::<u32>("answer").unwrap(), 42);
    }

    #[test]
    fn test_not_found_names_key() {
        let container = Container::new("admin", dev());
        match container.resolve("actions.users.index") {
            Err(ContainerError::NotFound { key, container }) => {
                assert_eq!(key, "actions.users.index");
                assert_eq!(container, "admin");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_registration() {
        let container = Container::new("main", dev());
        container.register("repo", || Repo { id: 1 }).unwrap();
        let err = container.register("repo", || Repo { id: 2 }).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_overwrite_allowed_only_before_resolution() {
        let policy = ContainerPolicy {
            allow_overwrite: true,
            allow_release: false,
        };
        let container = Container::new("main", policy);
        container.register("repo", || Repo { id: 1 }).unwrap();
        container.register("repo", || Repo { id: 2 }).unwrap();
        assert_eq!(container.resolve_as::<Repo>("repo").unwrap().id, 2);
        assert_eq!(container.keys(), vec!["repo".to_string()]);

        let err = container.register("repo", || Repo { id: 3 }).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_frozen_refuses_new_keys() {
        let container = Container::new("main", dev());
        container.register("repo", || Repo { id: 1 }).unwrap();
        container.finalize().unwrap();
        assert!(container.is_frozen());
        assert!(container.is_resolved("repo"));

        let err = container.register("other", || Repo { id: 2 }).unwrap_err();
        assert!(matches!(err, ContainerError::Frozen { .. }));
        let err = container.register("repo", || Repo { id: 3 }).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_finalize_stops_at_first_failure() {
        let container = Container::new("main", dev());
        container.register("ok", || 1u8).unwrap();
        container
            .register_with::<u8, _>("broken", |c| {
                c.resolve("missing")?;
                Ok(2)
            })
            .unwrap();

        let err = container.finalize().unwrap_err();
        match err {
            ContainerError::Construction { key, source, .. } => {
                assert_eq!(key, "broken");
                assert!(source.to_string().contains("missing"));
            }
            other => panic!("expected construction error, got {other:?}"),
        }
        assert!(!container.is_frozen());
    }

    #[test]
    fn test_dependencies_resolve_through_container() {
        let container = Container::new("main", dev());
        container.register_value("settings.dsn", "sqlite::memory:".to_string()).unwrap();
        container
            .register_with("db", |c| {
                let dsn = c.resolve_as::<String>("settings.dsn")?;
                Ok(format!("connected to {dsn}"))
            })
            .unwrap();

        assert_eq!(
            container.resolve_as::<String>("db").unwrap().as_str(),
            "connected to sqlite::memory:"
        );
    }

    #[test]
    fn test_circular_dependency_is_reported() {
        let container = Container::new("main", dev());
        container
            .register_with::<u8, _>("a", |c| {
                c.resolve("b")?;
                Ok(1)
            })
            .unwrap();
        container
            .register_with::<u8, _>("b", |c| {
                c.resolve("a")?;
                Ok(2)
            })
            .unwrap();

        match container.resolve("a") {
            Err(ContainerError::CircularDependency { chain, .. }) => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected circular dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new("main", dev());
        container.register_value("answer", 42u32).unwrap();
        let err = container.resolve_as::<String>("answer").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_import_shares_instance() {
        let app = Arc::new(Container::new("app", dev()));
        app.register("logger", || Repo { id: 7 }).unwrap();
        let slice = Container::new("admin", dev());
        slice.register_import("logger", &app, "logger").unwrap();

        let from_slice = slice.resolve_as::<Repo>("logger").unwrap();
        let from_app = app.resolve_as::<Repo>("logger").unwrap();
        assert!(Arc::ptr_eq(&from_slice, &from_app));
    }

    #[test]
    fn test_concurrent_first_resolution_constructs_once() {
        let container = Arc::new(Container::new("main", dev()));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        container
            .register("slow", move || {
                thread::sleep(Duration::from_millis(50));
                Repo {
                    id: c.fetch_add(1, Ordering::SeqCst),
                }
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = container.clone();
                thread::spawn(move || container.resolve_as::<Repo>("slow").unwrap())
            })
            .collect();
        let instances: Vec<Arc<Repo>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_panicking_factory_can_be_retried() {
        let container = Container::new("main", dev());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        container
            .register("flaky", move || {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first construction fails");
                }
                7u32
            })
            .unwrap();

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| container.resolve("flaky")));
        assert!(first.is_err());
        assert!(!container.is_resolved("flaky"));

        assert_eq!(*container.resolve_as::<u32>("flaky").unwrap(), 7);
        assert_eq!(container.release().unwrap(), 1);
        assert_eq!(*container.resolve_as::<u32>("flaky").unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cross_thread_cycle_is_reported() {
        let container = Arc::new(Container::new("main", dev()));
        let gate = Arc::new(std::sync::Barrier::new(2));

        for (key, dependency) in [("a", "b"), ("b", "a")] {
            let gate = gate.clone();
            let entered = AtomicBool::new(false);
            container
                .register_with::<u8, _>(key, move |c| {
                    // Both threads hold their own entry before either asks for the other.
                    if !entered.swap(true, Ordering::SeqCst) {
                        gate.wait();
                    }
                    c.resolve(dependency)?;
                    Ok(1)
                })
                .unwrap();
        }

        let (tx, rx) = std::sync::mpsc::channel();
        for key in ["a", "b"] {
            let container = container.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let _ = tx.send((key, container.resolve(key)));
            });
        }

        for _ in 0..2 {
            let (key, result) = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("resolution deadlocked");
            match result {
                Err(ContainerError::CircularDependency { chain, .. }) => {
                    assert!(chain.contains(&"a".to_string()), "{key}: {chain:?}");
                    assert!(chain.contains(&"b".to_string()), "{key}: {chain:?}");
                }
                other => panic!("{key}: expected circular dependency, got {other:?}"),
            }
        }
        assert!(!container.is_resolved("a"));
        assert!(!container.is_resolved("b"));
    }
}
