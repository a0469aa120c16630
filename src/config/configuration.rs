//! Freezable settings holder owned by a slice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::config::loader::ConfigError;
use crate::config::schema::Settings;

/// Settings of one slice (or the application).
///
/// Writable through [`Configuration::configure`] until [`Configuration::freeze`];
/// readers always get an immutable `Arc<Settings>` snapshot.
#[derive(Debug)]
pub struct Configuration {
    current: ArcSwap<Settings>,
    frozen: AtomicBool,
    /// Serializes writers against each other and against `freeze`.
    write_lock: Mutex<()>,
}

impl Configuration {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
            frozen: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn settings(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Apply a mutation. Fails once the configuration is frozen.
    pub fn configure<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().expect("configuration mutex poisoned");
        if self.frozen.load(Ordering::Acquire) {
            return Err(ConfigError::Frozen);
        }
        let mut next = Settings::clone(&self.current.load());
        f(&mut next);
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Make the configuration read-only. Idempotent.
    pub fn freeze(&self) {
        let _guard = self.write_lock.lock().expect("configuration mutex poisoned");
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Look up a value by dotted key, e.g. `"actions.default_content_type"`.
    pub fn get(&self, key: &str) -> Option<toml::Value> {
        lookup(&self.settings(), key)
    }

    /// Build the settings a child slice starts from: these settings plus the
    /// `[slice.<name>]` override table, deep-merged.
    pub fn seed_for_slice(&self, slice_name: &str) -> Result<Settings, ConfigError> {
        seed_slice_settings(&self.settings(), slice_name)
    }
}

/// Dotted lookup over the serialized settings tree.
pub fn lookup(settings: &Settings, key: &str) -> Option<toml::Value> {
    let root = toml::Value::try_from(settings).ok()?;
    key.split('.')
        .try_fold(&root, |value, segment| value.get(segment))
        .cloned()
}

fn seed_slice_settings(parent: &Settings, slice_name: &str) -> Result<Settings, ConfigError> {
    let mut base = parent.clone();
    let overrides = base.slice_overrides.remove(slice_name);
    // Overrides for grandchildren stay with the parent.
    base.slice_overrides.clear();

    let Some(overrides) = overrides else {
        return Ok(base);
    };

    let mut table = match toml::Value::try_from(&base).map_err(ConfigError::Serialize)? {
        toml::Value::Table(table) => table,
        _ => return Ok(base),
    };
    merge_tables(&mut table, &overrides);

    toml::Value::Table(table)
        .try_into()
        .map_err(|source| ConfigError::SliceOverride {
            slice: slice_name.to_string(),
            source,
        })
}

/// Deep merge: nested tables merge key by key, everything else is replaced.
pub(crate) fn merge_tables(base: &mut toml::Table, overrides: &toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
