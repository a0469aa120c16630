//! Translation of route targets into action instances.
//!
//! # Responsibilities
//! - Derive the container key from a route target
//! - Resolve it from the owning slice's container, and only there
//! - Turn a registry miss into a `MissingActionError` with type and path hints

use thiserror::Error;

use crate::action::ActionRef;
use crate::container::ContainerError;
use crate::slice::naming::{ActionKey, InvalidTarget};
use crate::slice::Slice;

/// A route points at an action key nothing was registered under.
///
/// Carries everything needed to fix it: the key, the type to define, the slice
/// that owns the route and the conventional file for that type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "could not find action with key \"{key}\" in slice {slice}\n\n\
     To fix this, define the action type `{type_name}` in {expected_path}"
)]
pub struct MissingActionError {
    pub key: String,
    pub type_name: String,
    pub slice: String,
    pub expected_path: String,
}

impl MissingActionError {
    /// Build the diagnostic for `key` in `slice` from the naming conventions.
    pub fn new(slice: &Slice, key: &ActionKey) -> Self {
        let layout = slice.layout();
        let inflector = slice.inflector();
        Self {
            key: key.container_key(),
            type_name: layout.action_type_name(key, &inflector),
            slice: slice.name().to_string(),
            expected_path: layout.action_source_path(key),
        }
    }
}

/// Why an action could not be produced for a route.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    MissingAction(#[from] MissingActionError),

    #[error(transparent)]
    InvalidTarget(#[from] InvalidTarget),

    /// The key exists but constructing the action failed.
    #[error("action \"{key}\" in slice {slice} could not be loaded: {source}")]
    Load {
        key: String,
        slice: String,
        #[source]
        source: ContainerError,
    },
}

impl ResolveError {
    pub fn missing_action(&self) -> Option<&MissingActionError> {
        match self {
            ResolveError::MissingAction(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolves route targets against a single slice's container.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionResolver;

impl ActionResolver {
    /// Resolve `target` (e.g. `"users.index"`) in `slice`.
    ///
    /// Never looks at sibling or parent containers.
    pub fn resolve(slice: &Slice, target: &str) -> Result<ActionRef, ResolveError> {
        let key = ActionKey::parse(target)?;
        let container_key = key.container_key();

        match slice.container().resolve_as::<ActionRef>(&container_key) {
            Ok(action) => Ok(ActionRef::clone(&action)),
            Err(ContainerError::NotFound { .. }) => {
                let err = MissingActionError::new(slice, &key);
                tracing::debug!(
                    slice = %err.slice,
                    key = %err.key,
                    expected_path = %err.expected_path,
                    "Action missing"
                );
                Err(err.into())
            }
            Err(source) => Err(ResolveError::Load {
                key: container_key,
                slice: slice.name().to_string(),
                source,
            }),
        }
    }

    /// Check that `target` resolves, discarding the instance.
    pub fn validate(slice: &Slice, target: &str) -> Result<(), ResolveError> {
        Self::resolve(slice, target).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::action::{Request, Response};
    use crate::config::Settings;

    struct Index;

    impl crate::action::Action for Index {
        fn call(&self, _: &Request, response: &mut Response) -> Result<(), crate::action::HandlerError> {
            response.set_body("index");
            Ok(())
        }
    }

    #[test]
    fn test_resolves_registered_action() {
        let root = Slice::application(Settings::named("bookshelf"));
        root.register_action("users.index", || Index).unwrap();

        let a = ActionResolver::resolve(&root, "users.index").unwrap();
        let b = ActionResolver::resolve(&root, "users.index").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_missing_action_carries_hints() {
        let root = Slice::application(Settings::named("bookshelf"));
        let err = ActionResolver::resolve(&root, "users.index").err().unwrap();
        let missing = err.missing_action().expect("missing action");

        assert_eq!(missing.key, "actions.users.index");
        assert_eq!(missing.type_name, "bookshelf::actions::users::Index");
        assert_eq!(missing.slice, "bookshelf");
        assert_eq!(missing.expected_path, "app/actions/users/index.rs");
        assert!(err.to_string().contains("app/actions/users/index.rs"));
    }

    #[test]
    fn test_never_falls_back_to_parent() {
        let root = Slice::application(Settings::named("bookshelf"));
        root.register_action("users.index", || Index).unwrap();
        let admin = root.register_slice("admin", "/admin").unwrap().unwrap();

        let err = ActionResolver::resolve(&admin, "users.index").err().unwrap();
        let missing = err.missing_action().unwrap();
        assert_eq!(missing.slice, "admin");
        assert_eq!(missing.expected_path, "slices/admin/actions/users/index.rs");
    }

    #[test]
    fn test_construction_failure_is_not_missing() {
        let root = Slice::application(Settings::named("bookshelf"));
        root.register_action_with("users.index", |c| {
            c.resolve("repos.users")?;
            Ok(Index)
        })
        .unwrap();

        let err = ActionResolver::resolve(&root, "users.index").err().unwrap();
        assert!(err.missing_action().is_none());
        assert!(matches!(err, ResolveError::Load { .. }));
    }
}
