//! Registry-level errors.

use thiserror::Error;

/// Boxed error returned by component factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by a [`Container`](crate::container::Container).
///
/// These carry only registry-level detail. Routing translates `NotFound` into a
/// [`MissingActionError`](crate::action::MissingActionError) with file-path hints.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Nothing is registered under the key.
    #[error("nothing registered with key \"{key}\" in container {container}")]
    NotFound { key: String, container: String },

    /// The key is taken and may not be overwritten.
    #[error("key \"{key}\" is already registered in container {container}")]
    DuplicateRegistration { key: String, container: String },

    /// New registrations are refused once the container is finalized.
    #[error("container {container} is frozen; cannot register \"{key}\"")]
    Frozen { key: String, container: String },

    /// Release attempted on a container that only allows it under code reloading.
    #[error("container {container} does not allow releasing components outside code reloading")]
    ReleaseForbidden { container: String },

    /// The factory itself failed.
    #[error("failed to construct \"{key}\" in container {container}: {source}")]
    Construction {
        key: String,
        container: String,
        #[source]
        source: BoxError,
    },

    /// The component exists but has another type.
    #[error("component \"{key}\" is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// A factory (directly or indirectly) asked for the key it is building.
    #[error("circular dependency while resolving \"{key}\": {}", chain.join(" -> "))]
    CircularDependency { key: String, chain: Vec<String> },
}

impl ContainerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContainerError::NotFound { .. } => "component_not_found",
            ContainerError::DuplicateRegistration { .. } => "component_duplicate",
            ContainerError::Frozen { .. } => "container_frozen",
            ContainerError::ReleaseForbidden { .. } => "container_release_forbidden",
            ContainerError::Construction { .. } => "component_construction",
            ContainerError::TypeMismatch { .. } => "component_type_mismatch",
            ContainerError::CircularDependency { .. } => "component_circular",
        }
    }

    /// True when the failure is a missing key, as opposed to a broken component.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContainerError::NotFound {
            key: "actions.users.index".into(),
            container: "main".into(),
        };
        assert_eq!(
            err.to_string(),
            "nothing registered with key \"actions.users.index\" in container main"
        );
        assert!(err.is_not_found());

        let err = ContainerError::CircularDependency {
            key: "a".into(),
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().ends_with("a -> b -> a"));
        assert_eq!(err.as_label(), "component_circular");
    }
}
