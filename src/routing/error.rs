//! Routing errors.

use thiserror::Error;

use crate::action::{MissingActionError, ResolveError};
use crate::container::ContainerError;
use crate::routing::matcher::PatternError;
use crate::slice::naming::InvalidTarget;

/// A route group names a slice that was never registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("slice \"{name}\" is not registered in {parent}; register it before routing to it")]
pub struct SliceLoadError {
    /// The unregistered slice name.
    pub name: String,
    /// The slice whose routes referenced it.
    pub parent: String,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    SliceLoad(#[from] SliceLoadError),

    #[error(transparent)]
    MissingAction(#[from] MissingActionError),

    #[error(transparent)]
    InvalidTarget(#[from] InvalidTarget),

    #[error(transparent)]
    InvalidPath(#[from] PatternError),

    #[error("action \"{key}\" in slice {slice} could not be loaded: {source}")]
    ActionLoad {
        key: String,
        slice: String,
        #[source]
        source: ContainerError,
    },

    #[error("no route named \"{name}\"")]
    UnknownName { name: String },

    #[error("route \"{name}\" requires parameter \"{param}\"")]
    MissingParam { name: String, param: String },
}

impl RouteError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RouteError::SliceLoad(_) => "route_slice_load",
            RouteError::MissingAction(_) => "route_missing_action",
            RouteError::InvalidTarget(_) => "route_invalid_target",
            RouteError::InvalidPath(_) => "route_invalid_path",
            RouteError::ActionLoad { .. } => "route_action_load",
            RouteError::UnknownName { .. } => "route_unknown_name",
            RouteError::MissingParam { .. } => "route_missing_param",
        }
    }

    pub fn missing_action(&self) -> Option<&MissingActionError> {
        match self {
            RouteError::MissingAction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolveError> for RouteError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingAction(err) => RouteError::MissingAction(err),
            ResolveError::InvalidTarget(err) => RouteError::InvalidTarget(err),
            ResolveError::Load { key, slice, source } => RouteError::ActionLoad { key, slice, source },
        }
    }
}
