//! Boot state, boot modes and boot errors.

use std::fmt;

use thiserror::Error;

use crate::action::MissingActionError;
use crate::container::{BoxError, ContainerError};
use crate::notifications::NotificationError;
use crate::routing::{RouteError, SliceLoadError};
use crate::slice::SliceError;

/// Where an application is in its boot pipeline. Only moves forward; `Failed`
/// is terminal and [`Application::failure`](crate::Application::failure) holds the reason.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootState {
    Unbooted = 0,
    Preparing = 1,
    Prepared = 2,
    Booted = 3,
    Failed = 4,
}

impl From<u8> for BootState {
    fn from(v: u8) -> Self {
        match v {
            0 => BootState::Unbooted,
            1 => BootState::Preparing,
            2 => BootState::Prepared,
            3 => BootState::Booted,
            _ => BootState::Failed,
        }
    }
}

impl BootState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootState::Unbooted => "unbooted",
            BootState::Preparing => "preparing",
            BootState::Prepared => "prepared",
            BootState::Booted => "booted",
            BootState::Failed => "failed",
        }
    }
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far the pipeline runs.
///
/// Both modes share every step up to `Prepared`; `Boot` additionally constructs
/// every component and validates every action before serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Lazy: actions are resolved by the first request that needs them.
    Prepare,
    /// Eager: failures surface here, not at request time.
    Boot,
}

impl BootMode {
    pub(crate) fn target(self) -> BootState {
        match self {
            BootMode::Prepare => BootState::Prepared,
            BootMode::Boot => BootState::Booted,
        }
    }
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    MissingAction(#[from] MissingActionError),

    #[error(transparent)]
    SliceLoad(#[from] SliceLoadError),

    #[error(transparent)]
    Route(RouteError),

    #[error(transparent)]
    Slice(#[from] SliceError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("plugin {plugin} failed to prepare: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// An earlier pipeline run failed; the application will not start.
    #[error("boot of {app} was aborted: {reason}")]
    Aborted { app: String, reason: String },

    #[error("cannot {operation} {app} while it is {state}")]
    InvalidState {
        app: String,
        operation: &'static str,
        state: BootState,
    },

    #[error("code reloading is disabled for {app}")]
    ReloadDisabled { app: String },
}

impl BootError {
    pub fn as_label(&self) -> &'static str {
        match self {
            BootError::MissingAction(_) => "boot_missing_action",
            BootError::SliceLoad(_) => "boot_slice_load",
            BootError::Route(_) => "boot_route",
            BootError::Slice(_) => "boot_slice",
            BootError::Container(_) => "boot_container",
            BootError::Notification(_) => "boot_notification",
            BootError::Plugin { .. } => "boot_plugin",
            BootError::Aborted { .. } => "boot_aborted",
            BootError::InvalidState { .. } => "boot_invalid_state",
            BootError::ReloadDisabled { .. } => "boot_reload_disabled",
        }
    }

    pub fn missing_action(&self) -> Option<&MissingActionError> {
        match self {
            BootError::MissingAction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RouteError> for BootError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::MissingAction(err) => BootError::MissingAction(err),
            RouteError::SliceLoad(err) => BootError::SliceLoad(err),
            other => BootError::Route(other),
        }
    }
}
