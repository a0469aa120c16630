//! slicekit: a modular web application kernel.
//!
//! An application is a tree of slices. Each slice owns a component container,
//! a settings copy and route declarations; the application compiles them into
//! one route table and dispatches requests to actions resolved by key.
//!
//! # Architecture Overview
//!
//! ```text
//!   Settings (config)          Application (app)
//!        │                          │ builder → base components
//!        ▼                          ▼
//!   Configuration ───────▶  root Slice ──┬── Slice "admin" ── Slice "reports"
//!   (frozen on prepare)     Container    └── Slice "blog"
//!                                 │
//!                   prepare / boot pipeline
//!                                 ▼
//!   HTTP (http) ──▶ Dispatcher ──▶ RouteTable (routing) ──▶ Action (action)
//!                        │
//!                        └── RequestMonitor ──▶ Notifications ──▶ Logger, metrics
//! ```

pub mod action;
pub mod app;
pub mod config;
pub mod container;
pub mod http;
pub mod lifecycle;
pub mod notifications;
pub mod observability;
pub mod routing;
pub mod slice;

pub use action::{handler, Action, ActionRef, MissingActionError, Request, Response};
pub use app::{Application, BootError, BootMode, BootState, Plugin};
pub use config::{Configuration, Settings};
pub use container::Container;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use notifications::Notifications;
pub use routing::{inline, Routes};
pub use slice::Slice;

/// Any failure surfaced by the public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Boot(#[from] app::BootError),

    #[error(transparent)]
    Dispatch(#[from] http::DispatchError),

    #[error(transparent)]
    Route(#[from] routing::RouteError),

    #[error(transparent)]
    Slice(#[from] slice::SliceError),

    #[error(transparent)]
    Container(#[from] container::ContainerError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Context(#[from] app::ContextError),
}

impl Error {
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Boot(e) => e.as_label(),
            Error::Dispatch(e) => e.as_label(),
            Error::Route(e) => e.as_label(),
            Error::Slice(e) => e.as_label(),
            Error::Container(e) => e.as_label(),
            Error::Config(e) => e.as_label(),
            Error::Context(e) => e.as_label(),
        }
    }

    /// The missing-action failure, wherever it surfaced.
    pub fn missing_action(&self) -> Option<&MissingActionError> {
        match self {
            Error::Boot(e) => e.missing_action(),
            Error::Dispatch(e) => e.missing_action(),
            Error::Route(e) => e.missing_action(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
