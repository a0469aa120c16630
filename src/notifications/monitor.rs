//! Request-boundary instrumentation.
//!
//! # Responsibilities
//! - Register the `request.*` events on the canonical bus at composition time
//! - Publish `request.start` before the action runs
//! - Publish `request.finish` exactly once, with status and elapsed time,
//!   whether the action succeeded, failed or panicked

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use crate::action::{Params, Request};
use crate::notifications::bus::Notifications;
use crate::notifications::event::{
    Payload, RequestPayload, ELAPSED_UNIT, REQUEST_ERROR, REQUEST_FINISH, REQUEST_START,
};

/// Events every monitor registers.
pub const REQUEST_EVENTS: &[&str] = &[REQUEST_START, REQUEST_FINISH, REQUEST_ERROR];

/// Publishes request-boundary events on one bus.
#[derive(Debug, Clone)]
pub struct RequestMonitor {
    bus: Arc<Notifications>,
}

impl RequestMonitor {
    /// Bind to `bus`, registering the request events on it.
    ///
    /// Re-registering is harmless, so this runs on every composition even if a
    /// component already registered (some of) the names.
    pub fn attach(bus: Arc<Notifications>) -> Self {
        for name in REQUEST_EVENTS {
            bus.register_event(name);
        }
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<Notifications> {
        &self.bus
    }

    /// Publish `request.start` and return the guard that publishes `request.finish`.
    pub fn start(&self, request: &Request) -> InFlight {
        let payload = RequestPayload {
            verb: request.method().to_string(),
            path: request.path().to_string(),
            status: None,
            elapsed: 0,
            elapsed_unit: ELAPSED_UNIT,
            remote_address: request.remote_addr().map(|a| a.ip().to_string()),
            params: request.params().clone(),
            error: None,
        };
        self.bus.publish(REQUEST_START, Payload::Request(payload.clone()));

        InFlight {
            bus: Arc::clone(&self.bus),
            started: Instant::now(),
            payload,
            finished: false,
        }
    }
}

/// A request between `request.start` and `request.finish`.
///
/// Dropping it unfinished (e.g. while a handler panics) publishes
/// `request.finish` with status 500.
#[must_use = "dropping the guard publishes request.finish with status 500"]
pub struct InFlight {
    bus: Arc<Notifications>,
    started: Instant,
    payload: RequestPayload,
    finished: bool,
}

impl InFlight {
    /// Replace the params reported on finish (route params merged in).
    pub fn record_params(&mut self, params: &Params) {
        self.payload.params = params.clone();
    }

    pub fn finish(mut self, status: StatusCode) {
        self.complete(status, None);
    }

    /// Publish `request.error`, then `request.finish`.
    pub fn fail(mut self, status: StatusCode, error: &dyn std::fmt::Display) {
        self.complete(status, Some(error.to_string()));
    }

    fn complete(&mut self, status: StatusCode, error: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut payload = self.payload.clone();
        payload.status = Some(status.as_u16());
        payload.elapsed = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        payload.error = error;

        if payload.error.is_some() {
            self.bus.publish(REQUEST_ERROR, Payload::Request(payload.clone()));
        }
        self.bus.publish(REQUEST_FINISH, Payload::Request(payload));
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            let reason = if std::thread::panicking() {
                "handler panicked"
            } else {
                "request abandoned"
            };
            self.complete(StatusCode::INTERNAL_SERVER_ERROR, Some(reason.to_string()));
        }
    }
}
