//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from logger settings
//! - Provide the `logger` component registered in every application container
//! - Log one line per request from `request.finish`, with sensitive params filtered
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production, pretty format for development

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::action::Params;
use crate::config::{LogFormat, LoggerConfig, Settings};
use crate::notifications::{
    NotificationError, Notifications, RequestPayload, SubscriptionId, REQUEST_FINISH,
};

/// Replacement for filtered parameter values.
pub const FILTERED: &str = "[FILTERED]";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggerConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
}

/// The application's logger component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    app: String,
    level: String,
    format: LogFormat,
    filters: Vec<String>,
    log_requests: bool,
}

impl Logger {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            app: settings.app.name.clone(),
            level: settings.logger.level.clone(),
            format: settings.logger.format,
            filters: settings.logger.filters.clone(),
            log_requests: settings.logger.log_requests,
        }
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Copy of `params` with filtered keys masked.
    pub fn filter_params(&self, params: &Params) -> Params {
        params
            .iter()
            .map(|(key, value)| {
                if self.filters.iter().any(|f| f == key) {
                    (key.clone(), FILTERED.to_string())
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Emit the log line for a finished request.
    pub fn log_request(&self, request: &RequestPayload) {
        let params = self.filter_params(&request.params);
        let status = request.status.unwrap_or_default();
        let remote = request.remote_address.as_deref().unwrap_or("-");

        if status >= 500 {
            tracing::error!(
                app = %self.app,
                verb = %request.verb,
                path = %request.path,
                status,
                elapsed = request.elapsed,
                elapsed_unit = request.elapsed_unit,
                remote_address = %remote,
                params = ?params,
                error = request.error.as_deref().unwrap_or(""),
                "Request failed"
            );
        } else {
            tracing::info!(
                app = %self.app,
                verb = %request.verb,
                path = %request.path,
                status,
                elapsed = request.elapsed,
                elapsed_unit = request.elapsed_unit,
                remote_address = %remote,
                params = ?params,
                "Request completed"
            );
        }
    }

    /// Subscribe to `request.finish` on `bus`. Returns `None` when request
    /// logging is disabled.
    pub fn subscribe(
        self: &Arc<Self>,
        bus: &Notifications,
    ) -> Result<Option<SubscriptionId>, NotificationError> {
        if !self.log_requests {
            return Ok(None);
        }
        let logger = Arc::clone(self);
        let id = bus.subscribe(REQUEST_FINISH, move |event| {
            if let Some(request) = event.request() {
                logger.log_request(request);
            }
        })?;
        Ok(Some(id))
    }
}
