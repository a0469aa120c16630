//! Metrics collection and exposition.
//!
//! # Metrics
//! - `slicekit_requests_total` (counter): requests by verb, status, slice-independent
//! - `slicekit_request_duration_seconds` (histogram): latency by verb
//! - `slicekit_request_errors_total` (counter): failed requests by verb
//!
//! # Design Decisions
//! - Recorded from `request.finish`, so every dispatched request counts once
//! - Without an installed recorder the macros are no-ops

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::notifications::{
    NotificationError, Notifications, RequestPayload, SubscriptionId, REQUEST_FINISH,
};

/// Install the Prometheus recorder with its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(request: &RequestPayload) {
    let status = request.status.unwrap_or_default().to_string();
    counter!(
        "slicekit_requests_total",
        "verb" => request.verb.clone(),
        "status" => status
    )
    .increment(1);
    histogram!("slicekit_request_duration_seconds", "verb" => request.verb.clone())
        .record(request.elapsed as f64 / 1_000_000.0);
    if request.error.is_some() {
        counter!("slicekit_request_errors_total", "verb" => request.verb.clone()).increment(1);
    }
}

/// Record metrics for every `request.finish` published on `bus`.
pub fn subscribe(bus: &Notifications) -> Result<SubscriptionId, NotificationError> {
    bus.subscribe(REQUEST_FINISH, |event| {
        if let Some(request) = event.request() {
            record_request(request);
        }
    })
}
