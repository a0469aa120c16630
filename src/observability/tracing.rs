//! Request spans for the HTTP layer.
//!
//! The span carries the request id assigned by the request-id layer, so every
//! event logged while an action runs is correlated with its request.

use axum::http::Request;

use crate::http::request::RequestIdExt;

/// Span for one HTTP request; used with `TraceLayer::make_span_with`.
pub fn request_span<B>(request: &Request<B>) -> tracing::Span {
    let request_id = request.request_id().unwrap_or("unknown");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}
