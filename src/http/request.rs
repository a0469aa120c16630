//! Inbound request handling.
//!
//! # Responsibilities
//! - Assign a request id (UUID v4) unless the client sent one
//! - Buffer the body up to the configured limit
//! - Convert the HTTP request into the server-independent [`action::Request`]
//!
//! # Design Decisions
//! - The request id is set by the outermost layer so every span carries it
//! - Oversized bodies are rejected before dispatch; actions only see complete bodies
//!
//! [`action::Request`]: crate::action::Request

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::action;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// Generates a UUID v4 request id for requests without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Read an id previously set on `request`, if any.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }
}

/// The body exceeded the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTooLarge {
    pub limit: usize,
}

/// Buffer `request` and convert it for dispatch.
pub async fn into_action_request(
    request: Request<Body>,
    max_body_size: usize,
) -> Result<action::Request, BodyTooLarge> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|_| BodyTooLarge { limit: max_body_size })?;

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut converted = action::Request::new(parts.method, target)
        .with_headers(parts.headers)
        .with_body(bytes);
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        converted = converted.with_remote_addr(*addr);
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[tokio::test]
    async fn test_conversion_keeps_query_and_remote_addr() {
        let addr: SocketAddr = "10.0.0.7:5123".parse().unwrap();
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/books?page=2")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title":"Dune"}"#))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        let converted = into_action_request(request, 1024).await.unwrap();
        assert_eq!(converted.method(), &Method::POST);
        assert_eq!(converted.path(), "/books");
        assert_eq!(converted.param("page"), Some("2"));
        assert_eq!(converted.remote_addr(), Some(addr));
        assert_eq!(converted.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        let err = into_action_request(request, 16).await.unwrap_err();
        assert_eq!(err.limit, 16);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let mut make = MakeRequestUuid;
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert!(request.request_id().is_none());

        let tagged = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "req-42")
            .body(())
            .unwrap();
        assert_eq!(tagged.request_id(), Some("req-42"));
    }
}
