//! Outbound response handling.
//!
//! # Responsibilities
//! - Convert an action's [`Response`] into an HTTP response
//! - Map dispatch and boot failures to status codes
//!
//! # Design Decisions
//! - Failure details (including missing-action hints) are shown only in development
//! - Everything else gets a plain status text, so internals never leak

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::action::Response;

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let (status, headers, body) = self.into_parts();
        let mut response = axum::response::Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Plain-text error response; `detail` replaces the status text when shown.
pub fn error_response(status: StatusCode, detail: &str, show_detail: bool) -> axum::response::Response {
    let body = if show_detail {
        detail.to_string()
    } else {
        status.canonical_reason().unwrap_or("Error").to_string()
    };
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_action_response_converts() {
        let mut response = Response::new(StatusCode::CREATED);
        response.set_header(header::LOCATION, "/books/1");
        response.set_body("created");

        let http = response.into_response();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers().get("location").unwrap(), "/books/1");
        let body = axum::body::to_bytes(http.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"created");
    }

    #[tokio::test]
    async fn test_error_detail_hidden() {
        let hidden = error_response(StatusCode::INTERNAL_SERVER_ERROR, "secret", false);
        let body = axum::body::to_bytes(hidden.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");

        let shown = error_response(StatusCode::INTERNAL_SERVER_ERROR, "secret", true);
        let body = axum::body::to_bytes(shown.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"secret");
    }
}
