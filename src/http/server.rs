//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the application
//! - Wire up middleware (request id, tracing, timeout)
//! - Bind server to listener and shut down gracefully
//! - Apply development reloads while serving

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app::Application;
use crate::config::watcher::ReloadRequest;
use crate::config::Environment;
use crate::http::request::{into_action_request, request_id_header, BodyTooLarge, MakeRequestUuid};
use crate::http::response::error_response;
use crate::observability::tracing::request_span;
use crate::Error;

/// HTTP front end for one [`Application`].
pub struct HttpServer {
    router: Router,
    app: Arc<Application>,
}

impl HttpServer {
    /// Create a server for `app`. The application should already be started.
    pub fn new(app: Arc<Application>) -> Self {
        let router = Self::build_router(Arc::clone(&app));
        Self { router, app }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(app: Arc<Application>) -> Router {
        let settings = app.settings();
        let timeout = Duration::from_secs(settings.server.request_timeout_secs);
        let x_request_id = request_id_header();

        Router::new()
            .fallback(dispatch_handler)
            .with_state(app)
            .layer(TimeoutLayer::new(timeout))
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    /// The composed router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// Run the server until `shutdown_rx` fires, applying reload requests as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        reload_rx: mpsc::UnboundedReceiver<ReloadRequest>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            app = %self.app.name(),
            state = %self.app.state(),
            "HTTP server starting"
        );

        let reloader = tokio::spawn(reload_loop(Arc::clone(&self.app), reload_rx));

        let service = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn reload_loop(app: Arc<Application>, mut reload_rx: mpsc::UnboundedReceiver<ReloadRequest>) {
    while let Some(request) = reload_rx.recv().await {
        // Editors emit bursts of events; one reload covers all of them.
        let mut coalesced = 1;
        while reload_rx.try_recv().is_ok() {
            coalesced += 1;
        }

        let app = Arc::clone(&app);
        match tokio::task::spawn_blocking(move || app.reload()).await {
            Ok(Ok(released)) => {
                tracing::info!(paths = ?request.paths, coalesced, released, "Reload applied");
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, label = err.as_label(), "Reload rejected");
            }
            Err(err) => {
                tracing::error!(error = %err, "Reload task failed");
            }
        }
    }
}

/// Every request goes through the application's dispatcher.
async fn dispatch_handler(
    State(app): State<Arc<Application>>,
    request: Request<Body>,
) -> axum::response::Response {
    let settings = app.settings();
    let show_detail = settings.env == Environment::Development;

    let request = match into_action_request(request, settings.server.max_body_size).await {
        Ok(request) => request,
        Err(BodyTooLarge { limit }) => {
            tracing::warn!(limit, "Request body too large");
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &format!("request body exceeds {limit} bytes"),
                show_detail,
            );
        }
    };

    // Actions are synchronous and may construct components on first use.
    let handler_app = Arc::clone(&app);
    match tokio::task::spawn_blocking(move || handler_app.call(request)).await {
        Ok(Ok(response)) => response.into_response(),
        Ok(Err(err @ Error::Boot(_))) => {
            tracing::error!(app = %app.name(), error = %err, "Application unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string(), show_detail)
        }
        Ok(Err(err)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string(), show_detail),
        Err(err) => {
            tracing::error!(error = %err, "Action panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "action panicked", show_detail)
        }
    }
}
