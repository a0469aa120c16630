//! Request dispatch through a compiled route table.
//!
//! # Data Flow
//! ```text
//! Request
//!     → monitor.start            (request.start)
//!     → RouteTable::recognize
//!         ├─ NotFound         → 404
//!         ├─ MethodNotAllowed → 405 + Allow
//!         └─ Found            → route params merged into the request
//!     → endpoint
//!         ├─ Resolved / Inline → Action::call
//!         ├─ Deferred          → resolve from the owning slice, then call
//!         └─ Redirect          → Location + status
//!     → default content type and headers of the owning slice
//!     → in_flight.finish       (request.finish)
//! ```
//!
//! # Design Decisions
//! - Errors from actions are returned to the caller after `request.finish` is
//!   published; panics unwind through, the in-flight guard still publishes
//! - A deferred route that cannot be resolved fails that request only

use std::sync::Arc;

use axum::http::{header, Method, StatusCode};
use thiserror::Error;

use crate::action::{ActionResolver, HandlerError, MissingActionError, Request, ResolveError, Response};
use crate::config::RouterConfig;
use crate::notifications::RequestMonitor;
use crate::routing::{Endpoint, Recognition, RouteEntry, RouteTable};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    MissingAction(#[from] MissingActionError),

    #[error(transparent)]
    Resolve(ResolveError),

    #[error("{method} {path} failed in slice {slice}: {source}")]
    Handler {
        method: Method,
        path: String,
        slice: String,
        #[source]
        source: HandlerError,
    },
}

impl DispatchError {
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::MissingAction(_) => "dispatch_missing_action",
            DispatchError::Resolve(_) => "dispatch_resolve",
            DispatchError::Handler { .. } => "dispatch_handler",
        }
    }

    pub fn missing_action(&self) -> Option<&MissingActionError> {
        match self {
            DispatchError::MissingAction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingAction(err) => DispatchError::MissingAction(err),
            other => DispatchError::Resolve(other),
        }
    }
}

/// The composed request-handling entry point.
#[derive(Debug)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    monitor: RequestMonitor,
    router: RouterConfig,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>, monitor: RequestMonitor, router: RouterConfig) -> Self {
        Self {
            routes,
            monitor,
            router,
        }
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn monitor(&self) -> &RequestMonitor {
        &self.monitor
    }

    /// Handle one request.
    pub fn call(&self, mut request: Request) -> Result<Response, DispatchError> {
        let mut in_flight = self.monitor.start(&request);

        let (route, params) = match self.routes.recognize(request.method(), request.path()) {
            Recognition::Found { route, params } => (route, params),
            Recognition::NotFound => {
                let response = Response::text(StatusCode::NOT_FOUND, self.router.not_found_body.as_str());
                in_flight.finish(response.status());
                return Ok(response);
            }
            Recognition::MethodNotAllowed { allowed } => {
                let mut response = Response::text(
                    StatusCode::METHOD_NOT_ALLOWED,
                    self.router.not_allowed_body.as_str(),
                );
                let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                response.set_header(header::ALLOW, &allow.join(", "));
                in_flight.finish(response.status());
                return Ok(response);
            }
        };

        request.merge_route_params(params);
        in_flight.record_params(request.params());

        let mut response = Response::new(StatusCode::OK);
        match invoke(route, &request, &mut response) {
            Ok(()) => {
                finalize(route, &request, &mut response);
                in_flight.finish(response.status());
                Ok(response)
            }
            Err(err) => {
                tracing::error!(
                    method = %request.method(),
                    path = %request.path(),
                    slice = %route.slice().name(),
                    error = %err,
                    label = err.as_label(),
                    "Request failed"
                );
                in_flight.fail(StatusCode::INTERNAL_SERVER_ERROR, &err);
                Err(err)
            }
        }
    }
}

fn invoke(route: &RouteEntry, request: &Request, response: &mut Response) -> Result<(), DispatchError> {
    let action = match route.endpoint() {
        Endpoint::Resolved(action) | Endpoint::Inline(action) => Arc::clone(action),
        Endpoint::Deferred(target) => ActionResolver::resolve(route.slice(), target)?,
        Endpoint::Redirect { location, status } => {
            response.redirect_to(location, *status);
            return Ok(());
        }
    };

    action
        .call(request, response)
        .map_err(|source| DispatchError::Handler {
            method: request.method().clone(),
            path: request.path().to_string(),
            slice: route.slice().name().to_string(),
            source,
        })
}

fn finalize(route: &RouteEntry, request: &Request, response: &mut Response) {
    let settings = route.slice().settings();
    if response.header(header::CONTENT_TYPE.as_str()).is_none() {
        response.set_header(header::CONTENT_TYPE, &settings.actions.default_content_type);
    }
    response.apply_default_headers(&settings.actions.default_headers);
    if request.method() == Method::HEAD {
        response.set_body(axum::body::Bytes::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::notifications::{Notifications, REQUEST_FINISH};
    use crate::routing::inline;
    use crate::slice::Slice;
    use std::sync::Mutex;

    fn dispatcher(app: &Arc<Slice>, validate: bool) -> (Dispatcher, Arc<Notifications>) {
        let bus = Arc::new(Notifications::new());
        let table = RouteTable::compile(app, validate).unwrap();
        let monitor = RequestMonitor::attach(bus.clone());
        (Dispatcher::new(Arc::new(table), monitor, RouterConfig::default()), bus)
    }

    #[test]
    fn test_dispatch_applies_defaults() {
        let app = Slice::application(Settings::named("bookshelf"));
        app.register_action("books.show", || {
            |req: &Request, res: &mut Response| -> Result<(), HandlerError> {
                res.set_body(format!("book {}", req.param("id").unwrap_or("?")));
                Ok(())
            }
        })
        .unwrap();
        app.routes(|r| {
            r.get("/books/:id", "books.show");
        })
        .unwrap();

        let (dispatcher, _) = dispatcher(&app, false);
        let response = dispatcher.call(Request::get("/books/3")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_text(), "book 3");
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.header("x-frame-options"), Some("DENY"));
    }

    #[test]
    fn test_not_found_and_not_allowed() {
        let app = Slice::application(Settings::default());
        app.routes(|r| {
            r.post("/books", inline(|_, _| Ok(())));
        })
        .unwrap();
        let (dispatcher, _) = dispatcher(&app, false);

        let missing = dispatcher.call(Request::get("/nope")).unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.body_text(), "Not Found");

        let wrong_verb = dispatcher.call(Request::get("/books")).unwrap();
        assert_eq!(wrong_verb.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(wrong_verb.header("allow"), Some("POST"));
    }

    #[test]
    fn test_deferred_missing_action_fails_at_request() {
        let app = Slice::application(Settings::named("bookshelf"));
        app.routes(|r| {
            r.get("/users", "users.index");
            r.get("/ping", inline(|_, res| {
                res.set_body("pong");
                Ok(())
            }));
        })
        .unwrap();
        let (dispatcher, bus) = dispatcher(&app, false);
        let finishes = Arc::new(Mutex::new(Vec::new()));
        let f = finishes.clone();
        bus.subscribe(REQUEST_FINISH, move |e| {
            f.lock().unwrap().push(e.request().unwrap().status)
        })
        .unwrap();

        assert_eq!(dispatcher.call(Request::get("/ping")).unwrap().body_text(), "pong");
        let err = dispatcher.call(Request::get("/users")).unwrap_err();
        let missing = err.missing_action().unwrap();
        assert_eq!(missing.key, "actions.users.index");
        assert_eq!(missing.expected_path, "app/actions/users/index.rs");
        assert_eq!(*finishes.lock().unwrap(), vec![Some(200), Some(500)]);
    }

    #[test]
    fn test_handler_error_propagates() {
        let app = Slice::application(Settings::default());
        app.routes(|r| {
            r.get("/boom", inline(|_, _| Err("exploded".into())));
        })
        .unwrap();
        let (dispatcher, _) = dispatcher(&app, false);

        let err = dispatcher.call(Request::get("/boom")).unwrap_err();
        assert_eq!(err.as_label(), "dispatch_handler");
        assert!(err.to_string().contains("exploded"));
    }

    #[test]
    fn test_redirect_and_head() {
        let app = Slice::application(Settings::default());
        app.routes(|r| {
            r.redirect("/old", "/new");
            r.get("/new", inline(|_, res| {
                res.set_body("new");
                Ok(())
            }));
        })
        .unwrap();
        let (dispatcher, _) = dispatcher(&app, false);

        let redirect = dispatcher.call(Request::get("/old")).unwrap();
        assert_eq!(redirect.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(redirect.header("location"), Some("/new"));

        let head = dispatcher.call(Request::new(Method::HEAD, "/new")).unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert!(head.body().is_empty());
    }

    #[test]
    fn test_slice_default_headers() {
        let mut settings = Settings::named("bookshelf");
        let overrides: toml::Table =
            toml::from_str("[actions.default_headers]\nx-slice = \"admin\"").unwrap();
        settings.slice_overrides.insert("admin".into(), overrides);
        let app = Slice::application(settings);
        let admin = app.register_slice("admin", "/admin").unwrap().unwrap();
        admin
            .routes(|r| {
                r.get("/", inline(|_, _| Ok(())));
            })
            .unwrap();
        app.routes(|r| {
            r.get("/", inline(|_, _| Ok(())));
        })
        .unwrap();
        let (dispatcher, _) = dispatcher(&app, false);

        let admin_res = dispatcher.call(Request::get("/admin")).unwrap();
        assert_eq!(admin_res.header("x-slice"), Some("admin"));
        let app_res = dispatcher.call(Request::get("/")).unwrap();
        assert_eq!(app_res.header("x-slice"), None);
    }
}
