//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use slicekit::action::{HandlerError, Request, Response};
use slicekit::config::watcher::ReloadRequest;
use slicekit::config::Environment;
use slicekit::notifications::{Event, Notifications};
use slicekit::{Application, HttpServer, Settings, Shutdown};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Settings for an application named `bookshelf` in `env`.
pub fn settings(env: Environment) -> Settings {
    let mut settings = Settings::named("bookshelf");
    settings.env = env;
    settings
}

/// An action that answers with a fixed body.
pub fn text(body: &'static str) -> impl Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static {
    move |_: &Request, res: &mut Response| -> Result<(), HandlerError> {
        res.set_body(body);
        Ok(())
    }
}

/// `bookshelf` with a working `/books` route, a `/users` route whose action is
/// never registered, and an `admin` slice at `/admin`.
pub fn bookshelf(env: Environment) -> Arc<Application> {
    let app = Application::new(settings(env)).unwrap();
    app.register_action("books.index", || text("books")).unwrap();
    app.routes(|r| {
        r.get("/books", "books.index");
        r.get("/users", "users.index");
    })
    .unwrap();

    let admin = app.register_slice("admin", "/admin").unwrap().unwrap();
    admin.register_action("dashboard.show", || text("dashboard")).unwrap();
    admin
        .routes(|r| {
            r.get("/", "dashboard.show");
        })
        .unwrap();
    app
}

/// Record every event with the given name published on `bus`.
pub fn record(bus: &Notifications, name: &str) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.register_event(name);
    bus.subscribe(name, move |event| sink.lock().unwrap().push(event.clone()))
        .unwrap();
    seen
}

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: Arc<Application>) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<ReloadRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(app);
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, reload_rx, shutdown_rx).await.unwrap();
    });
    (addr, shutdown, reload_tx)
}
