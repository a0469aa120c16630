//! slicekit demo server.
//!
//! Boots a small "bookshelf" application (an `admin` slice included) and serves
//! it over HTTP, or lists its routes.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use slicekit::action::{Action, HandlerError, Request, Response};
use slicekit::config::watcher::ConfigWatcher;
use slicekit::config::{load_config, loader::apply_env_overrides};
use slicekit::http::HttpServer;
use slicekit::lifecycle::{spawn_signal_handlers, Shutdown};
use slicekit::observability::{init_logging, metrics};
use slicekit::{Application, Settings};

#[derive(Parser)]
#[command(name = "slicekit")]
#[command(about = "Serve or inspect the bookshelf demo application", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the application and serve HTTP (default)
    Serve,
    /// Print the compiled route table
    Routes,
}

struct BooksIndex;

impl Action for BooksIndex {
    fn call(&self, _request: &Request, response: &mut Response) -> Result<(), HandlerError> {
        response.set_json(&serde_json::json!({ "books": ["Dune", "Hyperion"] }))?;
        Ok(())
    }
}

struct BooksShow;

impl Action for BooksShow {
    fn call(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError> {
        let id = request.param("id").ok_or("missing id")?;
        response.set_json(&serde_json::json!({ "id": id }))?;
        Ok(())
    }
}

fn bookshelf(settings: Settings) -> slicekit::Result<Arc<Application>> {
    let app = Application::new(settings)?;
    app.register_action("books.index", || BooksIndex)?;
    app.register_action("books.show", || BooksShow)?;
    app.routes(|r| {
        r.root(slicekit::inline(|_, res| {
            res.set_body("bookshelf");
            Ok(())
        }));
        r.get("/books", "books.index").as_name("books");
        r.get("/books/:id", "books.show").as_name("book");
        r.redirect("/library", "/books");
    })?;

    if let Some(admin) = app.register_slice("admin", "/admin")? {
        admin.register_action("dashboard.show", || {
            |_: &Request, res: &mut Response| -> Result<(), HandlerError> {
                res.set_body("admin dashboard");
                Ok(())
            }
        })?;
        admin.routes(|r| {
            r.get("/", "dashboard.show").as_name("admin");
        })?;
    }
    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut settings = Settings::named("bookshelf");
            apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
            settings
        }
    };
    init_logging(&settings.logger)?;

    tracing::info!(
        app = %settings.app.name,
        env = %settings.env,
        bind_address = %settings.server.bind_address,
        "slicekit v0.1.0 starting"
    );

    let app = bookshelf(settings.clone())?;

    if let Some(Commands::Routes) = cli.command {
        for route in app.route_table()?.inspect() {
            println!("{route}");
        }
        return Ok(());
    }

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Eager in production, lazy elsewhere. A failure here is fatal.
    app.start()?;
    slicekit::app::context::install(Arc::clone(&app))?;

    let listener = TcpListener::bind(&settings.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let (watcher, reload_rx) = ConfigWatcher::new(&settings.app.root);
    let reload_tx = watcher.sender();
    let _watch_guard = if settings.code_reloading() {
        match watcher.run() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Source watcher unavailable, reloading disabled");
                None
            }
        }
    } else {
        None
    };
    let signals = spawn_signal_handlers(shutdown.clone(), reload_tx);

    let server = HttpServer::new(app);
    server.run(listener, reload_rx, shutdown.subscribe()).await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
