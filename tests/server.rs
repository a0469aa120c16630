//! End-to-end HTTP tests against a running server.

use std::sync::Arc;
use std::time::Duration;

use slicekit::config::watcher::ReloadRequest;
use slicekit::config::Environment;

mod common;

#[tokio::test]
async fn test_serves_slices_over_http() {
    let app = common::bookshelf(Environment::Development);
    app.start().unwrap();
    let (addr, shutdown, _reload) = common::spawn_server(Arc::clone(&app)).await;
    let client = reqwest::Client::new();

    let books = client.get(format!("http://{addr}/books")).send().await.unwrap();
    assert_eq!(books.status(), 200);
    assert!(books.headers().contains_key("x-request-id"));
    assert_eq!(
        books.headers().get("content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(books.text().await.unwrap(), "books");

    let admin = client.get(format!("http://{addr}/admin")).send().await.unwrap();
    assert_eq!(admin.text().await.unwrap(), "dashboard");

    let missing = client.get(format!("http://{addr}/users")).send().await.unwrap();
    assert_eq!(missing.status(), 500);
    let body = missing.text().await.unwrap();
    assert!(body.contains("To fix this, define the action type `bookshelf::actions::users::Index`"));

    let not_allowed = client.delete(format!("http://{addr}/books")).send().await.unwrap();
    assert_eq!(not_allowed.status(), 405);
    assert_eq!(not_allowed.headers().get("allow").unwrap(), "GET, HEAD");

    shutdown.trigger();
}

#[tokio::test]
async fn test_errors_are_opaque_outside_development() {
    let app = common::bookshelf(Environment::Test);
    app.start().unwrap();
    let (addr, shutdown, _reload) = common::spawn_server(app).await;

    let missing = reqwest::get(format!("http://{addr}/users")).await.unwrap();
    assert_eq!(missing.status(), 500);
    assert_eq!(missing.text().await.unwrap(), "Internal Server Error");

    shutdown.trigger();
}

#[tokio::test]
async fn test_reload_request_rebuilds_components() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let app = slicekit::Application::new(common::settings(Environment::Development)).unwrap();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    app.register_action("books.index", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        common::text("books")
    })
    .unwrap();
    app.routes(|r| {
        r.get("/books", "books.index");
    })
    .unwrap();
    app.start().unwrap();

    let (addr, shutdown, reload) = common::spawn_server(Arc::clone(&app)).await;
    let url = format!("http://{addr}/books");
    reqwest::get(&url).await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);

    reload.send(ReloadRequest { paths: vec!["app/actions/books/index.rs".into()] }).unwrap();
    // Give the reload loop a moment to apply the request.
    let mut rebuilt = false;
    for _ in 0..50 {
        reqwest::get(&url).await.unwrap();
        if built.load(Ordering::SeqCst) == 2 {
            rebuilt = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rebuilt);

    shutdown.trigger();
}
