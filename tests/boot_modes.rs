//! Eager and lazy boot behavior.

use std::sync::Arc;
use std::thread;

use slicekit::action::Request;
use slicekit::config::Environment;
use slicekit::{Application, BootState};

mod common;

#[test]
fn test_eager_boot_fails_with_hints() {
    let app = common::bookshelf(Environment::Production);

    let err = app.start().unwrap_err();
    let missing = err.missing_action().expect("missing action error");
    assert_eq!(missing.key, "actions.users.index");
    assert_eq!(missing.slice, "bookshelf");
    assert_eq!(missing.type_name, "bookshelf::actions::users::Index");
    assert_eq!(missing.expected_path, "app/actions/users/index.rs");
    assert!(err
        .to_string()
        .contains("define the action type `bookshelf::actions::users::Index` in app/actions/users/index.rs"));
    assert!(app.dispatcher().is_none());
    assert_eq!(app.state(), BootState::Failed);
}

#[test]
fn test_lazy_boot_fails_at_request_time() {
    let app = common::bookshelf(Environment::Development);
    app.start().unwrap();
    assert_eq!(app.state(), BootState::Prepared);

    let books = app.call(Request::get("/books")).unwrap();
    assert_eq!(books.body_text(), "books");
    let dashboard = app.call(Request::get("/admin")).unwrap();
    assert_eq!(dashboard.body_text(), "dashboard");

    let err = app.call(Request::get("/users")).unwrap_err();
    assert_eq!(err.missing_action().unwrap().key, "actions.users.index");

    // The failure is per request; the application keeps serving.
    assert_eq!(app.call(Request::get("/books")).unwrap().body_text(), "books");
}

#[test]
fn test_missing_action_in_slice_points_at_slice_dir() {
    let app = Application::new(common::settings(Environment::Test)).unwrap();
    app.register_action("users.index", || common::text("root users")).unwrap();
    let admin = app.register_slice("admin", "/admin").unwrap().unwrap();
    admin
        .routes(|r| {
            r.get("/users", "users.index");
        })
        .unwrap();

    let err = app.boot().unwrap_err();
    let missing = err.missing_action().unwrap();
    assert_eq!(missing.slice, "admin");
    assert_eq!(missing.type_name, "admin::actions::users::Index");
    assert_eq!(missing.expected_path, "slices/admin/actions/users/index.rs");
}

#[test]
fn test_concurrent_boot_fails_once() {
    let app = common::bookshelf(Environment::Production);

    let labels: Vec<&'static str> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let app = Arc::clone(&app);
                s.spawn(move || app.boot().unwrap_err().as_label())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(labels.iter().filter(|l| **l == "boot_missing_action").count(), 1);
    assert_eq!(labels.iter().filter(|l| **l == "boot_aborted").count(), 7);
    assert!(app.dispatcher().is_none());
}

#[test]
fn test_concurrent_boot_constructs_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let app = Application::new(common::settings(Environment::Production)).unwrap();
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

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| app.boot().unwrap());
        }
    });
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(app.is_booted());
}

#[test]
fn test_slice_mounted_at_root_shadows_app_root() {
    let app = Application::new(common::settings(Environment::Test)).unwrap();
    app.routes(|r| {
        r.root(slicekit::inline(|_, res| {
            res.set_body("application");
            Ok(())
        }));
    })
    .unwrap();
    let main = app.register_slice("main", "/").unwrap().unwrap();
    main.routes(|r| {
        r.root(slicekit::inline(|_, res| {
            res.set_body("main slice");
            Ok(())
        }));
    })
    .unwrap();

    app.boot().unwrap();
    assert_eq!(app.call(Request::get("/")).unwrap().body_text(), "main slice");
}

#[test]
fn test_allow_list_skips_slices() {
    let mut settings = common::settings(Environment::Test);
    settings.slices = Some(vec!["admin".to_string()]);
    let app = Application::new(settings).unwrap();

    assert!(app.register_slice("admin", "/admin").unwrap().is_some());
    assert!(app.register_slice("blog", "/blog").unwrap().is_none());
    app.routes(|r| {
        r.slice("blog", "/blog", |r| {
            r.get("/posts", "posts.index");
        });
    })
    .unwrap();

    // Skipped slices contribute no routes and no errors.
    app.boot().unwrap();
    assert_eq!(app.call(Request::get("/blog/posts")).unwrap().status(), 404);
}
