//! Process-wide context. Kept in its own binary: it mutates global state.

use slicekit::app::{context, Application, ContextError, Plugin};
use slicekit::config::Environment;
use slicekit::container::BoxError;

mod common;

struct Greeting;

impl Plugin for Greeting {
    fn name(&self) -> &str {
        "greeting"
    }

    fn prepare(&self, app: &Application) -> Result<(), BoxError> {
        app.container().register_value("greeting", String::from("hello"))?;
        Ok(())
    }
}

#[test]
fn test_plugins_and_current_application() {
    context::reset();
    assert!(context::current().is_none());

    context::register_plugin(Greeting).unwrap();
    let app = Application::new(common::settings(Environment::Test)).unwrap();
    app.prepare().unwrap();
    let greeting = app.container().resolve_as::<String>("greeting").unwrap();
    assert_eq!(greeting.as_str(), "hello");

    context::install(app.clone()).unwrap();
    assert_eq!(context::current().unwrap().name(), "bookshelf");

    let second = Application::new(common::settings(Environment::Test)).unwrap();
    assert_eq!(
        context::install(second).unwrap_err(),
        ContextError::AlreadyInstalled {
            current: "bookshelf".to_string()
        }
    );
    assert!(matches!(
        context::register_plugin(Greeting),
        Err(ContextError::Sealed { .. })
    ));

    context::reset();
    assert!(context::current().is_none());
    assert!(context::plugins().is_empty());
}
