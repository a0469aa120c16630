//! Route declarations.
//!
//! Declarations are plain data: verb, path, target and optional name, plus
//! nested slice groups and scopes. Nothing is resolved or validated until the
//! declarations are compiled into a [`RouteTable`](crate::routing::RouteTable).

use axum::http::{Method, StatusCode};

use crate::action::{handler, ActionRef, HandlerError, Request, Response};

/// What a route dispatches to.
#[derive(Clone)]
pub enum Target {
    /// Action lookup target such as `"users.index"`, resolved from the owning slice.
    Action(String),
    /// A handler carried by the route itself.
    Inline(ActionRef),
    /// Redirect without invoking any action.
    Redirect { location: String, status: StatusCode },
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Action(target) => write!(f, "Action({target:?})"),
            Target::Inline(_) => f.write_str("Inline"),
            Target::Redirect { location, status } => {
                write!(f, "Redirect({location:?}, {})", status.as_u16())
            }
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Action(target) => f.write_str(target),
            Target::Inline(_) => f.write_str("(inline)"),
            Target::Redirect { location, status } => {
                write!(f, "redirect {} {location}", status.as_u16())
            }
        }
    }
}

impl From<&str> for Target {
    fn from(target: &str) -> Self {
        Target::Action(target.to_string())
    }
}

impl From<String> for Target {
    fn from(target: String) -> Self {
        Target::Action(target)
    }
}

impl From<ActionRef> for Target {
    fn from(action: ActionRef) -> Self {
        Target::Inline(action)
    }
}

/// Inline target from a closure.
pub fn inline<F>(f: F) -> Target
where
    F: Fn(&Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Target::Inline(handler(f))
}

/// One declared route.
#[derive(Debug, Clone)]
pub struct RouteDecl {
    pub method: Method,
    pub path: String,
    pub target: Target,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum Declaration {
    Route(RouteDecl),
    /// Routes of the named child slice, mounted at `at`.
    Slice {
        name: String,
        at: String,
        block: Vec<Declaration>,
    },
    /// Path prefix applied to the block, same owning slice.
    Scope {
        prefix: String,
        block: Vec<Declaration>,
    },
}

/// Ordered route declarations.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    declarations: Vec<Declaration>,
}

/// Handle to the route just declared.
pub struct RouteHandle<'a> {
    decl: &'a mut RouteDecl,
}

impl RouteHandle<'_> {
    /// Name the route for [`RouteTable::path`](crate::routing::RouteTable::path).
    pub fn as_name(self, name: &str) -> Self {
        self.decl.name = Some(name.to_string());
        self
    }
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build declarations with a closure.
    pub fn define<F: FnOnce(&mut Routes)>(define: F) -> Self {
        let mut routes = Self::new();
        define(&mut routes);
        routes
    }

    pub fn route(&mut self, method: Method, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.declarations.push(Declaration::Route(RouteDecl {
            method,
            path: path.to_string(),
            target: to.into(),
            name: None,
        }));
        match self.declarations.last_mut() {
            Some(Declaration::Route(decl)) => RouteHandle { decl },
            _ => unreachable!("route declaration was just pushed"),
        }
    }

    pub fn get(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::GET, path, to)
    }

    pub fn post(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::POST, path, to)
    }

    pub fn put(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::PUT, path, to)
    }

    pub fn patch(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::PATCH, path, to)
    }

    pub fn delete(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::DELETE, path, to)
    }

    pub fn options(&mut self, path: &str, to: impl Into<Target>) -> RouteHandle<'_> {
        self.route(Method::OPTIONS, path, to)
    }

    /// `GET /`, named `root`.
    pub fn root(&mut self, to: impl Into<Target>) -> RouteHandle<'_> {
        self.get("/", to).as_name("root")
    }

    /// Permanent redirect from `from` to `to`.
    pub fn redirect(&mut self, from: &str, to: &str) -> RouteHandle<'_> {
        self.redirect_with(from, to, StatusCode::MOVED_PERMANENTLY)
    }

    pub fn redirect_with(&mut self, from: &str, to: &str, status: StatusCode) -> RouteHandle<'_> {
        self.get(
            from,
            Target::Redirect {
                location: to.to_string(),
                status,
            },
        )
    }

    /// Mount the routes of child slice `name` at `at`, followed by `block`.
    pub fn slice<F>(&mut self, name: &str, at: &str, block: F)
    where
        F: FnOnce(&mut Routes),
    {
        let inner = Routes::define(block);
        self.declarations.push(Declaration::Slice {
            name: name.to_string(),
            at: at.to_string(),
            block: inner.declarations,
        });
    }

    /// Prefix every route in `block` with `prefix`.
    pub fn scope<F>(&mut self, prefix: &str, block: F)
    where
        F: FnOnce(&mut Routes),
    {
        let inner = Routes::define(block);
        self.declarations.push(Declaration::Scope {
            prefix: prefix.to_string(),
            block: inner.declarations,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub(crate) fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_keep_order() {
        let routes = Routes::define(|r| {
            r.root("home.show");
            r.get("/users", "users.index").as_name("users");
            r.slice("admin", "/admin", |r| {
                r.get("/dashboard", "dashboard.show");
            });
            r.redirect("/old", "/new");
        });

        let decls = routes.declarations();
        assert_eq!(decls.len(), 4);
        match &decls[1] {
            Declaration::Route(decl) => {
                assert_eq!(decl.method, Method::GET);
                assert_eq!(decl.name.as_deref(), Some("users"));
                assert!(matches!(&decl.target, Target::Action(t) if t == "users.index"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&decls[2], Declaration::Slice { name, block, .. } if name == "admin" && block.len() == 1));
        match &decls[3] {
            Declaration::Route(decl) => assert_eq!(decl.target.to_string(), "redirect 301 /new"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_inline_target() {
        let routes = Routes::define(|r| {
            r.get("/ping", inline(|_, res| {
                res.set_body("pong");
                Ok(())
            }));
        });
        match &routes.declarations()[0] {
            Declaration::Route(decl) => assert_eq!(decl.target.to_string(), "(inline)"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
