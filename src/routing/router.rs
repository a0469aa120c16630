//! Route table compilation and lookup.
//!
//! # Responsibilities
//! - Flatten declarations into entries owned by slices, prefixes concatenated
//! - Keep only the last declaration per (verb, normalized path)
//! - Resolve actions at compile time when validating, otherwise defer
//! - Recognize requests: found, method not allowed, or not found
//!
//! # Design Decisions
//! - Immutable after compilation (no locking to read)
//! - O(n) scan from the newest entry; later declarations shadow earlier ones
//! - HEAD falls back to GET
//! - Explicit `NotFound` rather than an error

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::http::{Method, StatusCode};

use crate::action::{ActionRef, ActionResolver, Params};
use crate::routing::definition::{Declaration, Routes, Target};
use crate::routing::error::{RouteError, SliceLoadError};
use crate::routing::matcher::{join, PathPattern};
use crate::slice::naming::ActionKey;
use crate::slice::Slice;

/// How a matched route produces its response.
#[derive(Clone)]
pub enum Endpoint {
    /// Action resolved and validated when the table was compiled.
    Resolved(ActionRef),
    /// Action target resolved from the owning slice when a request arrives.
    Deferred(String),
    Inline(ActionRef),
    Redirect { location: String, status: StatusCode },
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Resolved(_) => f.write_str("Resolved"),
            Endpoint::Deferred(target) => write!(f, "Deferred({target:?})"),
            Endpoint::Inline(_) => f.write_str("Inline"),
            Endpoint::Redirect { location, status } => {
                write!(f, "Redirect({location:?}, {})", status.as_u16())
            }
        }
    }
}

/// One effective route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    method: Method,
    pattern: PathPattern,
    target: Target,
    endpoint: Endpoint,
    slice: Arc<Slice>,
    name: Option<String>,
}

impl RouteEntry {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The slice whose container serves this route's action.
    pub fn slice(&self) -> &Arc<Slice> {
        &self.slice
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Result of looking up a request.
#[derive(Debug)]
pub enum Recognition<'a> {
    Found { route: &'a RouteEntry, params: Params },
    /// The path exists for other verbs only.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// A route as listed by [`RouteTable::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub target: String,
    pub slice: String,
    pub name: Option<String>,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8}{:<32}{:<32}[{}]",
            self.method, self.path, self.target, self.slice
        )?;
        if let Some(name) = &self.name {
            write!(f, " as {name}")?;
        }
        Ok(())
    }
}

struct Pending {
    method: Method,
    pattern: PathPattern,
    target: Target,
    slice: Arc<Slice>,
    name: Option<String>,
}

/// Compiled, immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
    names: HashMap<String, usize>,
}

impl RouteTable {
    /// Compile the routes of `app` and of every slice mounted from it.
    ///
    /// A slice's own routes are mounted wherever a route group names it, or at
    /// its registered mount path when no group does. With `validate`, every
    /// action target is resolved now and the first failure is returned.
    pub fn compile(app: &Arc<Slice>, validate: bool) -> Result<Self, RouteError> {
        let mut pending = Vec::new();
        mount(app, "/", &[], &mut pending)?;
        let declared = pending.len();

        // Last declaration per (verb, path) wins.
        let mut last: HashMap<(Method, String), usize> = HashMap::new();
        for (i, p) in pending.iter().enumerate() {
            last.insert((p.method.clone(), p.pattern.key()), i);
        }

        let mut routes = Vec::with_capacity(last.len());
        for (i, p) in pending.into_iter().enumerate() {
            if last.get(&(p.method.clone(), p.pattern.key())) != Some(&i) {
                tracing::debug!(method = %p.method, path = %p.pattern, slice = %p.slice.name(), "Route shadowed");
                continue;
            }
            let endpoint = match &p.target {
                Target::Action(target) if validate => {
                    Endpoint::Resolved(ActionResolver::resolve(&p.slice, target)?)
                }
                Target::Action(target) => Endpoint::Deferred(target.clone()),
                Target::Inline(action) => Endpoint::Inline(Arc::clone(action)),
                Target::Redirect { location, status } => Endpoint::Redirect {
                    location: location.clone(),
                    status: *status,
                },
            };
            routes.push(RouteEntry {
                method: p.method,
                pattern: p.pattern,
                target: p.target,
                endpoint,
                slice: p.slice,
                name: p.name,
            });
        }

        let names = routes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.name.clone().map(|n| (n, i)))
            .collect();

        tracing::debug!(declared, effective = routes.len(), validated = validate, "Route table compiled");
        Ok(Self { routes, names })
    }

    /// Match a request. Scans newest first.
    pub fn recognize(&self, method: &Method, path: &str) -> Recognition<'_> {
        if let Some(found) = self.find(method, path) {
            return found;
        }
        if method == Method::HEAD {
            if let Some(found) = self.find(&Method::GET, path) {
                return found;
            }
        }

        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            if !allowed.contains(&route.method) && route.pattern.matches(path).is_some() {
                allowed.push(route.method.clone());
            }
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }

        if allowed.is_empty() {
            Recognition::NotFound
        } else {
            Recognition::MethodNotAllowed { allowed }
        }
    }

    fn find(&self, method: &Method, path: &str) -> Option<Recognition<'_>> {
        self.routes
            .iter()
            .rev()
            .filter(|r| r.method == *method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| Recognition::Found { route, params })
            })
    }

    /// Resolve every deferred action target, returning the first failure.
    pub fn validate(&self) -> Result<(), RouteError> {
        for route in &self.routes {
            if let Endpoint::Deferred(target) = &route.endpoint {
                ActionResolver::validate(&route.slice, target)?;
            }
        }
        Ok(())
    }

    /// Build the path of a named route.
    pub fn path(&self, name: &str, params: &Params) -> Result<String, RouteError> {
        let route = self
            .names
            .get(name)
            .and_then(|&i| self.routes.get(i))
            .ok_or_else(|| RouteError::UnknownName {
                name: name.to_string(),
            })?;
        route
            .pattern
            .expand(params)
            .map_err(|param| RouteError::MissingParam {
                name: name.to_string(),
                param,
            })
    }

    /// Effective routes in declaration order.
    pub fn inspect(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .map(|r| RouteInfo {
                method: r.method.to_string(),
                path: r.pattern.to_string(),
                target: r.target.to_string(),
                slice: r.slice.name().to_string(),
                name: r.name.clone(),
            })
            .collect()
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collect `slice`'s own routes plus `extra`, all under `at`, then mount any
/// child no group referenced at its registered path.
fn mount(
    slice: &Arc<Slice>,
    at: &str,
    extra: &[Declaration],
    out: &mut Vec<Pending>,
) -> Result<(), RouteError> {
    let own: Option<Arc<Routes>> = slice.route_definitions();
    let own_decls = own.as_deref().map(Routes::declarations).unwrap_or(&[]);

    let mut referenced = HashSet::new();
    collect(slice, at, own_decls, out, &mut referenced)?;
    collect(slice, at, extra, out, &mut referenced)?;

    for child in slice.children() {
        if !referenced.contains(child.name()) {
            let child_at = join(at, child.mount())?;
            mount(&child, &child_at, &[], out)?;
        }
    }
    Ok(())
}

fn collect(
    owner: &Arc<Slice>,
    prefix: &str,
    decls: &[Declaration],
    out: &mut Vec<Pending>,
    referenced: &mut HashSet<String>,
) -> Result<(), RouteError> {
    for decl in decls {
        match decl {
            Declaration::Route(route) => {
                let pattern = PathPattern::parse(&join(prefix, &route.path)?)?;
                if let Target::Action(target) = &route.target {
                    ActionKey::parse(target)?;
                }
                out.push(Pending {
                    method: route.method.clone(),
                    pattern,
                    target: route.target.clone(),
                    slice: Arc::clone(owner),
                    name: route.name.clone(),
                });
            }
            Declaration::Scope { prefix: scope, block } => {
                collect(owner, &join(prefix, scope)?, block, out, referenced)?;
            }
            Declaration::Slice { name, at, block } => {
                referenced.insert(name.clone());
                match owner.child(name) {
                    Some(child) => mount(&child, &join(prefix, at)?, block, out)?,
                    None if owner.is_skipped(name) => {
                        tracing::debug!(slice = %name, "Routes of disabled slice omitted");
                    }
                    None => {
                        return Err(SliceLoadError {
                            name: name.clone(),
                            parent: owner.name().to_string(),
                        }
                        .into());
                    }
                }
            }
        }
    }
    Ok(())
}
