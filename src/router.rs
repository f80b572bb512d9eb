//! Radix-tree request router with scoped middleware.
//!
//! Routes are declared on a [`Router`] builder, grouped into nested scopes,
//! and frozen with [`Router::build`] into a [`RouteTree`]: one `matchit` tree
//! per HTTP method whose leaves carry the terminal plus every middleware it
//! inherited. After `build` the tree is immutable and shared read-only by
//! all request tasks.
//!
//! ```rust
//! # use moc::{BoxFuture, HttpError, Request, RequestContext, Response, Router};
//! # fn auth<'a>(_: &'a (), _: &'a Request, _: &'a mut RequestContext) -> BoxFuture<'a, Result<(), HttpError>> { Box::pin(async { Ok(()) }) }
//! # fn list<'a>(_: &'a (), _: &'a Request, _: &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>> { Box::pin(async { Ok(Response::text("")) }) }
//! # fn drop_one<'a>(_: &'a (), _: &'a Request, _: &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>> { Box::pin(async { Ok(Response::text("")) }) }
//! let tree = Router::new()
//!     .route("/messages", |r| {
//!         r.get("/", list)
//!             .route("/{id}", |r| r.middleware(auth).delete("/", drop_one))
//!     })
//!     .build()
//!     .unwrap();
//! ```

use std::collections::HashMap;

use http::Method;
use matchit::{InsertError, Router as MatchitRouter};
use thiserror::Error;

use crate::handler::{BoxedMiddleware, BoxedTerminal, Middleware, Terminal};

/// A route table that could not be built.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route `{method} {path}` conflicts with `{with}`")]
    Conflict { method: Method, path: String, with: String },

    #[error("invalid route `{path}`: {source}")]
    Invalid {
        path: String,
        #[source]
        source: InsertError,
    },
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// A routing scope.
///
/// Middleware registered on a scope applies to every route of that scope
/// and of its nested scopes, whatever the registration order, and runs
/// after the middleware of enclosing scopes. Middleware on the root scope is
/// special: it runs for every request, including those that match nothing.
pub struct Router<S> {
    prefix: String,
    middleware: Vec<BoxedMiddleware<S>>,
    routes: Vec<(Method, String, BoxedTerminal<S>)>,
    scopes: Vec<Router<S>>,
}

impl<S: Send + Sync + 'static> Router<S> {
    pub fn new() -> Self {
        Self::scoped(String::new())
    }

    fn scoped(prefix: String) -> Self {
        Self { prefix, middleware: Vec::new(), routes: Vec::new(), scopes: Vec::new() }
    }

    /// Appends `m` to this scope's chain.
    pub fn middleware(mut self, m: impl Middleware<S>) -> Self {
        self.middleware.push(m.into_boxed());
        self
    }

    /// Registers a terminal for a method and a pattern relative to this
    /// scope. Path parameters use `{name}` syntax.
    pub fn on(mut self, method: Method, pattern: &str, terminal: impl Terminal<S>) -> Self {
        let path = join(&self.prefix, pattern);
        self.routes.push((method, path, terminal.into_boxed()));
        self
    }

    pub fn get(self, pattern: &str, terminal: impl Terminal<S>) -> Self {
        self.on(Method::GET, pattern, terminal)
    }

    pub fn post(self, pattern: &str, terminal: impl Terminal<S>) -> Self {
        self.on(Method::POST, pattern, terminal)
    }

    pub fn put(self, pattern: &str, terminal: impl Terminal<S>) -> Self {
        self.on(Method::PUT, pattern, terminal)
    }

    pub fn delete(self, pattern: &str, terminal: impl Terminal<S>) -> Self {
        self.on(Method::DELETE, pattern, terminal)
    }

    /// Opens a nested scope under `prefix`.
    pub fn route(mut self, prefix: &str, configure: impl FnOnce(Router<S>) -> Router<S>) -> Self {
        let scope = configure(Self::scoped(join(&self.prefix, prefix)));
        self.scopes.push(scope);
        self
    }

    /// Opens a nested scope with no prefix, to give a few sibling routes
    /// extra middleware.
    pub fn group(self, configure: impl FnOnce(Router<S>) -> Router<S>) -> Self {
        self.route("", configure)
    }

    /// Freezes the builder.
    ///
    /// Fails on a duplicate method and path, or on a pattern `matchit`
    /// rejects.
    pub fn build(self) -> Result<RouteTree<S>, RouteError> {
        let mut tree = RouteTree { global: self.middleware, routes: HashMap::new() };
        for (method, path, terminal) in self.routes {
            tree.insert(method, path, Vec::new(), terminal)?;
        }
        for scope in self.scopes {
            scope.flatten(&[], &mut tree)?;
        }
        Ok(tree)
    }

    fn flatten(self, inherited: &[BoxedMiddleware<S>], tree: &mut RouteTree<S>) -> Result<(), RouteError> {
        let chain: Vec<_> = inherited.iter().chain(&self.middleware).cloned().collect();
        for (method, path, terminal) in self.routes {
            tree.insert(method, path, chain.clone(), terminal)?;
        }
        for scope in self.scopes {
            scope.flatten(&chain, tree)?;
        }
        Ok(())
    }
}

impl<S: Send + Sync + 'static> Default for Router<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn join(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, true) => "/".to_owned(),
        (false, true) => prefix.to_owned(),
        (true, false) => format!("/{pattern}"),
        (false, false) => format!("{prefix}/{pattern}"),
    }
}

// ── Frozen tree ───────────────────────────────────────────────────────────────

/// A matched route: its inherited middleware chain and its terminal.
pub(crate) struct Route<S> {
    pub(crate) chain: Vec<BoxedMiddleware<S>>,
    pub(crate) terminal: BoxedTerminal<S>,
}

pub(crate) enum Lookup<'t, S> {
    Found(&'t Route<S>, HashMap<String, String>),
    /// The path exists under other methods, listed here.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The immutable route table produced by [`Router::build`].
pub struct RouteTree<S> {
    pub(crate) global: Vec<BoxedMiddleware<S>>,
    routes: HashMap<Method, MatchitRouter<Route<S>>>,
}

impl<S> RouteTree<S> {
    fn insert(
        &mut self,
        method: Method,
        path: String,
        chain: Vec<BoxedMiddleware<S>>,
        terminal: BoxedTerminal<S>,
    ) -> Result<(), RouteError> {
        let tree = self.routes.entry(method.clone()).or_default();
        tree.insert(path.as_str(), Route { chain, terminal }).map_err(|e| match e {
            InsertError::Conflict { with } => RouteError::Conflict { method, path: path.clone(), with },
            other => RouteError::Invalid { path: path.clone(), source: other },
        })
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, S> {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value, params);
        }

        let mut allowed: Vec<Method> = self
            .routes
            .iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxFuture, HttpError, Request, RequestContext, Response};

    fn noop<'a>(_: &'a (), _: &'a Request, _: &'a mut RequestContext) -> BoxFuture<'a, Result<(), HttpError>> {
        Box::pin(async { Ok(()) })
    }

    fn ok<'a>(_: &'a (), _: &'a Request, _: &'a RequestContext) -> BoxFuture<'a, Result<Response, HttpError>> {
        Box::pin(async { Ok(Response::text("ok")) })
    }

    fn chain_len(tree: &RouteTree<()>, method: Method, path: &str) -> usize {
        match tree.lookup(&method, path) {
            Lookup::Found(route, _) => route.chain.len(),
            _ => panic!("no route for {method} {path}"),
        }
    }

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join("", ""), "/");
        assert_eq!(join("", "/"), "/");
        assert_eq!(join("/messages", "/"), "/messages");
        assert_eq!(join("/messages", "/{id}"), "/messages/{id}");
        assert_eq!(join("/messages/", "{id}"), "/messages/{id}");
        assert_eq!(join("", "healthz"), "/healthz");
    }

    #[test]
    fn nested_scopes_build_full_paths_and_params() {
        let tree = Router::new()
            .route("/messages", |r| r.get("/", ok).route("/{id}", |r| r.get("/", ok)))
            .build()
            .unwrap();

        assert!(matches!(tree.lookup(&Method::GET, "/messages"), Lookup::Found(..)));
        match tree.lookup(&Method::GET, "/messages/42") {
            Lookup::Found(_, params) => assert_eq!(params["id"], "42"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn root_middleware_is_global_not_per_route() {
        let tree = Router::new().middleware(noop).get("/a", ok).build().unwrap();
        assert_eq!(tree.global.len(), 1);
        assert_eq!(chain_len(&tree, Method::GET, "/a"), 0);
    }

    #[test]
    fn scope_middleware_is_inherited_regardless_of_order() {
        let tree = Router::new()
            .route("/outer", |r| {
                r.get("/before", ok)
                    .middleware(noop)
                    .route("/inner", |r| r.middleware(noop).get("/", ok))
            })
            .get("/sibling", ok)
            .build()
            .unwrap();

        assert_eq!(chain_len(&tree, Method::GET, "/outer/before"), 1);
        assert_eq!(chain_len(&tree, Method::GET, "/outer/inner"), 2);
        assert_eq!(chain_len(&tree, Method::GET, "/sibling"), 0);
    }

    #[test]
    fn group_adds_middleware_to_its_routes_only() {
        let tree = Router::new()
            .route("/m/{id}", |r| r.group(|r| r.get("/", ok)).group(|r| r.middleware(noop).delete("/", ok)))
            .build()
            .unwrap();

        assert_eq!(chain_len(&tree, Method::GET, "/m/1"), 0);
        assert_eq!(chain_len(&tree, Method::DELETE, "/m/1"), 1);
    }

    #[test]
    fn unbound_method_is_reported_with_alternatives() {
        let tree = Router::new().get("/m", ok).post("/m", ok).build().unwrap();

        match tree.lookup(&Method::DELETE, "/m") {
            Lookup::MethodNotAllowed(allowed) => assert_eq!(allowed, [Method::GET, Method::POST]),
            _ => panic!("expected method not allowed"),
        }
        assert!(matches!(tree.lookup(&Method::GET, "/nope"), Lookup::NotFound));
    }

    #[test]
    fn duplicate_route_is_a_conflict() {
        let err = Router::new().get("/m", ok).route("/m", |r| r.get("/", ok)).build().err().unwrap();
        assert!(matches!(err, RouteError::Conflict { ref path, .. } if path == "/m"));
    }

    #[test]
    fn same_path_different_method_is_fine() {
        assert!(Router::new().get("/m", ok).delete("/m", ok).build().is_ok());
    }
}
