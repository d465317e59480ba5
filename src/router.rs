//! Radix-tree request router.
//!
//! One matchit tree per HTTP method, plus a tree for endpoints that accept
//! any method (consulted only when the method-specific lookup misses).
//! Path-scoped middleware live in a separate list and are matched against
//! every request regardless of method; all matches run, in registration
//! order.
//!
//! Route templates accept:
//!
//! | segment         | matches                          | captured as    |
//! |-----------------|----------------------------------|----------------|
//! | `:id` / `{id}`  | one segment                      | `id`           |
//! | `*`             | one segment                      | `_0`, `_1`, …  |
//! | `**` (last)     | the rest of the path, or nothing | `_`            |
//! | `**:rest` (last)| the rest of the path, or nothing | `rest`         |
//!
//! The table is built once by [`RouterBuilder::build`] and is read-only
//! afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use matchit::{InsertError, Router as MatchitRouter};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::body;
use crate::context::{CallInput, Context, Params};
use crate::docs;
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, Error};
use crate::handler::{Hook, hook};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::shape::{self, Outcome, Reply, ReturnShape};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Serializable router options.
///
/// ```rust
/// use vane::RouterConfig;
///
/// let config: RouterConfig = serde_json::from_str(r#"{
///     "base_path": "/api",
///     "skip_trailing_slashes": true,
///     "openapi": { "path": "/docs" }
/// }"#).unwrap();
/// assert_eq!(config.openapi.path, "/docs");
/// assert!(!config.openapi.disabled);
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Prefix stripped from every request path. Requests outside it are 404.
    pub base_path: Option<String>,
    /// Hand unrecovered errors back to the caller instead of answering 500.
    pub throw_error: bool,
    /// Media types accepted for request bodies. Endpoint metadata wins.
    pub allowed_media_types: Option<Vec<String>>,
    /// Treat `/a/` and `/a` as the same route.
    pub skip_trailing_slashes: bool,
    pub openapi: OpenApiConfig,
}

/// The generated API reference page.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OpenApiConfig {
    pub disabled: bool,
    pub path: String,
    pub title: String,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self { disabled: false, path: "/api/reference".to_owned(), title: "API Reference".to_owned() }
    }
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

/// What `on_request` decided.
#[derive(Debug)]
pub enum RequestDecision {
    Continue,
    /// Dispatch this request instead.
    Replace(Request),
    /// Answer without dispatching.
    Respond(Response),
}

/// What `on_error` decided.
#[derive(Debug)]
pub enum ErrorDecision {
    Respond(Response),
    /// Fall through to the default policy with this error.
    Continue(Error),
}

type RequestHook = Hook<Arc<Request>, Result<RequestDecision, Error>>;
type ResponseHook = Hook<(Response, Arc<Request>), Result<Response, Error>>;
type ErrorHook = Hook<(Error, Arc<Request>), Result<ErrorDecision, Error>>;

// ── Router ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Route {
    endpoint: Endpoint,
    declared: String,
    /// Exempt from the trailing-slash check.
    lenient: bool,
}

struct ScopedMiddleware {
    matcher: MatchitRouter<()>,
    middleware: Middleware,
}

/// The application router.
///
/// Build it once at startup with [`Router::builder`]; hand it to
/// [`Server::serve`](crate::Server::serve) or call [`handle`](Router::handle)
/// from any host.
pub struct Router {
    config: RouterConfig,
    endpoints: IndexMap<String, Endpoint>,
    routes: HashMap<Method, MatchitRouter<Route>>,
    any: MatchitRouter<Route>,
    middleware: Vec<ScopedMiddleware>,
    context: Map<String, Value>,
    on_request: Option<RequestHook>,
    on_response: Option<ResponseHook>,
    on_error: Option<ErrorHook>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Every registered endpoint by name, routable or not.
    pub fn endpoints(&self) -> &IndexMap<String, Endpoint> {
        &self.endpoints
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Routes one request and produces one response.
    ///
    /// Returns `Err` only when `throw_error` is set, or a hook fails with an
    /// unclassified error.
    pub async fn handle(&self, request: Request) -> Result<Response, Error> {
        let mut request = Arc::new(request);
        if let Some(hook) = &self.on_request {
            match hook(Arc::clone(&request)).await? {
                RequestDecision::Continue => {}
                RequestDecision::Replace(replacement) => request = Arc::new(replacement),
                RequestDecision::Respond(res) => return Ok(res),
            }
        }

        let response = self.process(Arc::clone(&request)).await?;

        match &self.on_response {
            Some(hook) => hook((response, request)).await,
            None => Ok(response),
        }
    }

    async fn process(&self, request: Arc<Request>) -> Result<Response, Error> {
        let Some(path) = self.strip_base(request.path()) else {
            debug!(path = request.path(), "outside base path");
            return Ok(not_found());
        };
        if path.is_empty() || path.contains("//") {
            debug!(path, "malformed path");
            return Ok(not_found());
        }
        let Some((route, params)) = self.lookup(request.method(), path) else {
            debug!(method = %request.method(), path, "no route");
            return Ok(not_found());
        };
        if !self.config.skip_trailing_slashes
            && !route.lenient
            && path.ends_with('/') != route.declared.ends_with('/')
        {
            debug!(path, route = %route.declared, "trailing slash mismatch");
            return Ok(not_found());
        }

        match self.dispatch(&request, path, route, params).await {
            Ok(res) => Ok(res),
            Err(err) => self.recover(err, request).await,
        }
    }

    async fn dispatch(
        &self,
        request: &Arc<Request>,
        path: &str,
        route: &Route,
        params: Params,
    ) -> Result<Response, Error> {
        let endpoint = &route.endpoint;
        let query = body::parse_query(request.query().unwrap_or_default());
        let request = if endpoint.clone_request() {
            Arc::new(Request::clone(request))
        } else {
            Arc::clone(request)
        };
        let body = if endpoint.disable_body() {
            None
        } else {
            let allowed = endpoint
                .metadata()
                .allowed_media_types
                .as_deref()
                .or(self.config.allowed_media_types.as_deref());
            body::decode(&request, allowed).await?
        };

        let input = CallInput {
            method: Some(request.method().clone()),
            path: Some(path.to_owned()),
            params,
            query: Some(Value::Object(query)),
            body,
            headers: None,
            request: Some(request),
            context: self.context.clone(),
            shape: ReturnShape { as_response: true, ..ReturnShape::default() },
        };

        for scoped in &self.middleware {
            let Ok(matched) = scoped.matcher.at(trim_trailing(path)) else { continue };
            let mw_input = CallInput {
                params: collect_params(&matched.params),
                shape: ReturnShape::default(),
                ..input.clone()
            };
            let (reply, _) = scoped.middleware.run(mw_input).await?;
            if let Reply::Response(res) = reply {
                debug!(path, status = %res.status_code(), "path middleware answered");
                return Ok(res);
            }
        }

        match endpoint.call(input).await? {
            Outcome::Response(res) => Ok(res),
            other => Ok(shape::to_response(other.into_reply(), &HeaderMap::new(), None)),
        }
    }

    /// Error policy: hook, then `throw_error`, then classified → response,
    /// else a logged bare 500.
    async fn recover(&self, err: Error, request: Arc<Request>) -> Result<Response, Error> {
        let err = match &self.on_error {
            Some(hook) => match hook((err, request)).await {
                Ok(ErrorDecision::Respond(res)) => return Ok(res),
                Ok(ErrorDecision::Continue(err)) => err,
                Err(thrown) => return thrown.into_response(),
            },
            None => err,
        };
        if self.config.throw_error {
            return Err(err);
        }
        if !err.is_classified() {
            error!(error = %err, "# SERVER_ERROR");
            return Ok(Response::status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        err.into_response()
    }

    fn strip_base<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self.config.base_path.as_deref() {
            None | Some("") | Some("/") => Some(path),
            Some(base) => path.strip_prefix(base.trim_end_matches('/')),
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, Params)> {
        let path = trim_trailing(path);
        let matched = self
            .routes
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok())?;
        Some((matched.value, collect_params(&matched.params)))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

fn not_found() -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

fn collect_params(params: &matchit::Params<'_, '_>) -> Params {
    params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect()
}

/// `/a/b/` → `/a/b`; the root stays `/`.
fn trim_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

// ── Pattern translation ───────────────────────────────────────────────────────

/// A route template in matchit syntax.
#[derive(Debug, Eq, PartialEq)]
struct Pattern {
    /// The pattern itself.
    full: String,
    /// For catch-all templates: the bare prefix, which must match too.
    prefix: Option<String>,
}

fn translate(path: &str) -> Pattern {
    let trimmed = trim_trailing(path);
    let segments: Vec<&str> = trimmed.split('/').collect();
    let last = segments.len() - 1;
    let mut unnamed = 0;
    let mut out = Vec::with_capacity(segments.len());
    let mut prefix = None;

    for (i, segment) in segments.iter().enumerate() {
        let rendered = if i == last && (*segment == "**" || segment.starts_with("**:")) {
            let name = segment.strip_prefix("**:").unwrap_or("_");
            prefix = Some(trim_trailing(&out.join("/")).to_owned());
            format!("{{*{name}}}")
        } else if *segment == "*" {
            unnamed += 1;
            format!("{{_{}}}", unnamed - 1)
        } else if let Some(name) = segment.strip_prefix(':') {
            format!("{{{name}}}")
        } else {
            (*segment).to_owned()
        };
        out.push(rendered);
    }

    Pattern { full: out.join("/"), prefix }
}

/// Patterns for a path-scoped middleware: the path itself and everything
/// below it.
fn scope_patterns(path: &str) -> Vec<String> {
    let pattern = translate(path);
    match pattern.prefix {
        Some(prefix) => vec![prefix, pattern.full],
        None => {
            let below = format!("{}/{{*_}}", pattern.full.trim_end_matches('/'));
            vec![pattern.full, below]
        }
    }
}

fn insert(tree: &mut MatchitRouter<Route>, pattern: &str, route: Route) -> Result<(), ConfigError> {
    tree.insert(pattern, route)
        .map_err(|source| ConfigError::Route { path: pattern.to_owned(), source })
}

fn insert_alias(tree: &mut MatchitRouter<Route>, prefix: &str, route: Route) -> Result<(), ConfigError> {
    match tree.insert(prefix, route) {
        Ok(()) | Err(InsertError::Conflict { .. }) => Ok(()),
        Err(source) => Err(ConfigError::Route { path: prefix.to_owned(), source }),
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Obtained from [`Router::builder`].
#[derive(Default)]
pub struct RouterBuilder {
    config: RouterConfig,
    endpoints: IndexMap<String, Endpoint>,
    middleware: Vec<(String, Middleware)>,
    context: Map<String, Value>,
    on_request: Option<RequestHook>,
    on_response: Option<ResponseHook>,
    on_error: Option<ErrorHook>,
}

impl RouterBuilder {
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an endpoint under `name`. Names are unique; a repeated name
    /// replaces the earlier endpoint.
    pub fn endpoint(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.insert(name.into(), endpoint);
        self
    }

    /// Runs `middleware` before any endpoint whose path falls under `path`,
    /// for every method.
    pub fn middleware(mut self, path: impl Into<String>, middleware: Middleware) -> Self {
        self.middleware.push((path.into(), middleware));
        self
    }

    /// Initial capability bag for every dispatched call.
    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn on_request<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RequestDecision, Error>> + Send + 'static,
    {
        self.on_request = Some(hook(f));
        self
    }

    pub fn on_response<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Response, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        self.on_response = Some(hook(move |(res, req): (Response, Arc<Request>)| f(res, req)));
        self
    }

    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Error, Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ErrorDecision, Error>> + Send + 'static,
    {
        self.on_error = Some(hook(move |(err, req): (Error, Arc<Request>)| f(err, req)));
        self
    }

    /// Builds the route table.
    ///
    /// Pathless and `server_only` endpoints stay callable in-process but get
    /// no route. Fails on conflicting routes and malformed patterns.
    pub fn build(self) -> Result<Router, ConfigError> {
        let mut routes: HashMap<Method, MatchitRouter<Route>> = HashMap::new();
        let mut any = MatchitRouter::new();
        let mut aliases = Vec::new();

        for (name, endpoint) in &self.endpoints {
            if endpoint.metadata().server_only {
                continue;
            }
            let Some(path) = endpoint.path() else {
                debug!(endpoint = %name, "pathless endpoint left unrouted");
                continue;
            };
            let route = Route { endpoint: endpoint.clone(), declared: path.to_owned(), lenient: false };
            let pattern = translate(path);
            match endpoint.methods().as_slice() {
                Some(methods) => {
                    for method in methods {
                        let tree = routes.entry(method.clone()).or_insert_with(MatchitRouter::new);
                        insert(tree, &pattern.full, route.clone())?;
                    }
                }
                None => insert(&mut any, &pattern.full, route.clone())?,
            }
            if let Some(prefix) = pattern.prefix {
                aliases.push((endpoint.methods().as_slice().map(<[Method]>::to_vec), prefix, route));
            }
        }

        if !self.config.openapi.disabled {
            let title = &self.config.openapi.title;
            let document = docs::generate(self.endpoints.values(), title);
            let html = docs::render_html(&document, title);
            let path = collapse_slashes(&self.config.openapi.path);
            let endpoint = Endpoint::builder(path.clone())
                .method(Method::GET)
                .handler(move |_: Context| {
                    let html = html.clone();
                    async move { Ok::<_, Error>(Response::html(html)) }
                })?;
            let route = Route { endpoint, declared: path.clone(), lenient: true };
            insert(routes.entry(Method::GET).or_insert_with(MatchitRouter::new), &translate(&path).full, route)?;
        }

        // A catch-all route's bare prefix yields to an explicit route.
        for (methods, prefix, route) in aliases {
            match methods {
                Some(methods) => {
                    for method in methods {
                        let tree = routes.entry(method).or_insert_with(MatchitRouter::new);
                        insert_alias(tree, &prefix, route.clone())?;
                    }
                }
                None => insert_alias(&mut any, &prefix, route)?,
            }
        }

        let mut middleware = Vec::with_capacity(self.middleware.len());
        for (path, mw) in self.middleware {
            let mut matcher = MatchitRouter::new();
            for pattern in scope_patterns(&path) {
                matcher
                    .insert(pattern.as_str(), ())
                    .map_err(|source| ConfigError::Route { path: path.clone(), source })?;
            }
            middleware.push(ScopedMiddleware { matcher, middleware: mw });
        }

        debug!(
            endpoints = self.endpoints.len(),
            middleware = middleware.len(),
            "router built"
        );

        Ok(Router {
            config: self.config,
            endpoints: self.endpoints,
            routes,
            any,
            middleware,
            context: self.context,
            on_request: self.on_request,
            on_response: self.on_response,
            on_error: self.on_error,
        })
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}
