//! Endpoints: handlers bound to a path, methods, schemas and middleware.
//!
//! An [`Endpoint`] is declared once at startup and is immutable afterwards.
//! Each [`call`](Endpoint::call) builds a fresh context, runs the handler,
//! classifies what went wrong, and shapes the result.
//!
//! ```rust
//! use serde_json::{Value, json};
//! use vane::{CallInput, Context, Endpoint, Error, Method, Reply};
//!
//! async fn create_user(ctx: Context) -> Result<Reply, Error> {
//!     let name = ctx.body().and_then(|b| b.get("name")).cloned().unwrap_or(Value::Null);
//!     ctx.set_status(http::StatusCode::CREATED);
//!     Ok(ctx.json(json!({ "name": name })))
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::builder("/users")
//!     .method(Method::POST)
//!     .handler(create_user)?;
//!
//! let value = endpoint
//!     .call(CallInput::new().body(json!({ "name": "ada" })))
//!     .await?
//!     .into_value();
//! assert_eq!(value, Some(json!({ "name": "ada" })));
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::api_error::ApiError;
use crate::context::{self, BuildOptions, CallInput};
use crate::error::{ConfigError, Error, ValidationError};
use crate::handler::{BoxedHandler, Handler, Hook, hook};
use crate::method::Methods;
use crate::middleware::Middleware;
use crate::schema::SharedSchema;
use crate::shape::{self, Outcome};

// ── Metadata ──────────────────────────────────────────────────────────────────

/// Free-form endpoint metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    pub openapi: Option<OpenApiMetadata>,
    /// Keeps the endpoint out of the route table; it stays callable
    /// in-process.
    #[serde(rename = "SERVER_ONLY")]
    pub server_only: bool,
    /// Overrides the router's media-type allow-list for this endpoint.
    pub allowed_media_types: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Documentation hints copied into the generated API description.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenApiMetadata {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub operation_id: Option<String>,
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A declared handler. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    path: Option<String>,
    methods: Methods,
    body_schema: Option<SharedSchema>,
    query_schema: Option<SharedSchema>,
    middleware: Vec<Middleware>,
    metadata: Metadata,
    require_headers: bool,
    require_request: bool,
    clone_request: bool,
    disable_body: bool,
    on_api_error: Option<Hook<ApiError>>,
    on_validation_error: Option<Hook<ValidationError>>,
    handler: BoxedHandler,
}

impl Endpoint {
    pub fn builder(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Some(path.into()))
    }

    /// An endpoint without a path. Callable in-process; the router refuses it.
    pub fn pathless() -> EndpointBuilder {
        EndpointBuilder::new(None)
    }

    pub fn path(&self) -> Option<&str> { self.inner.path.as_deref() }
    pub fn methods(&self) -> &Methods { &self.inner.methods }
    pub fn metadata(&self) -> &Metadata { &self.inner.metadata }
    pub fn has_body_schema(&self) -> bool { self.inner.body_schema.is_some() }
    pub(crate) fn clone_request(&self) -> bool { self.inner.clone_request }
    pub(crate) fn disable_body(&self) -> bool { self.inner.disable_body }

    /// Invokes the endpoint.
    ///
    /// - Validation failures become a `400` [`ApiError`] with code
    ///   `VALIDATION_ERROR`, after `on_validation_error` has seen them.
    /// - An [`ApiError`] from the handler goes through `on_api_error`; it is
    ///   turned into a response only when the input asked for one, and
    ///   returned as `Err` otherwise.
    /// - Anything else propagates unchanged.
    pub async fn call(&self, input: CallInput) -> Result<Outcome, Error> {
        let inner = &*self.inner;
        if inner.require_headers && !input.has_headers() {
            return Err(missing("Headers are required", "MISSING_HEADERS"));
        }
        if inner.require_request && input.request.is_none() {
            return Err(missing("Request is required", "MISSING_REQUEST"));
        }

        let requested = input.shape;
        let options = BuildOptions {
            body_schema: inner.body_schema.as_deref(),
            query_schema: inner.query_schema.as_deref(),
            middleware: &inner.middleware,
            path: inner.path.as_deref(),
            default_method: Some(inner.methods.primary()),
        };

        let ctx = match context::build(input, &options).await {
            Ok(ctx) => ctx,
            Err(Error::Validation(err)) => {
                debug!(path = ?inner.path, message = %err.message, "input validation failed");
                if let Some(hook) = &inner.on_validation_error {
                    hook(err.clone()).await?;
                }
                return Err(ApiError::validation(&err.message).into());
            }
            Err(Error::Respond(res)) if requested.as_response => return Ok(Outcome::Response(res)),
            Err(other) => return Err(other),
        };

        let state = ctx.state();
        let reply = match inner.handler.call(ctx).await {
            Ok(reply) => reply,
            Err(Error::Api(mut err)) => {
                if let Some(hook) = &inner.on_api_error {
                    hook(err.clone()).await?;
                }
                let (headers, _) = state.response();
                if !requested.as_response {
                    err.layer_under(&headers);
                    return Err(Error::Api(err));
                }
                return Ok(Outcome::Response(err.to_response_with(&headers)));
            }
            Err(other) => return Err(other),
        };

        let (headers, status) = state.response();
        Ok(shape::shape(reply, headers, status, requested))
    }
}

fn missing(message: &str, code: &str) -> Error {
    ApiError::new(StatusCode::BAD_REQUEST)
        .with_body(json!({ "message": message, "code": code }))
        .into()
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.inner.path)
            .field("methods", &self.inner.methods)
            .field("metadata", &self.inner.metadata)
            .finish_non_exhaustive()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Obtained from [`Endpoint::builder`], [`Endpoint::pathless`] or an
/// [`EndpointFactory`]. Terminated by [`handler`](Self::handler).
pub struct EndpointBuilder {
    path: Option<String>,
    methods: Methods,
    body_schema: Option<SharedSchema>,
    query_schema: Option<SharedSchema>,
    middleware: Vec<Middleware>,
    shared: Vec<Middleware>,
    metadata: Metadata,
    require_headers: bool,
    require_request: bool,
    clone_request: bool,
    disable_body: bool,
    on_api_error: Option<Hook<ApiError>>,
    on_validation_error: Option<Hook<ValidationError>>,
}

impl EndpointBuilder {
    fn new(path: Option<String>) -> Self {
        Self {
            path,
            methods: Methods::Any,
            body_schema: None,
            query_schema: None,
            middleware: Vec::new(),
            shared: Vec::new(),
            metadata: Metadata::default(),
            require_headers: false,
            require_request: false,
            clone_request: false,
            disable_body: false,
            on_api_error: None,
            on_validation_error: None,
        }
    }

    /// One method, a list, or [`Methods::Any`] (the default).
    pub fn method(mut self, methods: impl Into<Methods>) -> Self {
        self.methods = methods.into();
        self
    }

    pub fn body(mut self, schema: SharedSchema) -> Self {
        self.body_schema = Some(schema);
        self
    }

    pub fn query(mut self, schema: SharedSchema) -> Self {
        self.query_schema = Some(schema);
        self
    }

    /// Appends to the `use` chain. Runs left to right before the handler.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Calls without request headers fail with `400 MISSING_HEADERS`.
    pub fn require_headers(mut self) -> Self {
        self.require_headers = true;
        self
    }

    /// Calls without a request fail with `400 MISSING_REQUEST`.
    pub fn require_request(mut self) -> Self {
        self.require_request = true;
        self
    }

    /// The router hands this endpoint its own copy of the request.
    pub fn clone_request(mut self) -> Self {
        self.clone_request = true;
        self
    }

    /// The router leaves the body undecoded.
    pub fn disable_body(mut self) -> Self {
        self.disable_body = true;
        self
    }

    pub fn on_api_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ApiError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on_api_error = Some(hook(f));
        self
    }

    pub fn on_validation_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ValidationError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on_validation_error = Some(hook(f));
        self
    }

    /// Finishes the declaration.
    ///
    /// Fails when a body schema is declared on a `GET`/`HEAD`-only endpoint
    /// or the path contains consecutive slashes.
    pub fn handler(self, handler: impl Handler) -> Result<Endpoint, ConfigError> {
        if self.body_schema.is_some() && self.methods.is_read_only() {
            return Err(ConfigError::BodyOnReadOnlyMethod);
        }
        if let Some(path) = &self.path {
            if path.contains("//") {
                return Err(ConfigError::ConsecutiveSlashes(path.clone()));
            }
        }

        let mut middleware = self.middleware;
        middleware.extend(self.shared);

        Ok(Endpoint {
            inner: Arc::new(Inner {
                path: self.path,
                methods: self.methods,
                body_schema: self.body_schema,
                query_schema: self.query_schema,
                middleware,
                metadata: self.metadata,
                require_headers: self.require_headers,
                require_request: self.require_request,
                clone_request: self.clone_request,
                disable_body: self.disable_body,
                on_api_error: self.on_api_error,
                on_validation_error: self.on_validation_error,
                handler: handler.into_boxed_handler(),
            }),
        })
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Produces endpoint builders that share a middleware chain.
///
/// The shared middleware runs after each endpoint's own `use` list.
#[derive(Clone, Debug, Default)]
pub struct EndpointFactory {
    middleware: Vec<Middleware>,
}

impl EndpointFactory {
    pub fn new(middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self { middleware: middleware.into_iter().collect() }
    }

    pub fn builder(&self, path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder { shared: self.middleware.clone(), ..Endpoint::builder(path) }
    }

    pub fn pathless(&self) -> EndpointBuilder {
        EndpointBuilder { shared: self.middleware.clone(), ..Endpoint::pathless() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::cookie::CookieOptions;
    use crate::method::Method;
    use crate::response::Response;
    use crate::schema::{Issue, from_fn};
    use crate::shape::Reply;
    use crate::status::Status;
    use http::header::{LOCATION, SET_COOKIE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn echo_body(ctx: Context) -> Result<Reply, Error> {
        Ok(ctx.json(ctx.body().cloned().unwrap_or(Value::Null)))
    }

    async fn forbidden(ctx: Context) -> Result<Reply, Error> {
        ctx.set_header("x-reason", "policy")?;
        Err(ctx.error(Status::Forbidden, Some(json!({ "message": "No access" }))).into())
    }

    fn contributes(key: &'static str, value: &'static str) -> Middleware {
        Middleware::new(move |_: Context| async move { Ok::<_, Error>(json!({ key: value })) })
    }

    #[test]
    fn body_schema_on_read_only_methods_is_rejected() {
        let schema = from_fn(Ok);
        let result = Endpoint::builder("/x")
            .method([Method::GET, Method::HEAD])
            .body(schema)
            .handler(echo_body);
        assert!(matches!(result, Err(ConfigError::BodyOnReadOnlyMethod)));
    }

    #[test]
    fn consecutive_slashes_are_rejected() {
        let result = Endpoint::builder("/a//b").handler(echo_body);
        assert!(matches!(result, Err(ConfigError::ConsecutiveSlashes(_))));
    }

    #[tokio::test]
    async fn validation_failure_becomes_400_after_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let endpoint = Endpoint::builder("/x")
            .method(Method::POST)
            .body(from_fn(|_| Err(vec![Issue::new("bad")])))
            .on_validation_error(move |err| {
                let counter = Arc::clone(&counter);
                async move {
                    assert_eq!(err.issues, vec![Issue::new("bad")]);
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Error>(())
                }
            })
            .handler(echo_body)
            .unwrap();

        let err = endpoint.call(CallInput::new().as_response(true)).await.unwrap_err();
        let err = err.as_api().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), Some("VALIDATION_ERROR"));
        assert_eq!(err.message(), Some("Invalid body parameters"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_error_is_a_response_only_at_the_boundary() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let endpoint = Endpoint::builder("/x")
            .on_api_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), Error>(()) }
            })
            .handler(forbidden)
            .unwrap();

        let err = endpoint.call(CallInput::new()).await.unwrap_err();
        assert_eq!(err.as_api().map(ApiError::status), Some(StatusCode::FORBIDDEN));

        let Outcome::Response(res) = endpoint.call(CallInput::new().as_response(true)).await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.header("x-reason"), Some("policy"));
        assert_eq!(res.json_body().unwrap()["code"], "NO_ACCESS");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn redirect_after_set_cookie_emits_the_cookie_once() {
        let endpoint = Endpoint::builder("/old")
            .handler(|ctx: Context| async move {
                ctx.set_cookie("flash", "1", &CookieOptions::new())?;
                Err::<(), Error>(ctx.redirect("/new").into())
            })
            .unwrap();

        let Outcome::Response(res) = endpoint.call(CallInput::new().as_response(true)).await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.headers().get_all(SET_COOKIE).iter().collect::<Vec<_>>(), ["flash=1"]);

        let err = endpoint.call(CallInput::new()).await.unwrap_err();
        let err = err.as_api().unwrap();
        assert_eq!(err.headers().get_all(SET_COOKIE).iter().count(), 1);
        assert_eq!(err.headers()[LOCATION], "/new");
    }

    #[tokio::test]
    async fn short_circuit_response_keeps_earlier_middleware_cookies() {
        let trace = Middleware::new(|ctx: Context| async move {
            ctx.set_cookie("trace", "1", &CookieOptions::new())?;
            Ok::<_, Error>(())
        });
        let deny = Middleware::new(|_: Context| async {
            Ok::<_, Error>(Reply::Response(Response::status(Status::Forbidden)))
        });
        let endpoint = Endpoint::builder("/x")
            .middleware(trace)
            .middleware(deny)
            .handler(echo_body)
            .unwrap();

        let Outcome::Response(res) = endpoint.call(CallInput::new().as_response(true)).await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers().get_all(SET_COOKIE).iter().collect::<Vec<_>>(), ["trace=1"]);
    }

    #[tokio::test]
    async fn unclassified_errors_propagate_even_at_the_boundary() {
        let endpoint = Endpoint::builder("/x")
            .handler(|_: Context| async { Err::<(), Error>(Error::other("boom")) })
            .unwrap();
        let err = endpoint.call(CallInput::new().as_response(true)).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[tokio::test]
    async fn required_inputs_are_enforced() {
        let endpoint = Endpoint::builder("/x").require_headers().handler(echo_body).unwrap();
        let err = endpoint.call(CallInput::new()).await.unwrap_err();
        assert_eq!(err.as_api().and_then(ApiError::code), Some("MISSING_HEADERS"));
        assert!(endpoint.call(CallInput::new().headers(http::HeaderMap::new())).await.is_ok());

        let endpoint = Endpoint::builder("/x").require_request().handler(echo_body).unwrap();
        let err = endpoint.call(CallInput::new()).await.unwrap_err();
        assert_eq!(err.as_api().and_then(ApiError::code), Some("MISSING_REQUEST"));
    }

    #[tokio::test]
    async fn middleware_contributions_merge_in_order() {
        let endpoint = Endpoint::builder("/x")
            .middleware(contributes("a", "first"))
            .middleware(contributes("a", "second"))
            .middleware(contributes("b", "only"))
            .handler(|ctx: Context| async move { Ok::<_, Error>(ctx.context().clone()) })
            .unwrap();
        let value = endpoint.call(CallInput::new()).await.unwrap().into_value();
        assert_eq!(value, Some(json!({ "a": "second", "b": "only" })));
    }

    #[tokio::test]
    async fn factory_appends_shared_middleware_after_own() {
        let factory = EndpointFactory::new([contributes("who", "shared")]);
        let endpoint = factory
            .builder("/x")
            .middleware(contributes("who", "own"))
            .handler(|ctx: Context| async move { Ok::<_, Error>(ctx.context().clone()) })
            .unwrap();
        let value = endpoint.call(CallInput::new()).await.unwrap().into_value();
        assert_eq!(value, Some(json!({ "who": "shared" })));
    }

    #[tokio::test]
    async fn status_and_headers_come_back_when_asked() {
        let endpoint = Endpoint::builder("/x")
            .handler(|ctx: Context| async move {
                ctx.set_status(Status::Created);
                ctx.set_header("x-id", "7")?;
                Ok::<_, Error>(json!({ "id": 7 }))
            })
            .unwrap();
        let out = endpoint
            .call(CallInput::new().return_headers(true).return_status(true))
            .await
            .unwrap();
        let Outcome::Full { headers, status, response } = out else { panic!("expected full shape") };
        assert_eq!(status, Some(StatusCode::CREATED));
        assert_eq!(headers["x-id"], "7");
        assert_eq!(response.into_value(), Some(json!({ "id": 7 })));
    }

    #[test]
    fn metadata_reads_server_only_flag() {
        let meta: Metadata = serde_json::from_value(json!({
            "SERVER_ONLY": true,
            "openapi": { "summary": "Hidden", "operationId": "hidden" },
            "scope": "internal",
        }))
        .unwrap();
        assert!(meta.server_only);
        assert_eq!(meta.openapi.unwrap().operation_id.as_deref(), Some("hidden"));
        assert_eq!(meta.extra["scope"], "internal");
    }
}
