//! Per-call request context.
//!
//! [`build`] turns a raw [`CallInput`] into a [`Context`]: it validates the
//! body and query, derives the request headers, and runs the declared
//! middleware chain, merging each contribution into the capability bag and
//! each middleware's headers into the outbound header set.
//!
//! Outbound headers and status live in a small shared cell owned by the call.
//! The handler takes the context by value; the endpoint keeps its own handle
//! on the cell so the accumulated headers survive the handler.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use http::header::{COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use indexmap::IndexMap;
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::api_error::ApiError;
use crate::cookie::{self, CookieOptions, CookiePrefix, SignedCookie};
use crate::error::Error;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::merge_headers;
use crate::schema::{self, Schema};
use crate::shape::{JsonOptions, Reply, ReturnShape};

/// Path parameters in template order.
pub type Params = IndexMap<String, String>;

/// Characters escaped in a redirect target: controls, space and the quote.
/// Non-ASCII is always escaped.
const LOCATION_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'"');

// ── CallInput ─────────────────────────────────────────────────────────────────

/// The raw input bag for one endpoint or middleware call.
///
/// ```rust
/// use serde_json::json;
/// use vane::CallInput;
///
/// let input = CallInput::new()
///     .param("id", "42")
///     .body(json!({ "name": "ada" }))
///     .return_headers(true);
/// # let _ = input;
/// ```
#[derive(Clone, Debug, Default)]
pub struct CallInput {
    pub(crate) method: Option<Method>,
    pub(crate) path: Option<String>,
    pub(crate) params: Params,
    pub(crate) query: Option<Value>,
    pub(crate) body: Option<Value>,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) request: Option<Arc<Request>>,
    pub(crate) context: Map<String, Value>,
    pub(crate) shape: ReturnShape,
}

impl CallInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Overrides the endpoint's declared path. Required for pathless
    /// endpoints that care about their path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Request headers. Take priority over the headers of [`request`](Self::request).
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.get_or_insert_with(HeaderMap::new).append(name, value);
        self
    }

    pub fn request(mut self, request: impl Into<Arc<Request>>) -> Self {
        self.request = Some(request.into());
        self
    }

    /// Initial capability bag; middleware contributions are merged over it.
    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn as_response(mut self, yes: bool) -> Self {
        self.shape.as_response = yes;
        self
    }

    pub fn return_headers(mut self, yes: bool) -> Self {
        self.shape.return_headers = yes;
        self
    }

    pub fn return_status(mut self, yes: bool) -> Self {
        self.shape.return_status = yes;
        self
    }

    pub(crate) fn has_headers(&self) -> bool {
        self.headers.is_some() || self.request.is_some()
    }
}

// ── Call state ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct ResponseParts {
    pub(crate) headers: HeaderMap,
    pub(crate) status: Option<StatusCode>,
}

#[derive(Debug)]
pub(crate) struct CallState {
    request_headers: Option<HeaderMap>,
    cookies: OnceLock<HashMap<String, String>>,
    response: Mutex<ResponseParts>,
}

impl CallState {
    fn new(request_headers: Option<HeaderMap>) -> Self {
        Self { request_headers, cookies: OnceLock::new(), response: Mutex::new(ResponseParts::default()) }
    }

    /// Snapshot of the outbound headers and status.
    pub(crate) fn response(&self) -> (HeaderMap, Option<StatusCode>) {
        let parts = self.response.lock();
        (parts.headers.clone(), parts.status)
    }

    pub(crate) fn merge_headers(&self, headers: &HeaderMap) {
        merge_headers(&mut self.response.lock().headers, headers);
    }

    fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            let Some(headers) = &self.request_headers else { return HashMap::new() };
            let header = headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join("; ");
            cookie::parse(&header)
        })
    }
}

// ── Build ─────────────────────────────────────────────────────────────────────

/// What the declaring endpoint or middleware contributes to [`build`].
#[derive(Default)]
pub struct BuildOptions<'a> {
    pub body_schema: Option<&'a dyn Schema>,
    pub query_schema: Option<&'a dyn Schema>,
    pub middleware: &'a [Middleware],
    /// Declared path, used when the input carries none.
    pub path: Option<&'a str>,
    /// Method assumed when the input carries none.
    pub default_method: Option<Method>,
}

/// Builds the context for one call.
///
/// Fails with [`Error::Validation`] when a schema rejects the input. A
/// middleware that fails, or answers with a full response
/// ([`Error::Respond`]), stops the chain.
pub async fn build(input: CallInput, options: &BuildOptions<'_>) -> Result<Context, Error> {
    let CallInput { method, path, params, query, body, headers, request, context, shape } = input;

    let (body, query) =
        schema::validate_input(options.body_schema, options.query_schema, body, query).await?;

    let request_headers = headers.or_else(|| request.as_ref().map(|r| r.headers().clone()));
    let method = method.or_else(|| options.default_method.clone()).unwrap_or(Method::GET);
    let path = path
        .or_else(|| options.path.map(str::to_owned))
        .unwrap_or_else(|| "virtual:".to_owned());

    let mut ctx = Context {
        method,
        path,
        params,
        query,
        body,
        request,
        context,
        as_response: shape.as_response,
        state: Arc::new(CallState::new(request_headers)),
    };

    for middleware in options.middleware {
        let (reply, headers) = middleware.run(ctx.middleware_input()).await?;
        ctx.state.merge_headers(&headers);
        match reply {
            Reply::Response(res) => {
                debug!(path = %ctx.path, status = %res.status_code(), "middleware answered early");
                return Err(Error::Respond(crate::shape::layered(res, &ctx.state.response().0)));
            }
            other => {
                if let Some(Value::Object(contribution)) = other.into_value() {
                    ctx.context.extend(contribution);
                }
            }
        }
    }

    Ok(ctx)
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything a handler sees for one call.
pub struct Context {
    method: Method,
    path: String,
    params: Params,
    query: Option<Value>,
    body: Option<Value>,
    request: Option<Arc<Request>>,
    context: Map<String, Value>,
    as_response: bool,
    state: Arc<CallState>,
}

impl Context {
    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn params(&self) -> &Params { &self.params }
    pub fn query(&self) -> Option<&Value> { self.query.as_ref() }
    pub fn body(&self) -> Option<&Value> { self.body.as_ref() }
    pub fn request(&self) -> Option<&Request> { self.request.as_deref() }

    /// The merged capability bag.
    pub fn context(&self) -> &Map<String, Value> { &self.context }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Request headers, explicit ones first, else the request's.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.state.request_headers.as_ref()
    }

    /// Deserializes the validated body.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST).with_message(e.to_string()).into()
        })
    }

    /// One middleware contribution, typed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.context.get(key).and_then(|v| T::deserialize(v).ok())
    }

    /// The whole capability bag viewed as `T`.
    pub fn context_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.context.clone())).map_err(Error::other)
    }

    // ── Headers and status ───────────────────────────────────────────────────

    /// Sets an outbound header, replacing any previous value.
    pub fn set_header<K, V>(&self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let name: HeaderName = name.try_into().map_err(Into::<http::Error>::into)?;
        let value: HeaderValue = value.try_into().map_err(Into::<http::Error>::into)?;
        self.state.response.lock().headers.insert(name, value);
        Ok(())
    }

    /// Reads a request header.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers()?.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_status(&self, status: impl Into<StatusCode>) {
        self.state.response.lock().status = Some(status.into());
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.state.response.lock().status
    }

    /// Snapshot of the outbound headers set so far.
    pub fn response_headers(&self) -> HeaderMap {
        self.state.response.lock().headers.clone()
    }

    // ── Cookies ──────────────────────────────────────────────────────────────

    /// Reads a request cookie. With a prefix, looks up the prefixed name only.
    pub fn get_cookie(&self, name: &str, prefix: Option<CookiePrefix>) -> Option<&str> {
        let key = cookie::cookie_key(name, prefix);
        self.state.cookies().get(&key).map(String::as_str)
    }

    pub fn get_signed_cookie(
        &self,
        name: &str,
        secret: &str,
        prefix: Option<CookiePrefix>,
    ) -> SignedCookie {
        match self.get_cookie(name, prefix) {
            None => SignedCookie::Missing,
            Some(raw) => match cookie::verify(raw, secret) {
                Some(value) => SignedCookie::Valid(value.to_owned()),
                None => SignedCookie::Invalid,
            },
        }
    }

    /// Appends a `set-cookie` header and returns its value.
    pub fn set_cookie(&self, name: &str, value: &str, options: &CookieOptions) -> Result<String, Error> {
        let header = cookie::serialize(name, value, options)?;
        self.append_cookie(&header)?;
        Ok(header)
    }

    pub fn set_signed_cookie(
        &self,
        name: &str,
        value: &str,
        secret: &str,
        options: &CookieOptions,
    ) -> Result<String, Error> {
        let header = cookie::serialize_signed(name, value, secret, options)?;
        self.append_cookie(&header)?;
        Ok(header)
    }

    fn append_cookie(&self, header: &str) -> Result<(), Error> {
        let value = HeaderValue::from_str(header).map_err(http::Error::from)?;
        self.state.response.lock().headers.append(SET_COOKIE, value);
        Ok(())
    }

    // ── Early exits and replies ──────────────────────────────────────────────

    /// Sets `location` and returns a `302 Found` carrying it. The rest of the
    /// call's headers are layered underneath wherever the error surfaces.
    ///
    /// ```rust,ignore
    /// return Err(ctx.redirect("/login").into());
    /// ```
    pub fn redirect(&self, url: &str) -> ApiError {
        let encoded = utf8_percent_encode(url, LOCATION_ESCAPES).to_string();
        let err = ApiError::new(StatusCode::FOUND);
        let Ok(value) = HeaderValue::from_str(&encoded) else { return err };
        self.state.response.lock().headers.insert(LOCATION, value.clone());
        err.with_header(LOCATION, value)
    }

    pub fn error(&self, status: impl Into<StatusCode>, body: Option<Value>) -> ApiError {
        let err = ApiError::new(status);
        match body {
            Some(body) => err.with_body(body),
            None => err,
        }
    }

    /// Returns `value` unchanged for in-process calls; at the HTTP boundary,
    /// marks it for JSON rendering.
    pub fn json(&self, value: Value) -> Reply {
        self.json_with(value, JsonOptions::default())
    }

    /// Like [`json`](Self::json) with response overrides. The overrides only
    /// apply at the HTTP boundary.
    pub fn json_with(&self, value: Value, options: JsonOptions) -> Reply {
        if self.as_response {
            Reply::Json { body: value, options }
        } else {
            Reply::Value(value)
        }
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    pub(crate) fn state(&self) -> Arc<CallState> {
        Arc::clone(&self.state)
    }

    /// What a middleware in this context's chain receives.
    fn middleware_input(&self) -> CallInput {
        CallInput {
            method: Some(self.method.clone()),
            path: Some(self.path.clone()),
            params: self.params.clone(),
            query: self.query.clone(),
            body: self.body.clone(),
            headers: self.state.request_headers.clone(),
            request: self.request.clone(),
            context: self.context.clone(),
            shape: ReturnShape { return_headers: true, ..ReturnShape::default() },
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
