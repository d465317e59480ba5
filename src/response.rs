//! Outgoing response type and header merging.
//!
//! Handlers rarely build a [`Response`] themselves: the response shaper
//! turns whatever they return into one. Build it directly when you need full
//! control (custom content type, binary body) or want a wildcard middleware
//! to short-circuit a request.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types the runtime renders on its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json,
    Text,
    Html,
    /// Raw bytes a handler returned without saying what they are.
    OctetStream,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A fully buffered outgoing response.
///
/// A middleware registered on the router can return one to end the request
/// before the endpoint runs:
///
/// ```rust
/// use http::header::WWW_AUTHENTICATE;
/// use http::HeaderValue;
/// use vane::{Context, Error, Middleware, Reply, Response, Status};
///
/// let gate = Middleware::new(|ctx: Context| async move {
///     if ctx.get_header("authorization").is_some() {
///         return Ok::<_, Error>(Reply::Value(serde_json::Value::Null));
///     }
///     Ok(Reply::Response(
///         Response::builder()
///             .status(Status::Unauthorized)
///             .header(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))
///             .text("sign in first"),
///     ))
/// });
/// # let _ = gate;
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with a serialized JSON body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().bytes(ContentType::Html, Bytes::from(body.into()))
    }

    /// Bare status, empty body, no headers.
    pub fn status(code: impl Into<StatusCode>) -> Self {
        Self { status: code.into(), headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Defaults to `200 OK`.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub fn set_status(&mut self, code: impl Into<StatusCode>) {
        self.status = code.into();
    }

    /// First value of a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as JSON. Empty bodies read as `null`.
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body)
    }

    /// Converts into the `http` crate's response type for host adapters.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Obtained from [`Response::builder`]. Ends with a body method, which sets
/// `content-type` unless a header already did.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: impl Into<StatusCode>) -> Self {
        self.status = code.into();
        self
    }

    /// Appends a header; repeated names (e.g. `set-cookie`) are kept.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.bytes(ContentType::Json, body)
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(ContentType::Text, Bytes::from(body.into()))
    }

    pub fn bytes(mut self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type.as_str()));
        Response { status: self.status, headers: self.headers, body: body.into() }
    }
}

// ── Header merging ────────────────────────────────────────────────────────────

/// Merges `source` into `target`.
///
/// `set-cookie` values accumulate; every other header in `source` replaces
/// whatever `target` held under the same name.
pub(crate) fn merge_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for name in source.keys() {
        if name != SET_COOKIE {
            target.remove(name);
        }
    }
    for (name, value) in source {
        target.append(name.clone(), value.clone());
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Values that stand for a complete response on their own, independent of
/// any call's accumulated headers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for crate::Status {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::LOCATION;

    #[test]
    fn builder_sets_content_type_once() {
        let res = Response::builder()
            .header(CONTENT_TYPE, HeaderValue::from_static("application/problem+json"))
            .json(b"{}".to_vec());
        assert_eq!(res.header("content-type"), Some("application/problem+json"));
        assert_eq!(res.headers().get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn merge_replaces_plain_headers_and_appends_cookies() {
        let mut target = HeaderMap::new();
        target.insert(LOCATION, HeaderValue::from_static("/old"));
        target.append(SET_COOKIE, HeaderValue::from_static("a=1"));

        let mut source = HeaderMap::new();
        source.insert(LOCATION, HeaderValue::from_static("/new"));
        source.append(SET_COOKIE, HeaderValue::from_static("b=2"));

        merge_headers(&mut target, &source);

        assert_eq!(target.get(LOCATION).unwrap(), "/new");
        assert_eq!(target.get_all(LOCATION).iter().count(), 1);
        assert_eq!(target.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn statuses_are_bare_responses() {
        let res = crate::Status::NoContent.into_response();
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.headers().is_empty());
        assert!(res.body().is_empty());
        assert_eq!(res.json_body().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn into_http_keeps_status_headers_and_body() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .text("made")
            .into_http();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}
