//! Response shaping.
//!
//! A handler returns a [`Reply`]. Depending on how the endpoint was called,
//! the reply is either rendered into a full [`Response`] (HTTP boundary) or
//! handed back in-process, optionally alongside the headers and status the
//! call accumulated. See [`Outcome`] for the five shapes.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::{Map, Value};

use crate::response::{ContentType, Response, merge_headers};

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a handler produced.
#[derive(Clone, Debug)]
pub enum Reply {
    /// A plain value. Strings render as text, `null` as an empty body,
    /// everything else as JSON.
    Value(Value),
    /// Binary payload, rendered as `application/octet-stream`.
    Bytes(Bytes),
    /// A finished response; accumulated headers are merged underneath.
    Response(Response),
    /// Produced by [`Context::json`](crate::Context::json) on HTTP-boundary
    /// calls: a JSON body plus per-response overrides.
    Json { body: Value, options: JsonOptions },
}

impl Reply {
    /// The value this reply carries, if it is not a response or raw bytes.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Json { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Json { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(res) => Some(res),
            _ => None,
        }
    }
}

/// Overrides accepted by [`Context::json_with`](crate::Context::json_with).
#[derive(Clone, Debug, Default)]
pub struct JsonOptions {
    pub status: Option<StatusCode>,
    /// Merged over the call's accumulated headers.
    pub headers: HeaderMap,
    /// Sent instead of the value passed to `json_with`.
    pub body: Option<Value>,
    /// Sent instead of any JSON body at all.
    pub response: Option<Response>,
}

impl JsonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<StatusCode>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn header(mut self, name: http::HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }
}

/// Conversion into a handler [`Reply`].
pub trait IntoReply: Send + 'static {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply { Reply::Value(self) }
}

impl IntoReply for Map<String, Value> {
    fn into_reply(self) -> Reply { Reply::Value(Value::Object(self)) }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply { Reply::Value(Value::String(self)) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply { Reply::Value(Value::String(self.to_owned())) }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply { Reply::Value(Value::Null) }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Reply { Reply::Bytes(self) }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply { Reply::Response(self) }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Which shape a call wants its result in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReturnShape {
    /// Render a full [`Response`]; the other two flags are ignored.
    pub as_response: bool,
    pub return_headers: bool,
    pub return_status: bool,
}

/// Result of an endpoint call.
#[derive(Debug)]
pub enum Outcome {
    Response(Response),
    Raw(Reply),
    Headers { headers: HeaderMap, response: Reply },
    Status { status: Option<StatusCode>, response: Reply },
    Full { headers: HeaderMap, status: Option<StatusCode>, response: Reply },
}

impl Outcome {
    /// The handler's reply, whatever the shape. A rendered response comes
    /// back as [`Reply::Response`].
    pub fn into_reply(self) -> Reply {
        match self {
            Self::Response(res) => Reply::Response(res),
            Self::Raw(reply)
            | Self::Headers { response: reply, .. }
            | Self::Status { response: reply, .. }
            | Self::Full { response: reply, .. } => reply,
        }
    }

    /// Shortcut for in-process callers that only want the value.
    pub fn into_value(self) -> Option<Value> {
        self.into_reply().into_value()
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Response(res) => Some(res.headers()),
            Self::Headers { headers, .. } | Self::Full { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

/// Packs a reply into the requested shape.
pub fn shape(
    reply: Reply,
    headers: HeaderMap,
    status: Option<StatusCode>,
    requested: ReturnShape,
) -> Outcome {
    if requested.as_response {
        return Outcome::Response(to_response(reply, &headers, status));
    }
    match (requested.return_headers, requested.return_status) {
        (false, false) => Outcome::Raw(reply),
        (true, false) => Outcome::Headers { headers, response: reply },
        (false, true) => Outcome::Status { status, response: reply },
        (true, true) => Outcome::Full { headers, status, response: reply },
    }
}

/// Renders a reply plus accumulated headers and status into a response.
///
/// Status defaults to `200 OK`. A [`Reply::Response`] keeps its own status
/// and its headers win over the accumulated ones, `set-cookie` excepted.
pub fn to_response(reply: Reply, headers: &HeaderMap, status: Option<StatusCode>) -> Response {
    let status = status.unwrap_or(StatusCode::OK);
    match reply {
        Reply::Response(res) => layered(res, headers),
        Reply::Bytes(bytes) => {
            finish(Response::builder().status(status).bytes(ContentType::OctetStream, bytes), headers)
        }
        Reply::Value(Value::Null) => finish(Response::status(status), headers),
        Reply::Value(Value::String(text)) => {
            finish(Response::builder().status(status).text(text), headers)
        }
        Reply::Value(value) => {
            finish(Response::builder().status(status).json(value.to_string()), headers)
        }
        Reply::Json { body, options } => {
            let mut merged = headers.clone();
            merge_headers(&mut merged, &options.headers);
            if let Some(res) = options.response {
                return layered(res, &merged);
            }
            let body = options.body.unwrap_or(body);
            let status = options.status.unwrap_or(status);
            finish(Response::builder().status(status).json(body.to_string()), &merged)
        }
    }
}

/// Accumulated headers are applied last; a `content-type` among them
/// replaces the one the renderer chose.
fn finish(mut res: Response, headers: &HeaderMap) -> Response {
    merge_headers(&mut res.headers, headers);
    res
}

pub(crate) fn layered(res: Response, headers: &HeaderMap) -> Response {
    let mut merged = headers.clone();
    merge_headers(&mut merged, &res.headers);
    Response { headers: merged, ..res }
}
