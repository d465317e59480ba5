//! [`ApiError`]: a status, an optional JSON body, and headers.
//!
//! Used for real failures (`ctx.error(Status::Forbidden, …)`) and for
//! deliberate early exits such as [`Context::redirect`](crate::Context::redirect).
//! Endpoints called at the HTTP boundary turn it into a response; in-process
//! callers receive it as `Err(Error::Api(_))` and can inspect it.

use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{Map, Value, json};

use crate::response::{IntoResponse, Response, merge_headers};
use crate::status::{self, Status};

/// A status + body + headers control value.
#[derive(Clone, Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Option<Value>,
    headers: HeaderMap,
}

impl ApiError {
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self { status: status.into(), body: None, headers: HeaderMap::new() }
    }

    /// Builds an error from a semantic status name (`"NOT_FOUND"`).
    ///
    /// Unknown names resolve to `500 Internal Server Error`.
    pub fn named(name: &str) -> Self {
        let status = name.parse::<Status>().unwrap_or(Status::InternalServerError);
        Self::new(status)
    }

    /// Sets the body. An object body carrying a `message` but no `code` gets
    /// a code derived from the message.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(with_derived_code(body));
        self
    }

    /// Shorthand for a `{ "message": … }` body.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let mut body = match self.body.clone() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        body.insert("message".to_owned(), Value::String(message.into()));
        self.with_body(Value::Object(body))
    }

    /// Overrides the body's `code`.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let mut body = match self.body.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        body.insert("code".to_owned(), Value::String(code.into()));
        self.body = Some(Value::Object(body));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        merge_headers(&mut self.headers, headers);
        self
    }

    pub(crate) fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST)
            .with_body(json!({ "message": message, "code": "VALIDATION_ERROR" }))
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn body(&self) -> Option<&Value> { self.body.as_ref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Semantic status name, if the status is in the table.
    pub fn name(&self) -> Option<&'static str> {
        status::name_of(self.status)
    }

    pub fn message(&self) -> Option<&str> {
        self.body.as_ref()?.get("message")?.as_str()
    }

    pub fn code(&self) -> Option<&str> {
        self.body.as_ref()?.get("code")?.as_str()
    }

    /// Puts `headers` underneath the error's own headers.
    pub(crate) fn layer_under(&mut self, headers: &HeaderMap) {
        let mut merged = headers.clone();
        merge_headers(&mut merged, &self.headers);
        self.headers = merged;
    }

    /// Response carrying this error, with `headers` underneath the error's
    /// own headers.
    pub(crate) fn to_response_with(&self, headers: &HeaderMap) -> Response {
        let mut merged = headers.clone();
        merge_headers(&mut merged, &self.headers);
        let mut res = match &self.body {
            Some(body) => Response::json(body.to_string()),
            None => Response::status(self.status),
        };
        res.set_status(self.status);
        merge_headers(&mut res.headers, &merged);
        res
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response_with(&HeaderMap::new())
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self::new(status)
    }
}

fn with_derived_code(body: Value) -> Value {
    let Value::Object(mut map) = body else { return body };
    if !map.contains_key("code") {
        if let Some(message) = map.get("message").and_then(Value::as_str) {
            let code = code_from_message(message);
            map.insert("code".to_owned(), Value::String(code));
        }
    }
    Value::Object(map)
}

/// `"User not found!"` → `"USER_NOT_FOUND"`.
fn code_from_message(message: &str) -> String {
    message
        .to_uppercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
