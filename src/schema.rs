//! Pluggable input validation.
//!
//! A [`Schema`] has exactly one capability: take a raw JSON value and either
//! return the (possibly transformed) value or a list of [`Issue`]s. Any
//! validation library can be adapted by implementing that one method; the
//! runtime never looks further.
//!
//! Two adapters ship with the crate:
//!
//! - [`from_fn`] wraps a synchronous closure.
//! - [`typed`] validates by deserializing into a `serde` type and
//!   re-serializing, so the value handed to the handler is the normalized
//!   shape of that type.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Future returned by [`Schema::validate`].
pub type SchemaFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, Vec<Issue>>> + Send + 'a>>;

/// One problem reported by a schema.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Issue {
    pub message: String,
    /// Location of the offending value, outermost key first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), path: Vec::new() }
    }

    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }
}

/// The validate-and-transform capability every schema adapter provides.
pub trait Schema: Send + Sync + 'static {
    fn validate(&self, value: Value) -> SchemaFuture<'_>;
}

/// A schema shared between an endpoint declaration and its calls.
pub type SharedSchema = Arc<dyn Schema>;

/// Outcome of running one value through [`validate`].
#[derive(Debug)]
pub struct Validation {
    pub data: Option<Value>,
    pub issues: Option<Vec<Issue>>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.issues.is_none()
    }
}

/// Runs `value` through `schema`.
///
/// With no schema the value passes through untouched. An absent value is
/// presented to the schema as `null`, so schemas decide whether the input
/// is optional.
pub async fn validate(schema: Option<&dyn Schema>, value: Option<Value>) -> Validation {
    let Some(schema) = schema else {
        return Validation { data: value, issues: None };
    };
    match schema.validate(value.unwrap_or(Value::Null)).await {
        Ok(data) => Validation { data: Some(data), issues: None },
        Err(issues) => Validation { data: None, issues: Some(issues) },
    }
}

/// Validates body and query independently.
///
/// Both validations always run; when both fail, the body failure is the one
/// reported.
pub async fn validate_input(
    body_schema: Option<&dyn Schema>,
    query_schema: Option<&dyn Schema>,
    body: Option<Value>,
    query: Option<Value>,
) -> Result<(Option<Value>, Option<Value>), ValidationError> {
    let (body, query) = futures_util::join!(
        validate(body_schema, body),
        validate(query_schema, query),
    );
    if let Some(issues) = body.issues {
        return Err(ValidationError { message: "Invalid body parameters".to_owned(), issues });
    }
    if let Some(issues) = query.issues {
        return Err(ValidationError { message: "Invalid query parameters".to_owned(), issues });
    }
    Ok((body.data, query.data))
}

// ── Adapters ──────────────────────────────────────────────────────────────────

struct FnSchema<F>(F);

impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> Result<Value, Vec<Issue>> + Send + Sync + 'static,
{
    fn validate(&self, value: Value) -> SchemaFuture<'_> {
        let result = (self.0)(value);
        Box::pin(async move { result })
    }
}

/// Schema backed by a synchronous closure.
///
/// ```rust
/// use serde_json::Value;
/// use vane::schema::{self, Issue};
///
/// let non_empty = schema::from_fn(|v: Value| match v.as_str() {
///     Some(s) if !s.is_empty() => Ok(v),
///     _ => Err(vec![Issue::new("expected a non-empty string")]),
/// });
/// # let _ = non_empty;
/// ```
pub fn from_fn<F>(f: F) -> SharedSchema
where
    F: Fn(Value) -> Result<Value, Vec<Issue>> + Send + Sync + 'static,
{
    Arc::new(FnSchema(f))
}

struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn validate(&self, value: Value) -> SchemaFuture<'_> {
        let result = serde_json::from_value::<T>(value)
            .map_err(|e| vec![Issue::new(e.to_string())])
            .and_then(|typed| {
                serde_json::to_value(&typed).map_err(|e| vec![Issue::new(e.to_string())])
            });
        Box::pin(async move { result })
    }
}

/// Schema that accepts exactly the values `T` deserializes from.
pub fn typed<T>() -> SharedSchema
where
    T: DeserializeOwned + Serialize + 'static,
{
    Arc::new(Typed::<T>(PhantomData))
}
