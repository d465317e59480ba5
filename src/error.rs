//! Error taxonomy.
//!
//! - [`ConfigError`]: an endpoint or router was declared wrongly. Returned
//!   from construction, never at request time.
//! - [`ValidationError`]: a schema rejected the input. Endpoints turn it into
//!   a `400` [`ApiError`] with code `VALIDATION_ERROR`.
//! - [`ApiError`]: explicit status/body/headers, recoverable into a response.
//! - [`Error::Respond`]: a middleware answered with a full response.
//! - everything else is unclassified and ends up as a logged `500` unless the
//!   router is configured otherwise.

use crate::api_error::ApiError;
use crate::response::Response;
use crate::schema::Issue;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type flowing through handlers, middleware and the router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Short-circuit: a middleware produced the final response.
    #[error("request answered early with status {}", .0.status_code())]
    Respond(Response),

    #[error(transparent)]
    Cookie(#[from] CookieError),

    #[error("invalid header: {0}")]
    Http(#[from] http::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any error as unclassified.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// `true` for errors the router converts into a response on its own:
    /// [`ApiError`]s and middleware short-circuits.
    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Respond(_))
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// The response a classified error stands for.
    pub fn into_response(self) -> Result<Response, Self> {
        match self {
            Self::Api(err) => Ok(crate::IntoResponse::into_response(err)),
            Self::Respond(res) => Ok(res),
            other => Err(other),
        }
    }
}

impl From<crate::Status> for Error {
    fn from(status: crate::Status) -> Self {
        Self::Api(ApiError::new(status))
    }
}

/// An endpoint or router declaration that cannot work.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("body is not allowed with GET or HEAD methods")]
    BodyOnReadOnlyMethod,

    #[error("path `{0}` cannot contain consecutive slashes")]
    ConsecutiveSlashes(String),

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// A schema rejected the body or query.
///
/// `issues` is the failing schema's issue list, verbatim.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub issues: Vec<Issue>,
}

/// Cookie serialization refused the requested attributes.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CookieError {
    #[error("`__Secure-` cookies must set the Secure attribute")]
    SecurePrefixWithoutSecure,

    #[error("`__Host-` cookies must set the Secure attribute")]
    HostPrefixWithoutSecure,

    #[error("`__Host-` cookies must use path `/`")]
    HostPrefixPath,

    #[error("`__Host-` cookies must not set a domain")]
    HostPrefixDomain,

    #[error("partitioned cookies must set the Secure attribute")]
    PartitionedWithoutSecure,

    #[error("max-age must not exceed 400 days")]
    MaxAgeTooLong,

    #[error("invalid cookie name `{0}`")]
    InvalidName(String),

    #[error("signing secret rejected by HMAC")]
    InvalidSecret,
}
