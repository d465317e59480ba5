//! HTTP status codes as a typed enum, with their semantic names.
//!
//! Anywhere a status is accepted (`ctx.set_status`, `ctx.error`,
//! [`ApiError::new`](crate::ApiError::new), `Response::status`) a [`Status`]
//! works as well as a raw [`StatusCode`]. The semantic name is what error
//! payloads and `ctx.error("NOT_FOUND")`-style lookups use:
//!
//! ```rust
//! use vane::Status;
//!
//! let status: Status = "NOT_FOUND".parse().unwrap();
//! assert_eq!(status.code(), 404);
//! assert_eq!(Status::Found.name(), "FOUND");
//! ```

use std::fmt;
use std::str::FromStr;

use http::StatusCode;

macro_rules! statuses {
    ($( $variant:ident => $code:literal, $name:literal; )*) => {
        /// Every status the runtime has a semantic name for.
        #[allow(clippy::enum_variant_names)]
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum Status {
            $( $variant, )*
        }

        impl Status {
            /// Numeric code, e.g. `404`.
            pub fn code(self) -> u16 {
                match self {
                    $( Self::$variant => $code, )*
                }
            }

            /// Semantic name, e.g. `"NOT_FOUND"`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }

            /// Reverse lookup by numeric code.
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }

        /// Parses a semantic name (e.g. `"BAD_REQUEST"`). Case-sensitive.
        impl FromStr for Status {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(Self::$variant), )*
                    _ => Err(UnknownStatus(s.to_owned())),
                }
            }
        }
    };
}

statuses! {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok                            => 200, "OK";
    Created                       => 201, "CREATED";
    Accepted                      => 202, "ACCEPTED";
    NoContent                     => 204, "NO_CONTENT";

    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MultipleChoices               => 300, "MULTIPLE_CHOICES";
    MovedPermanently              => 301, "MOVED_PERMANENTLY";
    Found                         => 302, "FOUND";
    SeeOther                      => 303, "SEE_OTHER";
    NotModified                   => 304, "NOT_MODIFIED";
    TemporaryRedirect             => 307, "TEMPORARY_REDIRECT";

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest                    => 400, "BAD_REQUEST";
    Unauthorized                  => 401, "UNAUTHORIZED";
    PaymentRequired               => 402, "PAYMENT_REQUIRED";
    Forbidden                     => 403, "FORBIDDEN";
    NotFound                      => 404, "NOT_FOUND";
    MethodNotAllowed              => 405, "METHOD_NOT_ALLOWED";
    NotAcceptable                 => 406, "NOT_ACCEPTABLE";
    ProxyAuthenticationRequired   => 407, "PROXY_AUTHENTICATION_REQUIRED";
    RequestTimeout                => 408, "REQUEST_TIMEOUT";
    Conflict                      => 409, "CONFLICT";
    Gone                          => 410, "GONE";
    LengthRequired                => 411, "LENGTH_REQUIRED";
    PreconditionFailed            => 412, "PRECONDITION_FAILED";
    PayloadTooLarge               => 413, "PAYLOAD_TOO_LARGE";
    UriTooLong                    => 414, "URI_TOO_LONG";
    UnsupportedMediaType          => 415, "UNSUPPORTED_MEDIA_TYPE";
    RangeNotSatisfiable           => 416, "RANGE_NOT_SATISFIABLE";
    ExpectationFailed             => 417, "EXPECTATION_FAILED";
    ImATeapot                     => 418, "I'M_A_TEAPOT";
    MisdirectedRequest            => 421, "MISDIRECTED_REQUEST";
    UnprocessableEntity           => 422, "UNPROCESSABLE_ENTITY";
    Locked                        => 423, "LOCKED";
    FailedDependency              => 424, "FAILED_DEPENDENCY";
    TooEarly                      => 425, "TOO_EARLY";
    UpgradeRequired               => 426, "UPGRADE_REQUIRED";
    PreconditionRequired          => 428, "PRECONDITION_REQUIRED";
    TooManyRequests               => 429, "TOO_MANY_REQUESTS";
    RequestHeaderFieldsTooLarge   => 431, "REQUEST_HEADER_FIELDS_TOO_LARGE";
    UnavailableForLegalReasons    => 451, "UNAVAILABLE_FOR_LEGAL_REASONS";

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError           => 500, "INTERNAL_SERVER_ERROR";
    NotImplemented                => 501, "NOT_IMPLEMENTED";
    BadGateway                    => 502, "BAD_GATEWAY";
    ServiceUnavailable            => 503, "SERVICE_UNAVAILABLE";
    GatewayTimeout                => 504, "GATEWAY_TIMEOUT";
    HttpVersionNotSupported       => 505, "HTTP_VERSION_NOT_SUPPORTED";
    VariantAlsoNegotiates         => 506, "VARIANT_ALSO_NEGOTIATES";
    InsufficientStorage           => 507, "INSUFFICIENT_STORAGE";
    LoopDetected                  => 508, "LOOP_DETECTED";
    NotExtended                   => 510, "NOT_EXTENDED";
    NetworkAuthenticationRequired => 511, "NETWORK_AUTHENTICATION_REQUIRED";
}

/// Returned when parsing a name that is not in the status table.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown status name `{0}`")]
pub struct UnknownStatus(pub String);

impl From<Status> for StatusCode {
    fn from(s: Status) -> StatusCode {
        // Every code in the table is a valid three-digit status.
        StatusCode::from_u16(s.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic name for an arbitrary status code, if it has one.
pub fn name_of(code: StatusCode) -> Option<&'static str> {
    Status::from_code(code.as_u16()).map(Status::name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_the_table() {
        for status in [Status::Ok, Status::Found, Status::BadRequest, Status::ImATeapot] {
            assert_eq!(status.name().parse::<Status>(), Ok(status));
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            "not_found".parse::<Status>(),
            Err(UnknownStatus("not_found".to_owned()))
        );
        assert_eq!(Status::from_code(299), None);
    }

    #[test]
    fn converts_into_status_code() {
        assert_eq!(StatusCode::from(Status::UnsupportedMediaType), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(name_of(StatusCode::FOUND), Some("FOUND"));
        assert_eq!(name_of(StatusCode::IM_USED), None);
    }
}
