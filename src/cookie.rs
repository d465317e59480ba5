//! Cookie parsing, serialization, and HMAC signing.
//!
//! Signed cookie wire format: `<value>.<base64 HMAC-SHA256>`. The signature
//! is always 44 characters of standard base64 ending in `=`. The whole
//! string is percent-encoded when serialized, like any other value.
//!
//! ```rust
//! use vane::cookie::{self, CookieOptions, SameSite};
//!
//! let header = cookie::serialize(
//!     "session",
//!     "abc 123",
//!     &CookieOptions::new().path("/").http_only(true).same_site(SameSite::Lax),
//! ).unwrap();
//! assert_eq!(header, "session=abc%20123; Path=/; HttpOnly; SameSite=Lax");
//!
//! let jar = cookie::parse("session=abc%20123; theme=dark");
//! assert_eq!(jar.get("session").map(String::as_str), Some("abc 123"));
//! ```

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::Sha256;

use crate::error::CookieError;

type HmacSha256 = Hmac<Sha256>;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Length of a base64-encoded SHA-256 MAC, padding included.
const SIGNATURE_LEN: usize = 44;

/// Browsers cap cookie lifetimes at 400 days.
const MAX_AGE_LIMIT: u64 = 400 * 24 * 60 * 60;

// ── Prefixes ──────────────────────────────────────────────────────────────────

/// Name prefixes that constrain a cookie's other attributes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CookiePrefix {
    /// `__Secure-`: must be `Secure`.
    Secure,
    /// `__Host-`: must be `Secure`, `Path=/`, and have no `Domain`.
    Host,
}

impl CookiePrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "__Secure-",
            Self::Host => "__Host-",
        }
    }
}

/// The name a cookie is stored under once `prefix` is applied.
pub fn cookie_key(name: &str, prefix: Option<CookiePrefix>) -> String {
    match prefix {
        Some(prefix) => format!("{}{name}", prefix.as_str()),
        None => name.to_owned(),
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses a `Cookie` request header into name → value.
///
/// Surrounding quotes are stripped and percent-escapes decoded. Pairs without
/// `=` are skipped; when a name repeats, the first value wins.
pub fn parse(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else { continue };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"');
        let value = if value.contains('%') {
            percent_decode_str(value)
                .decode_utf8()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_owned())
        } else {
            value.to_owned()
        };
        cookies.entry(name.to_owned()).or_insert(value);
    }
    cookies
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// `SameSite` cookie attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

/// Attributes for an outgoing cookie.
#[derive(Clone, Debug, Default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Seconds; at most 400 days.
    pub max_age: Option<u64>,
    /// Preformatted HTTP date, e.g. `Wed, 21 Oct 2026 07:28:00 GMT`.
    pub expires: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    pub partitioned: bool,
    /// Apply a name prefix and force the attributes it requires.
    pub prefix: Option<CookiePrefix>,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn expires(mut self, date: impl Into<String>) -> Self {
        self.expires = Some(date.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn prefix(mut self, prefix: CookiePrefix) -> Self {
        self.prefix = Some(prefix);
        self
    }
}

/// Serializes a `Set-Cookie` header value.
///
/// With [`CookieOptions::prefix`] set, the prefixed name is used and the
/// attributes the prefix demands are forced. A name that already carries a
/// prefix is checked instead, and a violation fails the call.
pub fn serialize(name: &str, value: &str, options: &CookieOptions) -> Result<String, CookieError> {
    let mut opts = options.clone();
    let name = match opts.prefix {
        Some(CookiePrefix::Secure) => {
            opts.secure = true;
            opts.path.get_or_insert_with(|| "/".to_owned());
            cookie_key(name, opts.prefix)
        }
        Some(CookiePrefix::Host) => {
            opts.secure = true;
            opts.path = Some("/".to_owned());
            opts.domain = None;
            cookie_key(name, opts.prefix)
        }
        None => name.to_owned(),
    };

    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(CookieError::InvalidName(name));
    }
    if name.starts_with(CookiePrefix::Secure.as_str()) && !opts.secure {
        return Err(CookieError::SecurePrefixWithoutSecure);
    }
    if name.starts_with(CookiePrefix::Host.as_str()) {
        if !opts.secure {
            return Err(CookieError::HostPrefixWithoutSecure);
        }
        if opts.path.as_deref() != Some("/") {
            return Err(CookieError::HostPrefixPath);
        }
        if opts.domain.is_some() {
            return Err(CookieError::HostPrefixDomain);
        }
    }
    if opts.partitioned && !opts.secure {
        return Err(CookieError::PartitionedWithoutSecure);
    }

    let mut out = format!("{name}={}", utf8_percent_encode(value, COMPONENT));
    if let Some(max_age) = opts.max_age {
        if max_age > MAX_AGE_LIMIT {
            return Err(CookieError::MaxAgeTooLong);
        }
        out.push_str(&format!("; Max-Age={max_age}"));
    }
    if let Some(domain) = &opts.domain {
        out.push_str(&format!("; Domain={domain}"));
    }
    if let Some(path) = &opts.path {
        out.push_str(&format!("; Path={path}"));
    }
    if let Some(expires) = &opts.expires {
        out.push_str(&format!("; Expires={expires}"));
    }
    if opts.http_only {
        out.push_str("; HttpOnly");
    }
    if opts.secure {
        out.push_str("; Secure");
    }
    if let Some(same_site) = opts.same_site {
        out.push_str(&format!("; SameSite={same_site}"));
    }
    if opts.partitioned {
        out.push_str("; Partitioned");
    }
    Ok(out)
}

/// [`serialize`] with the value replaced by its signed form.
pub fn serialize_signed(
    name: &str,
    value: &str,
    secret: &str,
    options: &CookieOptions,
) -> Result<String, CookieError> {
    serialize(name, &sign(value, secret)?, options)
}

/// RFC 6265 token characters.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
}

// ── Signing ───────────────────────────────────────────────────────────────────

fn mac(secret: &str) -> Result<HmacSha256, CookieError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CookieError::InvalidSecret)
}

/// Returns `value.<base64 signature>`, keyed by the raw bytes of `secret`.
pub fn sign(value: &str, secret: &str) -> Result<String, CookieError> {
    let mut mac = mac(secret)?;
    mac.update(value.as_bytes());
    let signature = mac.finalize().into_bytes();
    Ok(format!("{value}.{}", STANDARD.encode(signature)))
}

/// Checks a signed value and returns the unsigned prefix when the signature
/// matches.
///
/// The signature segment is shape-checked (exactly 44 characters, trailing
/// `=`) before any MAC is computed; the comparison itself is constant-time.
pub fn verify<'a>(signed: &'a str, secret: &str) -> Option<&'a str> {
    let (value, signature) = signed.rsplit_once('.')?;
    if value.is_empty() || !has_signature_shape(signature) {
        return None;
    }
    let expected = STANDARD.decode(signature).ok()?;
    let mut mac = mac(secret).ok()?;
    mac.update(value.as_bytes());
    mac.verify_slice(&expected).ok().map(|()| value)
}

fn has_signature_shape(signature: &str) -> bool {
    signature.len() == SIGNATURE_LEN && signature.ends_with('=')
}

/// Result of reading a signed cookie.
///
/// A bad signature is a routine outcome, not an error, so callers branch on
/// it explicitly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignedCookie {
    /// The signature matched; holds the unsigned value.
    Valid(String),
    /// No cookie under that name.
    Missing,
    /// Present, but the signature is malformed or does not match.
    Invalid,
}

impl SignedCookie {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Valid(v) => Some(v),
            _ => None,
        }
    }
}
