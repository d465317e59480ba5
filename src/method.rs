//! Which HTTP methods an endpoint answers to.
//!
//! An endpoint declares a single method, an ordered list, or [`Methods::Any`].
//! The router registers one route per listed method; `Any` endpoints live in
//! a separate table consulted only when the method-specific lookup misses.

pub use http::Method;

/// An endpoint's method restriction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Methods {
    /// Matches every method.
    Any,
    /// Matches exactly these methods. Order is preserved; the first entry is
    /// the method assumed for in-process calls that do not name one.
    List(Vec<Method>),
}

impl Methods {
    /// Method assumed when the caller does not supply one.
    pub fn primary(&self) -> Method {
        match self {
            Self::List(list) => list.first().cloned().unwrap_or(Method::GET),
            Self::Any => Method::GET,
        }
    }

    /// `true` when every declared method is `GET` or `HEAD`.
    ///
    /// Such endpoints may not declare a body schema.
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::Any => false,
            Self::List(list) => {
                !list.is_empty()
                    && list.iter().all(|m| *m == Method::GET || *m == Method::HEAD)
            }
        }
    }

    /// The declared methods, or `None` for [`Methods::Any`].
    pub fn as_slice(&self) -> Option<&[Method]> {
        match self {
            Self::Any => None,
            Self::List(list) => Some(list),
        }
    }
}

impl Default for Methods {
    fn default() -> Self { Self::Any }
}

impl From<Method> for Methods {
    fn from(m: Method) -> Self { Self::List(vec![m]) }
}

impl From<Vec<Method>> for Methods {
    fn from(list: Vec<Method>) -> Self { Self::List(list) }
}

impl<const N: usize> From<[Method; N]> for Methods {
    fn from(list: [Method; N]) -> Self { Self::List(list.to_vec()) }
}
