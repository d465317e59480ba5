//! Middleware: pathless handlers that contribute to the context.
//!
//! A middleware runs before an endpoint's handler, either because the
//! endpoint lists it in its `use` chain or because the router registered it
//! against a path pattern. It can:
//!
//! - return an object, whose keys are merged into the caller's capability
//!   bag ([`Context::context`](crate::Context::context));
//! - set headers and cookies, which flow into the final response;
//! - return a [`Response`](crate::Response), which ends the request there;
//! - fail, which aborts the chain. An [`ApiError`] picks up the headers the
//!   middleware had set.
//!
//! ```rust
//! use serde_json::json;
//! use vane::{Context, Error, Middleware};
//!
//! let auth = Middleware::new(|ctx: Context| async move {
//!     let user = ctx.get_header("x-user").unwrap_or("anonymous").to_owned();
//!     Ok::<_, Error>(json!({ "user": user }))
//! });
//! # let _ = auth;
//! ```

use std::sync::Arc;

use http::HeaderMap;

use crate::context::{self, BuildOptions, CallInput};
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::shape::{Outcome, Reply};

/// A composable, pathless handler.
#[derive(Clone)]
pub struct Middleware {
    inner: Arc<Inner>,
}

struct Inner {
    middleware: Vec<Middleware>,
    handler: BoxedHandler,
}

impl Middleware {
    pub fn new(handler: impl Handler) -> Self {
        Self::builder().handler(handler)
    }

    /// Builder for middleware with its own `use` chain.
    pub fn builder() -> MiddlewareBuilder {
        MiddlewareBuilder { middleware: Vec::new() }
    }

    /// Calls the middleware directly.
    ///
    /// Returns [`Outcome::Headers`] when the input asks for headers, else
    /// [`Outcome::Raw`].
    pub async fn call(&self, input: CallInput) -> Result<Outcome, Error> {
        let return_headers = input.shape.return_headers;
        let (reply, headers) = self.run(input).await?;
        Ok(if return_headers {
            Outcome::Headers { headers, response: reply }
        } else {
            Outcome::Raw(reply)
        })
    }

    /// Runs the chain and handler, returning the reply and the headers set.
    ///
    /// Boxed: building a context runs middleware, which builds a context.
    pub(crate) fn run(&self, input: CallInput) -> BoxFuture<'static, Result<(Reply, HeaderMap), Error>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let options = BuildOptions {
                middleware: &inner.middleware,
                path: Some("/"),
                ..BuildOptions::default()
            };
            let ctx = context::build(input, &options).await?;
            let state = ctx.state();
            match inner.handler.call(ctx).await {
                Ok(reply) => Ok((reply, state.response().0)),
                Err(Error::Api(mut err)) => {
                    err.layer_under(&state.response().0);
                    Err(Error::Api(err))
                }
                Err(other) => Err(other),
            }
        })
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("use", &self.inner.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Obtained from [`Middleware::builder`].
pub struct MiddlewareBuilder {
    middleware: Vec<Middleware>,
}

impl MiddlewareBuilder {
    /// Appends to the `use` chain, which runs before this middleware's handler.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn handler(self, handler: impl Handler) -> Middleware {
        Middleware {
            inner: Arc::new(Inner { middleware: self.middleware, handler: handler.into_boxed_handler() }),
        }
    }
}
