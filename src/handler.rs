//! Handler trait and type erasure.
//!
//! Endpoints and middleware of *different* handler types live side by side in
//! the route table, so each handler is hidden behind a trait object:
//!
//! ```text
//! async fn hello(ctx: Context) -> Result<Value, Error>   ← user writes this
//!        ↓ Endpoint::builder("/hello").handler(hello)
//! hello.into_boxed_handler()                           ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                           ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx) per invocation                     ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(ctx).await.map(IntoReply::into_reply) })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::shape::{IntoReply, Reply};

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Reply, Error>>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid endpoint or middleware handler.
///
/// Satisfied automatically by any function or closure with the shape:
///
/// ```text
/// async fn name(ctx: Context) -> Result<impl IntoReply, Error>
/// ```
///
/// The trait is sealed; only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Reply, Error>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map(IntoReply::into_reply) })
    }
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

/// A stored async callback: `I` in, `O` out.
pub type Hook<I, O = Result<(), Error>> = Arc<dyn Fn(I) -> BoxFuture<'static, O> + Send + Sync>;

/// Boxes an async closure into a [`Hook`].
pub(crate) fn hook<I, O, F, Fut>(f: F) -> Hook<I, O>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    Arc::new(move |input| -> BoxFuture<'static, O> { Box::pin(f(input)) })
}
