//! # vane
//!
//! A request-processing runtime for typed HTTP endpoints.
//!
//! An [`Endpoint`] is a handler plus its contract: path, methods, body and
//! query schemas, and a chain of [`Middleware`] that contribute to a
//! per-call capability bag. A [`Router`] matches requests against a radix
//! tree per method, runs path-scoped middleware, invokes the endpoint, and
//! applies one error policy to whatever went wrong.
//!
//! Endpoints are plain values. The same endpoint can be called in-process
//! with [`Endpoint::call`], where errors come back structured, or through
//! the router, where they become responses.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::{Value, json};
//! use vane::{Context, Endpoint, Error, Method, Middleware, Reply, Router, Server, Status};
//!
//! async fn get_user(ctx: Context) -> Result<Reply, Error> {
//!     let id = ctx.param("id").unwrap_or_default();
//!     let caller = ctx.context().get("user").cloned().unwrap_or(Value::Null);
//!     Ok(ctx.json(json!({ "id": id, "requested_by": caller })))
//! }
//!
//! async fn auth(ctx: Context) -> Result<Value, Error> {
//!     match ctx.get_header("authorization") {
//!         Some(token) => Ok(json!({ "user": token })),
//!         None => Err(ctx.error(Status::Unauthorized, None).into()),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = Endpoint::builder("/users/:id")
//!         .method(Method::GET)
//!         .middleware(Middleware::new(auth))
//!         .handler(get_user)?;
//!
//!     let app = Router::builder().endpoint("getUser", users).build()?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await?;
//!     Ok(())
//! }
//! ```

mod api_error;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod body;
pub mod context;
pub mod cookie;
pub mod docs;
pub mod endpoint;
pub mod middleware;
pub mod schema;
pub mod shape;

pub use api_error::ApiError;
pub use context::{CallInput, Context, Params};
pub use cookie::{CookieOptions, CookiePrefix, SameSite, SignedCookie};
pub use endpoint::{Endpoint, EndpointBuilder, EndpointFactory, Metadata, OpenApiMetadata};
pub use error::{ConfigError, CookieError, Error, Result, ValidationError};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, Methods};
pub use middleware::Middleware;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{ErrorDecision, OpenApiConfig, RequestDecision, Router, RouterBuilder, RouterConfig};
pub use schema::{Issue, Schema, SharedSchema};
pub use server::Server;
pub use shape::{IntoReply, JsonOptions, Outcome, Reply, ReturnShape};
pub use status::Status;
