//! Minimal vane example: typed JSON endpoints, middleware and cookies.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42 -H 'authorization: alice'
//!   curl -i -X POST http://localhost:3000/users \
//!        -H 'authorization: alice' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"bob"}'
//!   curl -i http://localhost:3000/admin/stats
//!   open http://localhost:3000/api/reference

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use vane::schema::{from_fn, typed};
use vane::{
    ApiError, Context, CookieOptions, Endpoint, Error, Issue, Method, Metadata, Middleware,
    OpenApiMetadata, Reply, Response, Router, RouterConfig, Server, Status,
};

const SECRET: &str = "change-me";

#[derive(Deserialize, Serialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let auth = Middleware::new(authenticate);

    let get = Endpoint::builder("/users/:id")
        .method(Method::GET)
        .middleware(auth.clone())
        .metadata(Metadata {
            openapi: Some(OpenApiMetadata { summary: Some("Fetch a user".into()), ..Default::default() }),
            ..Default::default()
        })
        .handler(get_user)?;

    let create = Endpoint::builder("/users")
        .method(Method::POST)
        .middleware(auth)
        .body(typed::<NewUser>())
        .query(from_fn(reject_unknown_query))
        .handler(create_user)?;

    let stats = Endpoint::builder("/admin/stats")
        .method(Method::GET)
        .handler(|_: Context| async { Ok::<_, Error>(json!({ "users": 1 })) })?;

    let config: RouterConfig = serde_json::from_value(json!({
        "allowed_media_types": ["application/json"],
        "openapi": { "title": "vane demo" },
    }))?;

    let app = Router::builder()
        .config(config)
        .endpoint("getUser", get)
        .endpoint("createUser", create)
        .endpoint("adminStats", stats)
        .middleware("/admin", Middleware::new(admin_gate))
        .build()?;

    Server::bind("0.0.0.0:3000").serve(app).await?;
    Ok(())
}

async fn authenticate(ctx: Context) -> Result<Value, Error> {
    let Some(user) = ctx.get_header("authorization") else {
        return Err(ctx.error(Status::Unauthorized, Some(json!({ "message": "Sign in first" }))).into());
    };
    Ok(json!({ "user": user }))
}

async fn admin_gate(_: Context) -> Result<Reply, Error> {
    Ok(Reply::Response(Response::status(Status::Forbidden)))
}

fn reject_unknown_query(query: Value) -> Result<Value, Vec<Issue>> {
    match query.as_object() {
        Some(map) if map.keys().all(|k| k == "notify") => Ok(query),
        _ => Err(vec![Issue::new("only `notify` is accepted")]),
    }
}

// GET /users/:id
async fn get_user(ctx: Context) -> Result<Reply, Error> {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    let viewer: Option<String> = ctx.get("user");
    Ok(ctx.json(json!({ "id": id, "viewer": viewer })))
}

// POST /users → 201, with a signed session cookie.
async fn create_user(ctx: Context) -> Result<Reply, Error> {
    let user: NewUser = ctx.body_as()?;
    if user.name.is_empty() {
        return Err(ApiError::new(Status::BadRequest).with_message("Name is required").into());
    }
    ctx.set_signed_cookie("session", &user.name, SECRET, &CookieOptions::new().http_only(true))?;
    ctx.set_status(Status::Created);
    ctx.set_header("location", "/users/99")?;
    Ok(ctx.json(json!({ "id": "99", "name": user.name })))
}
