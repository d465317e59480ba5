//! End-to-end request scenarios through `Router::handle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderValue, StatusCode};
use serde_json::{Value, json};
use vane::schema::from_fn;
use vane::{
    ConfigError, Context, CookieOptions, Endpoint, Error, Issue, Method, Middleware, Reply, Request,
    Response, Router, Status,
};

fn contributes(value: Value) -> Middleware {
    Middleware::new(move |_: Context| {
        let value = value.clone();
        async move { Ok::<_, Error>(value) }
    })
}

fn json_post(path: &str, body: &'static str) -> Request {
    Request::new(Method::POST, path.parse().unwrap())
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(body)
}

fn get(path: &str) -> Request {
    Request::new(Method::GET, path.parse().unwrap())
}

#[tokio::test]
async fn middleware_contribution_is_visible_to_the_handler() {
    let endpoint = Endpoint::builder("/user")
        .method(Method::POST)
        .middleware(contributes(json!({ "test": "demo" })))
        .handler(|ctx: Context| async move {
            assert_eq!(ctx.context()["test"], "demo");
            Ok::<_, Error>(ctx.json(json!({})))
        })
        .unwrap();
    let app = Router::builder().endpoint("user", endpoint).build().unwrap();

    let res = app.handle(json_post("/user", "{}")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json_body().unwrap(), json!({}));
}

#[tokio::test]
async fn each_set_cookie_call_adds_a_header() {
    let endpoint = Endpoint::builder("/hello")
        .method(Method::GET)
        .middleware(contributes(json!({ "test": "hello" })))
        .middleware(contributes(json!({ "test2": "world" })))
        .handler(|ctx: Context| async move {
            ctx.set_cookie("hello", "world", &CookieOptions::new())?;
            ctx.set_cookie("test", "value", &CookieOptions::new())?;
            let merged = ctx.context().clone();
            Ok::<_, Error>(ctx.json(Value::Object(merged)))
        })
        .unwrap();
    let app = Router::builder().endpoint("hello", endpoint).build().unwrap();

    let res = app.handle(get("/hello")).await.unwrap();
    let cookies: Vec<&str> = res.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(cookies, ["hello=world", "test=value"]);
    assert_eq!(res.json_body().unwrap(), json!({ "test": "hello", "test2": "world" }));
}

#[tokio::test]
async fn consecutive_slashes_are_always_not_found() {
    let endpoint = Endpoint::builder("/**").handler(|_: Context| async { Ok::<_, Error>("hit") }).unwrap();
    let app = Router::builder().endpoint("all", endpoint).build().unwrap();

    assert_eq!(app.handle(get("/a/b")).await.unwrap().status_code(), StatusCode::OK);
    assert_eq!(app.handle(get("//a")).await.unwrap().status_code(), StatusCode::NOT_FOUND);
    assert_eq!(app.handle(get("/a//b")).await.unwrap().status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_middleware_response_skips_the_endpoint() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let endpoint = Endpoint::builder("/admin/x")
        .handler(move |_: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>("secret") }
        })
        .unwrap();
    let gate = Middleware::new(|_: Context| async {
        Ok::<_, Error>(Reply::Response(Response::builder().status(Status::Forbidden).text("nope")))
    });
    let app = Router::builder()
        .endpoint("admin", endpoint)
        .middleware("/admin", gate)
        .build()
        .unwrap();

    let res = app.handle(get("/admin/x")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.body().as_ref(), b"nope");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn path_middleware_runs_in_registration_order_for_any_method() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = |tag: &'static str| {
        let order = Arc::clone(&order);
        Middleware::new(move |ctx: Context| {
            order.lock().push(format!("{tag}:{}", ctx.method()));
            async { Ok::<_, Error>(()) }
        })
    };
    let endpoint = Endpoint::builder("/items/:id").handler(|_: Context| async { Ok::<_, Error>(()) }).unwrap();
    let app = Router::builder()
        .endpoint("item", endpoint)
        .middleware("/items/*", record("one"))
        .middleware("/", record("two"))
        .middleware("/other", record("never"))
        .build()
        .unwrap();

    let res = app.handle(Request::new(Method::DELETE, "/items/3".parse().unwrap())).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(*order.lock(), ["one:DELETE", "two:DELETE"]);
}

#[test]
fn body_schema_on_get_and_head_fails_construction() {
    let result = Endpoint::builder("/x")
        .method([Method::GET, Method::HEAD])
        .body(from_fn(Ok))
        .handler(|_: Context| async { Ok::<_, Error>(()) });
    assert!(matches!(result, Err(ConfigError::BodyOnReadOnlyMethod)));
}

#[tokio::test]
async fn validation_failure_is_a_400_response() {
    let endpoint = Endpoint::builder("/users")
        .method(Method::POST)
        .body(from_fn(|v| match v.get("name") {
            Some(Value::String(_)) => Ok(v),
            _ => Err(vec![Issue::new("name is required").at("name")]),
        }))
        .handler(|_: Context| async { Ok::<_, Error>(()) })
        .unwrap();
    let app = Router::builder().endpoint("create", endpoint).build().unwrap();

    let res = app.handle(json_post("/users", r#"{"age":3}"#)).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = res.json_body().unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "Invalid body parameters");
}

#[tokio::test]
async fn redirect_answers_302_with_location() {
    let endpoint = Endpoint::builder("/old")
        .handler(|ctx: Context| async move { Err::<(), Error>(ctx.redirect("/new").into()) })
        .unwrap();
    let app = Router::builder().endpoint("old", endpoint).build().unwrap();

    let res = app.handle(get("/old")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "/new");
}

#[tokio::test]
async fn middleware_api_error_keeps_its_cookies() {
    let deny = Middleware::new(|ctx: Context| async move {
        ctx.set_cookie("attempt", "1", &CookieOptions::new())?;
        Err::<(), Error>(ctx.error(Status::Unauthorized, Some(json!({ "message": "Sign in" }))).into())
    });
    let endpoint = Endpoint::builder("/me")
        .middleware(deny)
        .handler(|_: Context| async { Ok::<_, Error>("me") })
        .unwrap();
    let app = Router::builder().endpoint("me", endpoint).build().unwrap();

    let res = app.handle(get("/me")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()[SET_COOKIE], "attempt=1");
    assert_eq!(res.json_body().unwrap()["code"], "SIGN_IN");
}

#[tokio::test]
async fn signed_cookie_round_trips_through_requests() {
    const SECRET: &str = "s3cret";
    let login = Endpoint::builder("/login")
        .method(Method::POST)
        .handler(|ctx: Context| async move {
            ctx.set_signed_cookie("session", "ada", SECRET, &CookieOptions::new())?;
            Ok::<_, Error>(())
        })
        .unwrap();
    let whoami = Endpoint::builder("/whoami")
        .method(Method::GET)
        .handler(|ctx: Context| async move {
            let who = ctx.get_signed_cookie("session", SECRET, None);
            Ok::<_, Error>(json!({ "who": who.value(), "tampered": who == vane::SignedCookie::Invalid }))
        })
        .unwrap();
    let app = Router::builder().endpoint("login", login).endpoint("whoami", whoami).build().unwrap();

    let res = app.handle(Request::new(Method::POST, "/login".parse().unwrap())).await.unwrap();
    let set_cookie = res.header("set-cookie").unwrap().to_owned();
    let pair = set_cookie.split(';').next().unwrap().to_owned();

    let req = get("/whoami").with_header(http::header::COOKIE, HeaderValue::from_str(&pair).unwrap());
    let res = app.handle(req).await.unwrap();
    assert_eq!(res.json_body().unwrap(), json!({ "who": "ada", "tampered": false }));

    let forged = pair.replacen("ada", "eve", 1);
    let req = get("/whoami").with_header(http::header::COOKIE, HeaderValue::from_str(&forged).unwrap());
    let res = app.handle(req).await.unwrap();
    assert_eq!(res.json_body().unwrap(), json!({ "who": null, "tampered": true }));
}

#[tokio::test]
async fn query_and_form_bodies_reach_the_handler() {
    let endpoint = Endpoint::builder("/search")
        .method(Method::POST)
        .handler(|ctx: Context| async move {
            Ok::<_, Error>(json!({ "query": ctx.query().cloned(), "body": ctx.body().cloned() }))
        })
        .unwrap();
    let app = Router::builder().endpoint("search", endpoint).build().unwrap();

    let req = Request::new(Method::POST, "/search?tag=a&tag=b&q=x".parse().unwrap())
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
        .with_body("page=2");
    let res = app.handle(req).await.unwrap();
    assert_eq!(
        res.json_body().unwrap(),
        json!({ "query": { "tag": ["a", "b"], "q": "x" }, "body": { "page": "2" } })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_keep_their_own_headers() {
    let endpoint = Endpoint::builder("/echo/:id")
        .method(Method::GET)
        .handler(|ctx: Context| async move {
            let id = ctx.param("id").unwrap_or_default().to_owned();
            ctx.set_cookie("who", &id, &CookieOptions::new())?;
            tokio::task::yield_now().await;
            ctx.set_header("x-id", &id)?;
            Ok::<_, Error>(json!({ "id": id }))
        })
        .unwrap();
    let app = Arc::new(Router::builder().endpoint("echo", endpoint).build().unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..32 {
        let app = Arc::clone(&app);
        tasks.spawn(async move { (n, app.handle(get(&format!("/echo/{n}"))).await.unwrap()) });
    }
    while let Some(joined) = tasks.join_next().await {
        let (n, res) = joined.unwrap();
        let cookies: Vec<&str> = res.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(cookies, [format!("who={n}")]);
        assert_eq!(res.header("x-id"), Some(n.to_string().as_str()));
        assert_eq!(res.json_body().unwrap(), json!({ "id": n.to_string() }));
    }
}

#[tokio::test]
async fn redirect_after_set_cookie_sends_the_cookie_once() {
    let endpoint = Endpoint::builder("/old")
        .handler(|ctx: Context| async move {
            ctx.set_cookie("flash", "1", &CookieOptions::new())?;
            Err::<(), Error>(ctx.redirect("/new").into())
        })
        .unwrap();
    let bounce = Middleware::new(|ctx: Context| async move {
        ctx.set_cookie("flash", "2", &CookieOptions::new())?;
        Err::<(), Error>(ctx.redirect("/elsewhere").into())
    });
    let guarded = Endpoint::builder("/guarded")
        .middleware(bounce)
        .handler(|_: Context| async { Ok::<_, Error>(()) })
        .unwrap();
    let app = Router::builder().endpoint("old", endpoint).endpoint("guarded", guarded).build().unwrap();

    let res = app.handle(get("/old")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FOUND);
    let cookies: Vec<&str> = res.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(cookies, ["flash=1"]);

    let res = app.handle(get("/guarded")).await.unwrap();
    assert_eq!(res.headers()[LOCATION], "/elsewhere");
    let cookies: Vec<&str> = res.headers().get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(cookies, ["flash=2"]);
}

#[tokio::test]
async fn early_middleware_response_keeps_prior_cookies() {
    let trace = Middleware::new(|ctx: Context| async move {
        ctx.set_cookie("trace", "1", &CookieOptions::new())?;
        Ok::<_, Error>(())
    });
    let deny = Middleware::new(|_: Context| async { Ok::<_, Error>(Reply::Response(Response::status(Status::Forbidden))) });
    let endpoint = Endpoint::builder("/locked")
        .middleware(trace)
        .middleware(deny)
        .handler(|_: Context| async { Ok::<_, Error>("open") })
        .unwrap();
    let app = Router::builder().endpoint("locked", endpoint).build().unwrap();

    let res = app.handle(get("/locked")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.headers()[SET_COOKIE], "trace=1");
}
