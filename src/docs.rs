//! Generated API reference.
//!
//! [`generate`] walks the routable endpoints and produces a minimal
//! OpenAPI 3.1 document; [`render_html`] wraps it in a page that loads the
//! Scalar API reference viewer from a CDN. The router serves the page as a
//! plain `GET` endpoint.

use serde_json::{Map, Value, json};

use crate::endpoint::Endpoint;
use crate::method::Method;

const ANY_METHODS: [Method; 5] = [Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Builds an OpenAPI document for `endpoints`.
///
/// Pathless and `server_only` endpoints are skipped.
pub fn generate<'a>(endpoints: impl IntoIterator<Item = &'a Endpoint>, title: &str) -> Value {
    let mut paths = Map::new();

    for endpoint in endpoints {
        let Some(path) = endpoint.path() else { continue };
        if endpoint.metadata().server_only {
            continue;
        }
        let (template, params) = openapi_path(path);
        let methods = endpoint.methods().as_slice().map(<[Method]>::to_vec).unwrap_or_else(|| ANY_METHODS.to_vec());

        let item = paths.entry(template).or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(item) = item else { continue };
        for method in methods {
            item.insert(method.as_str().to_ascii_lowercase(), operation(endpoint, &params));
        }
    }

    json!({
        "openapi": "3.1.1",
        "info": { "title": title, "version": "1.0.0" },
        "paths": paths,
    })
}

fn operation(endpoint: &Endpoint, params: &[String]) -> Value {
    let mut op = Map::new();
    if let Some(meta) = &endpoint.metadata().openapi {
        if let Some(summary) = &meta.summary {
            op.insert("summary".into(), json!(summary));
        }
        if let Some(description) = &meta.description {
            op.insert("description".into(), json!(description));
        }
        if !meta.tags.is_empty() {
            op.insert("tags".into(), json!(meta.tags));
        }
        if let Some(id) = &meta.operation_id {
            op.insert("operationId".into(), json!(id));
        }
    }
    if !params.is_empty() {
        let parameters: Vec<Value> = params
            .iter()
            .map(|name| json!({ "name": name, "in": "path", "required": true, "schema": { "type": "string" } }))
            .collect();
        op.insert("parameters".into(), Value::Array(parameters));
    }
    if endpoint.has_body_schema() {
        op.insert(
            "requestBody".into(),
            json!({ "required": true, "content": { "application/json": { "schema": { "type": "object" } } } }),
        );
    }
    op.insert("responses".into(), json!({ "200": { "description": "Success" } }));
    Value::Object(op)
}

/// Rewrites a route template into OpenAPI form and lists its parameters.
fn openapi_path(path: &str) -> (String, Vec<String>) {
    let mut params = Vec::new();
    let mut unnamed = 0;
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            let name = if let Some(name) = segment.strip_prefix("**:") {
                name.to_owned()
            } else if segment == "**" {
                "_".to_owned()
            } else if segment == "*" {
                unnamed += 1;
                format!("_{}", unnamed - 1)
            } else if let Some(name) = segment.strip_prefix(':') {
                name.to_owned()
            } else if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                name.trim_start_matches('*').to_owned()
            } else {
                return segment.to_owned();
            };
            let rendered = format!("{{{name}}}");
            params.push(name);
            rendered
        })
        .collect();
    (segments.join("/"), params)
}

/// Renders the reference page for `document`.
pub fn render_html(document: &Value, title: &str) -> String {
    // `</script>` inside the document must not end the data block.
    let data = document.to_string().replace("</", "<\\/");
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
</head>
<body>
    <script id="api-reference" type="application/json">{data}</script>
    <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::endpoint::{Metadata, OpenApiMetadata};
    use crate::error::Error;
    use crate::schema::from_fn;

    async fn noop(_: Context) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn path_templates_are_rewritten() {
        assert_eq!(openapi_path("/users/:id"), ("/users/{id}".to_owned(), vec!["id".to_owned()]));
        assert_eq!(openapi_path("/a/*/b/*").1, vec!["_0".to_owned(), "_1".to_owned()]);
        assert_eq!(openapi_path("/files/**:rest").0, "/files/{rest}");
        assert_eq!(openapi_path("/plain").1, Vec::<String>::new());
    }

    #[test]
    fn server_only_routes_are_left_out() {
        let public = Endpoint::builder("/users/:id")
            .method(Method::GET)
            .metadata(Metadata {
                openapi: Some(OpenApiMetadata { summary: Some("Fetch".into()), ..Default::default() }),
                ..Default::default()
            })
            .handler(noop)
            .unwrap();
        let hidden = Endpoint::builder("/internal")
            .metadata(Metadata { server_only: true, ..Default::default() })
            .handler(noop)
            .unwrap();
        let create = Endpoint::builder("/users")
            .method(Method::POST)
            .body(from_fn(Ok))
            .handler(noop)
            .unwrap();

        let doc = generate([&public, &hidden, &create], "API");
        assert_eq!(doc["paths"]["/users/{id}"]["get"]["summary"], "Fetch");
        assert_eq!(doc["paths"]["/users/{id}"]["get"]["parameters"][0]["name"], "id");
        assert!(doc["paths"]["/users"]["post"]["requestBody"].is_object());
        assert!(doc["paths"].get("/internal").is_none());
    }

    #[test]
    fn html_embeds_document_safely() {
        let html = render_html(&json!({ "x": "</script>" }), "<API>");
        assert!(html.contains("&lt;API&gt;"));
        assert!(!html.contains("\"</script>\""));
    }
}
