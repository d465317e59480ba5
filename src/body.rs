//! Query-string parsing and request body decoding.
//!
//! | content type                          | decoded as                         |
//! |---------------------------------------|------------------------------------|
//! | `application/json`, `*/*+json`        | JSON value                         |
//! | `application/x-www-form-urlencoded`   | object, repeated keys → arrays     |
//! | `multipart/form-data`                 | object, files → `{name,type,size}` |
//! | `text/*`, or no content type          | string                             |
//! | anything else                         | `415 UNSUPPORTED_MEDIA_TYPE`       |

use std::io;

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Map, Value, json};

use crate::api_error::ApiError;
use crate::request::Request;

/// Parses a query string into an object. A key seen more than once maps to
/// an array of its values, in order.
pub fn parse_query(raw: &str) -> Map<String, Value> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_default();
    collect(pairs.into_iter().map(|(k, v)| (k, Value::String(v))))
}

fn collect(pairs: impl IntoIterator<Item = (String, Value)>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in pairs {
        insert_repeated(&mut out, key, value);
    }
    out
}

fn insert_repeated(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        None => {
            map.insert(key, value);
        }
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Lower-cased media type without parameters.
fn essence(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Decodes a request body.
///
/// `allowed` restricts the accepted media types; a content type outside it
/// fails with `415` before the body is looked at. Requests without a
/// content type are not subject to the allow-list. Empty bodies decode to
/// `None`.
pub async fn decode(request: &Request, allowed: Option<&[String]>) -> Result<Option<Value>, ApiError> {
    let content_type = request.header("content-type");
    let media = content_type.map(essence);

    if let (Some(allowed), Some(media)) = (allowed, media.as_deref()) {
        if !allowed.iter().any(|a| essence(a) == media) {
            return Err(unsupported(media));
        }
    }

    let body = request.body();
    if body.is_empty() {
        return Ok(None);
    }

    let value = match media.as_deref() {
        None => text(body),
        Some(m) if m == "application/json" || m.ends_with("+json") => {
            serde_json::from_slice(body).map_err(|e| malformed("JSON", e))?
        }
        Some("application/x-www-form-urlencoded") => {
            let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
                .map_err(|e| malformed("form", e))?;
            Value::Object(collect(pairs.into_iter().map(|(k, v)| (k, Value::String(v)))))
        }
        Some("multipart/form-data") => {
            multipart(content_type.unwrap_or_default(), body.clone()).await?
        }
        Some(m) if m.starts_with("text/") => text(body),
        Some(m) => return Err(unsupported(m)),
    };
    Ok(Some(value))
}

fn text(body: &Bytes) -> Value {
    Value::String(String::from_utf8_lossy(body).into_owned())
}

async fn multipart(content_type: &str, body: Bytes) -> Result<Value, ApiError> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| malformed("multipart", e))?;
    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = Map::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| malformed("multipart", e))? {
        let name = field.name().unwrap_or_default().to_owned();
        let value = match field.file_name() {
            Some(file_name) => {
                let file_name = file_name.to_owned();
                let kind = field
                    .content_type()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_owned());
                let data = field.bytes().await.map_err(|e| malformed("multipart", e))?;
                json!({ "name": file_name, "type": kind, "size": data.len() })
            }
            None => Value::String(field.text().await.map_err(|e| malformed("multipart", e))?),
        };
        insert_repeated(&mut fields, name, value);
    }
    Ok(Value::Object(fields))
}

fn unsupported(media: &str) -> ApiError {
    ApiError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE).with_body(json!({
        "message": format!("Unsupported media type: {media}"),
        "code": "UNSUPPORTED_MEDIA_TYPE",
    }))
}

fn malformed(kind: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST).with_body(json!({
        "message": format!("Invalid {kind} body: {err}"),
        "code": "INVALID_BODY",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, Method};

    fn post(content_type: Option<&str>, body: &[u8]) -> Request {
        let mut req = Request::new(Method::POST, "/".parse().unwrap()).with_body(body.to_vec());
        if let Some(ct) = content_type {
            req = req.with_header(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        req
    }

    #[test]
    fn repeated_query_keys_become_arrays() {
        let q = parse_query("a=1&b=2&a=3&a=4&c=x%20y");
        assert_eq!(Value::Object(q), json!({ "a": ["1", "3", "4"], "b": "2", "c": "x y" }));
        assert!(parse_query("").is_empty());
    }

    #[tokio::test]
    async fn decodes_json_form_and_text() {
        let json_req = post(Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        assert_eq!(decode(&json_req, None).await.unwrap(), Some(json!({ "a": 1 })));

        let problem = post(Some("application/problem+json"), b"[1]");
        assert_eq!(decode(&problem, None).await.unwrap(), Some(json!([1])));

        let form = post(Some("application/x-www-form-urlencoded"), b"tag=a&tag=b&name=x");
        assert_eq!(decode(&form, None).await.unwrap(), Some(json!({ "tag": ["a", "b"], "name": "x" })));

        let text = post(None, b"hello");
        assert_eq!(decode(&text, None).await.unwrap(), Some(json!("hello")));
    }

    #[tokio::test]
    async fn empty_body_is_absent() {
        let req = post(Some("application/json"), b"");
        assert_eq!(decode(&req, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let req = post(Some("application/json"), b"{nope");
        let err = decode(&req, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_or_disallowed_media_types_are_415() {
        let req = post(Some("application/xml"), b"<a/>");
        let err = decode(&req, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.code(), Some("UNSUPPORTED_MEDIA_TYPE"));

        let allowed = vec!["application/json".to_owned()];
        let req = post(Some("text/plain"), b"hi");
        let err = decode(&req, Some(&allowed)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn multipart_fields_and_files() {
        let body = concat!(
            "--XX\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "hello\r\n",
            "--XX\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "12345\r\n",
            "--XX--\r\n",
        );
        let req = post(Some("multipart/form-data; boundary=XX"), body.as_bytes());
        let value = decode(&req, None).await.unwrap().unwrap();
        assert_eq!(value["title"], "hello");
        assert_eq!(value["upload"], json!({ "name": "a.txt", "type": "text/plain", "size": 5 }));
    }
}
