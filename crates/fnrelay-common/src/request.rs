//! Canonical request representation.
//!
//! Incoming HTTP requests are normalized into [`RequestArgs`] before any
//! routing or dispatch decision is made. The canonical form carries a
//! normalized URI (single leading slash, no slash runs, no trailing slash),
//! a typed parameter map, and the parsed JSON body for methods that have one.

use std::collections::HashMap;

use hyper::http::request::Parts;
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};
use crate::scalar::parse_query;

/// The split view of the request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Path plus query string, exactly as received.
    pub path: String,
    /// Path without the query string.
    pub pathname: String,
    /// Query string without the leading `?`, if any.
    pub query: Option<String>,
}

/// A parsed, canonicalized request.
///
/// Owned by the pipeline for the lifetime of one request; the authentication
/// stage is the only stage that mutates it (to attach verified claims under
/// `params.auth`).
#[derive(Debug, Clone)]
pub struct RequestArgs {
    /// Uppercase HTTP method name.
    pub method: String,
    /// Request origin (`http://` + Host header). Doubles as the cache
    /// namespace.
    pub host: String,
    /// Header map with lowercase names, as the HTTP layer yields them.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body for POST/PUT; `{}` for every other method.
    pub body: Value,
    /// Typed query parameters.
    pub params: Map<String, Value>,
    /// Whether the pathname contains a `.` (file-like request).
    pub has_extension: bool,
    /// Normalized request path used for route resolution.
    pub uri: String,
    pub url: UrlParts,
}

impl RequestArgs {
    /// Builds canonical args from a request head and its collected body.
    ///
    /// Body bytes are parsed as JSON only for POST and PUT; a parse failure
    /// is a 400-class error. An empty body is treated as `{}` so bodyless
    /// POSTs still flow through the pipeline.
    pub fn parse(parts: &Parts, body: &[u8]) -> Result<RequestArgs> {
        let method = parts.method.as_str().to_string();

        let mut headers = HashMap::new();
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let host_header = headers
            .get("host")
            .map(String::as_str)
            .or_else(|| parts.uri.host())
            .unwrap_or("localhost");
        let host = format!("http://{}", host_header);

        let pathname = parts.uri.path().to_string();
        let query = parts.uri.query().map(str::to_string);
        let path = match &query {
            Some(q) => format!("{}?{}", pathname, q),
            None => pathname.clone(),
        };

        let body = if method == "POST" || method == "PUT" {
            if body.is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_slice(body).map_err(|e| {
                    GatewayError::BadRequest(format!("invalid JSON body: {}", e))
                })?
            }
        } else {
            Value::Object(Map::new())
        };

        Ok(RequestArgs {
            method,
            host,
            params: parse_query(query.as_deref()),
            has_extension: pathname.contains('.'),
            uri: normalize_uri(&pathname),
            url: UrlParts { path, pathname, query },
            headers,
            body,
        })
    }
}

/// Normalizes a pathname: collapses slash runs, strips the trailing slash,
/// and maps the empty path to `/`. Idempotent.
pub fn normalize_uri(pathname: &str) -> String {
    let joined = pathname
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;
    use serde_json::json;

    fn parts_for(method: &str, target: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().method(method).uri(target);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_normalize_uri() {
        assert_eq!(normalize_uri(""), "/");
        assert_eq!(normalize_uri("/"), "/");
        assert_eq!(normalize_uri("//a///b//"), "/a/b");
        assert_eq!(normalize_uri("/a/b/"), "/a/b");
        assert_eq!(normalize_uri("a/b"), "/a/b");
    }

    #[test]
    fn test_normalize_uri_idempotent() {
        for raw in ["", "/", "//x//y/", "/a/b/c", "weird//path/"] {
            let once = normalize_uri(raw);
            assert_eq!(normalize_uri(&once), once);
        }
    }

    #[test]
    fn test_parse_get_request() {
        let parts = parts_for("GET", "/img?width=10&flag=true", &[("host", "h")]);
        let args = RequestArgs::parse(&parts, b"").unwrap();

        assert_eq!(args.method, "GET");
        assert_eq!(args.host, "http://h");
        assert_eq!(args.uri, "/img");
        assert_eq!(args.url.pathname, "/img");
        assert_eq!(args.url.path, "/img?width=10&flag=true");
        assert_eq!(args.url.query.as_deref(), Some("width=10&flag=true"));
        assert_eq!(args.params.get("width"), Some(&json!(10)));
        assert_eq!(args.params.get("flag"), Some(&json!(true)));
        assert_eq!(args.body, json!({}));
        assert!(!args.has_extension);
    }

    #[test]
    fn test_parse_detects_extension() {
        let parts = parts_for("GET", "/assets/logo.png", &[("host", "h")]);
        let args = RequestArgs::parse(&parts, b"").unwrap();
        assert!(args.has_extension);
    }

    #[test]
    fn test_parse_post_body() {
        let parts = parts_for("POST", "/cache", &[("host", "h")]);
        let args = RequestArgs::parse(&parts, br#"{"operation":"unset"}"#).unwrap();
        assert_eq!(args.body["operation"], json!("unset"));
    }

    #[test]
    fn test_parse_post_empty_body_is_object() {
        let parts = parts_for("POST", "/x", &[("host", "h")]);
        let args = RequestArgs::parse(&parts, b"").unwrap();
        assert_eq!(args.body, json!({}));
    }

    #[test]
    fn test_parse_post_invalid_body_is_bad_request() {
        let parts = parts_for("POST", "/x", &[("host", "h")]);
        let err = RequestArgs::parse(&parts, b"{nope").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_parse_ignores_body_for_get() {
        let parts = parts_for("GET", "/x", &[("host", "h")]);
        let args = RequestArgs::parse(&parts, b"{nope").unwrap();
        assert_eq!(args.body, json!({}));
    }

    #[test]
    fn test_headers_are_lowercase() {
        let parts = parts_for("GET", "/x", &[("host", "h"), ("Authorization", "tok")]);
        let args = RequestArgs::parse(&parts, b"").unwrap();
        assert_eq!(args.headers.get("authorization").map(String::as_str), Some("tok"));
    }

    #[test]
    fn test_missing_host_falls_back() {
        let parts = parts_for("GET", "/x", &[]);
        let args = RequestArgs::parse(&parts, b"").unwrap();
        assert_eq!(args.host, "http://localhost");
    }
}
