//! Backend response normalization.
//!
//! Backends reply with either a bare value or a structured envelope
//! `{body, headers, base64?, statusCode?}`. Both shapes collapse into a
//! single [`ResponseEnvelope`] with the route's response defaults applied
//! underneath whatever the backend returned.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::lambda::LambdaDefaults;

/// The normalized response handed to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub body: Value,
    pub headers: HashMap<String, String>,
    pub base64: bool,
    pub status_code: u16,
}

/// Normalizes a backend response against the route's defaults.
///
/// A response object is treated as an envelope only when it carries *both*
/// `body` and `headers`; anything else is the body itself. A reported
/// `statusCode` of 400 or above is converted into an error carrying the
/// backend body (or the whole response when there is no `body` field), so
/// backend failures flow through the same error path as gateway failures.
pub fn shape_response(response: Value, defaults: &LambdaDefaults) -> Result<ResponseEnvelope> {
    if let Some(obj) = response.as_object() {
        if let Some(status) = obj.get("statusCode").and_then(Value::as_u64) {
            if status >= 400 {
                let body = obj.get("body").cloned().unwrap_or_else(|| response.clone());
                return Err(GatewayError::Backend { status: status as u16, body });
            }
        }
    }

    let is_envelope = response
        .as_object()
        .map(|obj| obj.contains_key("body") && obj.contains_key("headers"))
        .unwrap_or(false);

    // Header names are lowercased on both sides so default/backend merges
    // collide on the name itself, not on its spelling.
    let default_headers: HashMap<String, String> = defaults
        .response_headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.clone()))
        .collect();

    if !is_envelope {
        return Ok(ResponseEnvelope {
            body: response,
            headers: default_headers,
            base64: defaults.response_base64,
            status_code: 200,
        });
    }

    let mut obj = match response {
        Value::Object(obj) => obj,
        _ => unreachable!("is_envelope implies an object"),
    };

    let mut headers = default_headers;
    if let Some(Value::Object(given)) = obj.remove("headers") {
        for (name, value) in given {
            headers.insert(name.to_lowercase(), header_value(value));
        }
    }

    let base64 = obj
        .get("base64")
        .and_then(Value::as_bool)
        .unwrap_or(defaults.response_base64);
    let status_code = obj
        .get("statusCode")
        .and_then(Value::as_u64)
        .unwrap_or(200) as u16;

    Ok(ResponseEnvelope {
        body: obj.remove("body").unwrap_or(Value::Null),
        headers,
        base64,
        status_code,
    })
}

/// Header values in backend envelopes are usually strings, but anything
/// JSON-serializable is accepted and rendered compactly.
fn header_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults_with(headers: &[(&str, &str)], base64: bool) -> LambdaDefaults {
        LambdaDefaults {
            response_headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            response_base64: base64,
            ..LambdaDefaults::default()
        }
    }

    #[test]
    fn test_plain_value_becomes_body() {
        let env = shape_response(json!("result"), &LambdaDefaults::default()).unwrap();
        assert_eq!(env.body, json!("result"));
        assert_eq!(env.status_code, 200);
        assert!(!env.base64);
        assert!(env.headers.is_empty());
    }

    #[test]
    fn test_plain_value_inherits_defaults() {
        let defaults = defaults_with(&[("content-type", "image/png")], true);
        let env = shape_response(json!("aGk="), &defaults).unwrap();
        assert!(env.base64);
        assert_eq!(env.headers.get("content-type").unwrap(), "image/png");
    }

    #[test]
    fn test_envelope_recognized_with_body_and_headers() {
        let env = shape_response(
            json!({"body": {"ok": true}, "headers": {"x-extra": "1"}, "statusCode": 201}),
            &LambdaDefaults::default(),
        )
        .unwrap();
        assert_eq!(env.body, json!({"ok": true}));
        assert_eq!(env.status_code, 201);
        assert_eq!(env.headers.get("x-extra").unwrap(), "1");
    }

    #[test]
    fn test_object_without_headers_is_plain_body() {
        let env = shape_response(
            json!({"body": "not an envelope"}),
            &LambdaDefaults::default(),
        )
        .unwrap();
        assert_eq!(env.body, json!({"body": "not an envelope"}));
    }

    #[test]
    fn test_envelope_headers_win_over_defaults() {
        let defaults = defaults_with(&[("content-type", "image/png"), ("x-keep", "yes")], false);
        let env = shape_response(
            json!({"body": "b", "headers": {"content-type": "text/plain"}}),
            &defaults,
        )
        .unwrap();
        assert_eq!(env.headers.get("content-type").unwrap(), "text/plain");
        // default keys with no collision always survive
        assert_eq!(env.headers.get("x-keep").unwrap(), "yes");
    }

    #[test]
    fn test_envelope_base64_overrides_default() {
        let defaults = defaults_with(&[], true);
        let env = shape_response(
            json!({"body": "b", "headers": {}, "base64": false}),
            &defaults,
        )
        .unwrap();
        assert!(!env.base64);
    }

    #[test]
    fn test_error_status_converts_to_backend_error() {
        let err = shape_response(
            json!({"statusCode": 401, "body": "Forbidden Error"}),
            &LambdaDefaults::default(),
        )
        .unwrap_err();
        match err {
            GatewayError::Backend { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, json!("Forbidden Error"));
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_without_body_carries_whole_response() {
        let err = shape_response(
            json!({"statusCode": 500, "reason": "backend exploded"}),
            &LambdaDefaults::default(),
        )
        .unwrap_err();
        match err {
            GatewayError::Backend { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body["reason"], json!("backend exploded"));
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_string_header_values_are_rendered() {
        let env = shape_response(
            json!({"body": "b", "headers": {"x-count": 3}}),
            &LambdaDefaults::default(),
        )
        .unwrap();
        assert_eq!(env.headers.get("x-count").unwrap(), "3");
    }
}
