//! Query-string value coercion.
//!
//! Query parameters arrive as flat strings; backends expect typed JSON. The
//! coercion rules are total: every input maps to *some* value, and anything
//! that is not recognizably a boolean, null, or number is percent-decoded and
//! kept as a string (falling back to the raw input when decoding fails).

use serde_json::{Map, Number, Value};

/// Coerces a single query-string value into a typed JSON scalar.
///
/// - `"true"` / `"false"` become booleans
/// - `"null"` / `"undefined"` become `null`
/// - numeric strings become numbers (integers stay integral)
/// - everything else is percent-decoded, or returned as-is when the
///   encoding is invalid
pub fn parse_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "undefined" => return Value::Null,
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        // "nan" and "inf" parse as f64 but have no JSON representation;
        // they fall through to the string branch.
        if f.is_finite() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }

    Value::String(percent_decode(raw).unwrap_or_else(|| raw.to_string()))
}

/// Parses a raw query string (`key=value&…`) into a typed parameter map.
///
/// Pairs with an empty key or an empty value are skipped; on duplicate keys
/// the last occurrence wins. An absent or empty query yields an empty map.
pub fn parse_query(query: Option<&str>) -> Map<String, Value> {
    let mut params = Map::new();
    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        if key.is_empty() || value.is_empty() {
            continue;
        }
        params.insert(key.to_string(), parse_scalar(value));
    }

    params
}

/// Decodes `%XX` escapes, returning `None` on malformed escapes or when the
/// decoded bytes are not valid UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scalar_booleans() {
        assert_eq!(parse_scalar("true"), json!(true));
        assert_eq!(parse_scalar("false"), json!(false));
    }

    #[test]
    fn test_parse_scalar_nullish() {
        assert_eq!(parse_scalar("null"), Value::Null);
        assert_eq!(parse_scalar("undefined"), Value::Null);
    }

    #[test]
    fn test_parse_scalar_numbers() {
        assert_eq!(parse_scalar("10"), json!(10));
        assert_eq!(parse_scalar("-3"), json!(-3));
        assert_eq!(parse_scalar("2.5"), json!(2.5));
        assert_eq!(parse_scalar("1e3"), json!(1000.0));
    }

    #[test]
    fn test_parse_scalar_non_finite_stays_string() {
        assert_eq!(parse_scalar("nan"), json!("nan"));
        assert_eq!(parse_scalar("inf"), json!("inf"));
    }

    #[test]
    fn test_parse_scalar_decodes_strings() {
        assert_eq!(parse_scalar("hello%20world"), json!("hello world"));
        assert_eq!(parse_scalar("caf%C3%A9"), json!("café"));
    }

    #[test]
    fn test_parse_scalar_fails_open_on_bad_encoding() {
        assert_eq!(parse_scalar("bad%zz"), json!("bad%zz"));
        assert_eq!(parse_scalar("trailing%2"), json!("trailing%2"));
        // %FF alone is not valid UTF-8
        assert_eq!(parse_scalar("a%FFb"), json!("a%FFb"));
    }

    #[test]
    fn test_parse_query_basic() {
        let params = parse_query(Some("a=1&b=true&c=x"));
        assert_eq!(params.get("a"), Some(&json!(1)));
        assert_eq!(params.get("b"), Some(&json!(true)));
        assert_eq!(params.get("c"), Some(&json!("x")));
    }

    #[test]
    fn test_parse_query_skips_empty_keys_and_values() {
        let params = parse_query(Some("=1&a=&b&ok=2"));
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("ok"), Some(&json!(2)));
    }

    #[test]
    fn test_parse_query_last_duplicate_wins() {
        let params = parse_query(Some("a=1&a=2&a=3"));
        assert_eq!(params.get("a"), Some(&json!(3)));
    }

    #[test]
    fn test_parse_query_absent_or_empty() {
        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }

    #[test]
    fn test_parse_query_value_containing_equals() {
        // splitn keeps everything after the first '=' in the value
        let params = parse_query(Some("eq=a=b"));
        assert_eq!(params.get("eq"), Some(&json!("a=b")));
    }
}
