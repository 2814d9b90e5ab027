//! Imperative cache operations.
//!
//! `POST /cache` lets operators refresh or evict entries without waiting for
//! the TTR/TTL clocks. The body names the operation and its arguments; the
//! namespace defaults to the requesting host, so an operator curling the
//! gateway acts on the same entries its clients populate.

use std::sync::Arc;

use serde_json::{json, Value};

use fnrelay_common::{GatewayError, RequestArgs, Result};

use crate::cache::CacheStore;

/// Handles a cache-admin request. The reply body echoes the operation name
/// mapped to the store's result, e.g. `{"unset": 2}`.
///
/// Requests are rejected with 404 when no cache store is configured and 400
/// for unknown operations or a non-object body.
pub async fn handle_cache_admin(
    store: Option<&Arc<dyn CacheStore>>,
    args: &RequestArgs,
) -> Result<Value> {
    let store = store.ok_or(GatewayError::NotFound)?;

    let body = args.body.as_object().ok_or_else(|| {
        GatewayError::BadRequest("cache operation body must be a JSON object".into())
    })?;

    let operation = body
        .get("operation")
        .and_then(Value::as_str)
        .unwrap_or("markToRefresh");
    let namespace = body
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or(&args.host);
    let keys: Vec<String> = body
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let result = match operation {
        "markToRefresh" => store.mark_to_refresh(namespace, &keys).await?,
        "unset" => store.unset(namespace, &keys).await?,
        other => {
            return Err(GatewayError::BadRequest(format!(
                "unsupported cache operation: {}",
                other
            )));
        }
    };

    Ok(json!({ operation: result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Fill, MemoryCacheStore};
    use serde_json::json;

    fn admin_args(body: &Value) -> RequestArgs {
        let (parts, ()) = hyper::Request::builder()
            .method("POST")
            .uri("/cache")
            .header("host", "h")
            .body(())
            .unwrap()
            .into_parts();
        RequestArgs::parse(&parts, body.to_string().as_bytes()).unwrap()
    }

    fn warm_store() -> Arc<dyn CacheStore> {
        let store = MemoryCacheStore::default();
        let store: Arc<dyn CacheStore> = Arc::new(store);
        store
    }

    async fn warm(store: &Arc<dyn CacheStore>, namespace: &str, key: &str) {
        let fill: Fill = Box::new(|| Box::pin(async { Ok(json!("cached")) }));
        store.get(namespace, key, fill).await.unwrap();
    }

    #[tokio::test]
    async fn test_unset_echoes_result() {
        let store = warm_store();
        warm(&store, "http://h", "/").await;

        let args = admin_args(&json!({"operation": "unset", "keys": ["/"]}));
        let reply = handle_cache_admin(Some(&store), &args).await.unwrap();
        assert_eq!(reply, json!({"unset": 1}));
    }

    #[tokio::test]
    async fn test_default_operation_is_mark_to_refresh() {
        let store = warm_store();
        warm(&store, "http://h", "/a").await;

        let args = admin_args(&json!({"keys": ["/a"]}));
        let reply = handle_cache_admin(Some(&store), &args).await.unwrap();
        assert_eq!(reply, json!({"markToRefresh": 1}));
    }

    #[tokio::test]
    async fn test_namespace_defaults_to_host() {
        let store = warm_store();
        warm(&store, "http://h", "/a").await;
        warm(&store, "http://other", "/a").await;

        // No namespace in the body: the request host scopes the operation.
        let args = admin_args(&json!({"operation": "unset", "keys": ["/a"]}));
        let reply = handle_cache_admin(Some(&store), &args).await.unwrap();
        assert_eq!(reply, json!({"unset": 1}));

        // The other namespace is untouched.
        let args = admin_args(&json!({
            "operation": "unset",
            "namespace": "http://other",
            "keys": ["/a"]
        }));
        let reply = handle_cache_admin(Some(&store), &args).await.unwrap();
        assert_eq!(reply, json!({"unset": 1}));
    }

    #[tokio::test]
    async fn test_missing_store_is_not_found() {
        let args = admin_args(&json!({"operation": "unset", "keys": []}));
        let err = handle_cache_admin(None, &args).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_bad_request() {
        let store = warm_store();
        let args = admin_args(&json!({"operation": "obliterate"}));
        let err = handle_cache_admin(Some(&store), &args).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_non_object_body_is_bad_request() {
        let store = warm_store();
        let args = admin_args(&json!("just a string"));
        let err = handle_cache_admin(Some(&store), &args).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
