//! Backend function invocation.
//!
//! The [`Invoker`] trait is the transport seam to the function-invocation
//! service. The HTTP implementation posts an invocation envelope
//! `{FunctionName, Payload, Qualifier}` and returns the parsed `Payload` of
//! the reply, retrying transient failures with exponential backoff.
//!
//! [`CachedInvoker`] sits in front of it and decides, per request, whether
//! the invocation goes through the cache store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use fnrelay_common::{GatewayError, LambdaSpec, RequestArgs, Result};

use crate::cache::{CacheStore, Fill};

/// Version qualifier used when a route does not pin one.
pub const LATEST_QUALIFIER: &str = "$LATEST";

/// Transport to the function-invocation service.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invokes `name` with `payload`, returning the backend's decoded
    /// response value.
    async fn invoke(&self, name: &str, payload: Value, version: Option<&str>) -> Result<Value>;
}

/// Retry policy for transient invocation failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the initial one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on the backoff delay.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

/// HTTP transport to the invocation service.
pub struct HttpInvoker {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpInvoker {
    /// Creates an invoker posting to `endpoint` with the given RPC timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build http client: {}", e)))?;
        Ok(HttpInvoker {
            client,
            endpoint: endpoint.into(),
            timeout,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn try_invoke(&self, name: &str, payload: &Value, version: &str) -> Result<Value> {
        let envelope = json!({
            "FunctionName": name,
            "Payload": payload.to_string(),
            "Qualifier": version,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    GatewayError::Transport(format!("invocation request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "invocation service returned status {}",
                response.status()
            )));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("invalid invocation reply: {}", e)))?;

        let raw = reply
            .get("Payload")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Internal("invocation reply has no Payload".into()))?;
        serde_json::from_str(raw)
            .map_err(|e| GatewayError::Internal(format!("backend payload is not JSON: {}", e)))
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, name: &str, payload: Value, version: Option<&str>) -> Result<Value> {
        let version = version.unwrap_or(LATEST_QUALIFIER);
        let mut backoff_ms = self.retry.initial_backoff_ms;
        let mut last_error = None;

        for attempt in 1..=self.retry.max_attempts {
            match self.try_invoke(name, &payload, version).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        function = %name,
                        attempt,
                        error = %e,
                        backoff_ms,
                        "invocation failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = std::cmp::min(
                        (backoff_ms as f64 * self.retry.backoff_multiplier) as u64,
                        self.retry.max_backoff_ms,
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Internal("all invocation attempts exhausted".into())))
    }
}

/// Builds the payload handed to the backend for one request.
///
/// `params_only` routes receive the merged parameter map alone; everything
/// else receives the full request envelope. Client params always win over
/// route defaults on key collision.
pub fn build_payload(lambda: &LambdaSpec, args: &RequestArgs) -> Value {
    let mut params: Map<String, Value> = lambda.defaults.request_params.clone();
    for (key, value) in &args.params {
        params.insert(key.clone(), value.clone());
    }

    if lambda.params_only {
        return Value::Object(params);
    }

    json!({
        "method": args.method,
        "headers": args.headers,
        "body": args.body,
        "params": params,
        "uri": args.uri,
    })
}

/// Dispatches requests through the cache when the route allows it.
pub struct CachedInvoker {
    invoker: Arc<dyn Invoker>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_prefix: String,
}

impl CachedInvoker {
    pub fn new(
        invoker: Arc<dyn Invoker>,
        cache: Option<Arc<dyn CacheStore>>,
        cache_prefix: impl Into<String>,
    ) -> Self {
        CachedInvoker { invoker, cache, cache_prefix: cache_prefix.into() }
    }

    /// Invokes the route's backend, going through the cache store when the
    /// request is cache-eligible.
    ///
    /// Eligibility requires a configured store, a cache spec on the route,
    /// a true `enabled` evaluation, and a key evaluation that yields a
    /// string. The lookup key is the configured prefix plus the computed
    /// key; the namespace is the request host.
    pub async fn dispatch(&self, lambda: &LambdaSpec, args: &RequestArgs) -> Result<Value> {
        let payload = build_payload(lambda, args);

        if let (Some(store), Some(cache)) = (&self.cache, &lambda.cache) {
            if cache.enabled.eval(args) {
                if let Some(key) = cache.key.eval(args) {
                    let full_key = format!("{}{}", self.cache_prefix, key);
                    let invoker = self.invoker.clone();
                    let name = lambda.name.clone();
                    let version = lambda.version.clone();
                    let fill: Fill = Box::new(move || {
                        Box::pin(async move {
                            invoker.invoke(&name, payload, version.as_deref()).await
                        })
                    });
                    return store.get(&args.host, &full_key, fill).await;
                }
            }
        }

        self.invoker
            .invoke(&lambda.name, payload, lambda.version.as_deref())
            .await
    }
}
