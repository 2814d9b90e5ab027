//! Per-request orchestration.
//!
//! One [`Gateway`] instance serves every request; requests are independent
//! flows sharing only the immutable route table, the cache store, and the
//! log sink. Control flow per request:
//!
//! 1. OPTIONS and `/favicon.ico` short-circuit to an empty 200
//! 2. the request is parsed into canonical args
//! 3. `POST /cache` goes to the cache-admin handler
//! 4. everything else resolves a route (404 when none matches), then runs
//!    authentication, cache-mediated invocation, and response shaping
//!
//! The first error at any stage short-circuits to the error writer; every
//! branch produces exactly one response.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Method, Request};

use fnrelay_common::{shape_response, GatewayError, RequestArgs, ResponseEnvelope, Result};

use crate::admin::handle_cache_admin;
use crate::auth::authenticate;
use crate::cache::CacheStore;
use crate::invoke::{CachedInvoker, Invoker};
use crate::log_sink::LogSink;
use crate::respond::{GatewayResponse, Responder};
use crate::router::RouteTable;

/// Maximum request body size (10 MB).
///
/// Bodies beyond this are rejected before JSON parsing to bound per-request
/// memory.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Gateway-level settings that are not per-route.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Prefix prepended to every computed cache key.
    pub cache_prefix: String,
    /// Suppresses error causes in client-facing bodies.
    pub production: bool,
}

/// The assembled request pipeline.
pub struct Gateway {
    routes: RouteTable,
    cache: Option<Arc<dyn CacheStore>>,
    dispatcher: CachedInvoker,
    responder: Responder,
}

impl Gateway {
    /// Assembles the pipeline.
    ///
    /// # Arguments
    /// * `routes` - Compiled route table
    /// * `invoker` - Transport to the function-invocation service
    /// * `cache` - Cache store; `None` disables caching entirely
    /// * `log` - Sink receiving every error event
    /// * `config` - Gateway-level settings
    pub fn new(
        routes: RouteTable,
        invoker: Arc<dyn Invoker>,
        cache: Option<Arc<dyn CacheStore>>,
        log: Arc<dyn LogSink>,
        config: GatewayConfig,
    ) -> Self {
        let dispatcher = CachedInvoker::new(invoker, cache.clone(), config.cache_prefix.clone());
        let responder = Responder::new(log, config.production);
        Gateway { routes, cache, dispatcher, responder }
    }

    /// Serves one request. Infallible: every error becomes an error
    /// response, so the server loop never needs its own error branch.
    pub async fn handle<B>(&self, req: Request<B>) -> GatewayResponse
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if method == Method::OPTIONS || path == "/favicon.ico" {
            return self.responder.write_empty();
        }
        if method == Method::GET && path == "/__health" {
            return self.responder.write_json(&serde_json::json!("OK"));
        }

        let args = match self.parse(req).await {
            Ok(args) => args,
            Err(err) => return self.responder.write_error(&err),
        };

        let cache_request = args.method == "POST" && args.url.pathname == "/cache";
        if cache_request {
            return match handle_cache_admin(self.cache.as_ref(), &args).await {
                Ok(reply) => self.responder.write_json(&reply),
                Err(err) => self.responder.write_error(&err),
            };
        }

        let Some(lambda) = self.routes.resolve(&args.uri) else {
            return self.responder.write_error(&GatewayError::NotFound);
        };

        self.responder.responds(self.run(&lambda, args).await)
    }

    /// Auth, dispatch, and shaping for a routed request.
    async fn run(
        &self,
        lambda: &fnrelay_common::LambdaSpec,
        mut args: RequestArgs,
    ) -> Result<ResponseEnvelope> {
        authenticate(lambda, &mut args)?;
        let response = self.dispatcher.dispatch(lambda, &args).await?;
        shape_response(response, &lambda.defaults)
    }

    /// Collects the body (POST/PUT only) and canonicalizes the request.
    async fn parse<B>(&self, req: Request<B>) -> Result<RequestArgs>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let bytes = if parts.method == Method::POST || parts.method == Method::PUT {
            let collected = body.collect().await.map_err(|e| {
                GatewayError::Internal(format!("failed to read request body: {}", e))
            })?;
            let bytes = collected.to_bytes();
            if bytes.len() > MAX_BODY_SIZE {
                return Err(GatewayError::PayloadTooLarge(bytes.len(), MAX_BODY_SIZE));
            }
            bytes
        } else {
            hyper::body::Bytes::new()
        };

        RequestArgs::parse(&parts, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::log_sink::NullLogSink;
    use async_trait::async_trait;
    use fnrelay_common::LambdaSpec;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use serde_json::{json, Value};

    struct StaticInvoker(Value);

    #[async_trait]
    impl Invoker for StaticInvoker {
        async fn invoke(&self, _: &str, _: Value, _: Option<&str>) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn gateway(routes: Vec<(&str, LambdaSpec)>, response: Value) -> Gateway {
        let table = RouteTable::from_routes(
            routes.into_iter().map(|(p, l)| (p.to_string(), l)).collect(),
        )
        .unwrap();
        Gateway::new(
            table,
            Arc::new(StaticInvoker(response)),
            Some(Arc::new(MemoryCacheStore::default())),
            Arc::new(NullLogSink),
            GatewayConfig::default(),
        )
    }

    fn request(method: &str, target: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(target)
            .header("host", "h")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(res: GatewayResponse) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_options_fast_path() {
        let gw = gateway(vec![("/", LambdaSpec::new("fn"))], json!("r"));
        let res = gw.handle(request("OPTIONS", "/anything", "")).await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_favicon_fast_path() {
        let gw = gateway(vec![], json!("r"));
        let res = gw.handle(request("GET", "/favicon.ico", "")).await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_health_probe() {
        let gw = gateway(vec![], json!("r"));
        let res = gw.handle(request("GET", "/__health", "")).await;
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_unrouted_request_is_404() {
        let gw = gateway(vec![("/known", LambdaSpec::new("fn"))], json!("r"));
        let res = gw.handle(request("GET", "/unknown", "")).await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_routed_request_reaches_backend() {
        let gw = gateway(vec![("/", LambdaSpec::new("fn"))], json!("result"));
        let res = gw.handle(request("GET", "/?a=1", "")).await;
        assert_eq!(res.status(), 200);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from("result"));
    }

    #[tokio::test]
    async fn test_invalid_post_body_is_400() {
        let gw = gateway(vec![("/", LambdaSpec::new("fn"))], json!("r"));
        let res = gw.handle(request("POST", "/", "{broken")).await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn test_cache_admin_roundtrip() {
        let gw = gateway(vec![], json!("r"));
        let res = gw
            .handle(request("POST", "/cache", r#"{"operation":"unset","keys":["/"]}"#))
            .await;
        assert_eq!(res.status(), 200);
        assert_eq!(body_json(res).await, json!({"unset": 0}));
    }

    #[tokio::test]
    async fn test_cache_admin_without_store_is_404() {
        let table = RouteTable::from_routes(vec![]).unwrap();
        let gw = Gateway::new(
            table,
            Arc::new(StaticInvoker(json!("r"))),
            None,
            Arc::new(NullLogSink),
            GatewayConfig::default(),
        );
        let res = gw.handle(request("POST", "/cache", "{}")).await;
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let gw = gateway(vec![("/", LambdaSpec::new("fn"))], json!("r"));
        let huge = "x".repeat(MAX_BODY_SIZE + 1);
        let res = gw.handle(request("POST", "/", &huge)).await;
        assert_eq!(res.status(), 413);
    }

    #[tokio::test]
    async fn test_backend_error_propagates_status() {
        let gw = gateway(
            vec![("/", LambdaSpec::new("fn"))],
            json!({"statusCode": 401, "body": "Forbidden Error"}),
        );
        let res = gw.handle(request("GET", "/", "")).await;
        assert_eq!(res.status(), 401);
        assert_eq!(body_json(res).await["message"], json!("Forbidden Error"));
    }
}
