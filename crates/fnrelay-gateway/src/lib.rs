//! fnrelay Gateway
//!
//! This crate provides the request pipeline of the fnrelay gateway: an HTTP
//! front end that resolves incoming URIs against a wildcard-capable route
//! table and dispatches them to named backend functions through a
//! function-invocation service.
//!
//! # Architecture
//!
//! Per request, the pipeline runs these stages in order, each one fallible
//! and short-circuiting to the error writer:
//!
//! 1. **Parse**: normalize the request into canonical args
//! 2. **Route**: longest-prefix trie lookup with `*` wildcards
//! 3. **Authenticate**: JWT verification and role gating, when configured
//! 4. **Dispatch**: invoke the backend, optionally through the cache store
//! 5. **Shape**: normalize the backend payload into a response envelope
//! 6. **Respond**: apply default headers and write exactly once
//!
//! `POST /cache` bypasses routing and drives the cache store imperatively
//! (`markToRefresh` / `unset`).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fnrelay_common::{CacheKey, CacheSpec, LambdaSpec};
//! use fnrelay_gateway::{
//!     Gateway, GatewayConfig, BufferedLogSink, HttpInvoker, HttpServer, RouteTable,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> fnrelay_common::Result<()> {
//! let routes = RouteTable::from_routes(vec![(
//!     "/".to_string(),
//!     LambdaSpec::new("homepage").with_cache(CacheSpec::new(CacheKey::pathname())),
//! )])?;
//!
//! let invoker = Arc::new(HttpInvoker::new(
//!     "http://functions.internal/invoke",
//!     Duration::from_secs(30),
//! )?);
//! let log = Arc::new(BufferedLogSink::spawn("gateway-logs", Duration::from_secs(5)));
//!
//! let gateway = Arc::new(Gateway::new(
//!     routes,
//!     invoker,
//!     None,
//!     log,
//!     GatewayConfig::default(),
//! ));
//! HttpServer::new(gateway).run("0.0.0.0:8080".parse().unwrap()).await
//! # }
//! ```

pub mod admin;
pub mod auth;
pub mod cache;
pub mod http_server;
pub mod invoke;
pub mod log_sink;
pub mod pipeline;
pub mod respond;
pub mod router;

pub use admin::handle_cache_admin;
pub use auth::authenticate;
pub use cache::{CacheConfig, CacheStore, Fill, MemoryCacheStore, RedisCacheStore};
pub use http_server::HttpServer;
pub use invoke::{build_payload, CachedInvoker, HttpInvoker, Invoker, RetryConfig};
pub use log_sink::{BufferedLogSink, LogLevel, LogSink, NullLogSink};
pub use pipeline::{Gateway, GatewayConfig};
pub use respond::{GatewayResponse, Responder};
pub use router::RouteTable;
