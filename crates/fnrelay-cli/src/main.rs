//! # fnrelay CLI Entry Point
//!
//! Starts the fnrelay gateway from a JSON route table.
//!
//! ## Usage
//!
//! ```bash
//! # Start a gateway with caching disabled
//! fnrelay --lambdas routes.json --log-group my-gateway \
//!     --invoke-endpoint http://functions.internal/invoke
//!
//! # Start with a Redis-backed cache and a key prefix
//! fnrelay --lambdas routes.json --log-group my-gateway \
//!     --invoke-endpoint http://functions.internal/invoke \
//!     --redis-url redis://127.0.0.1:6379 --cache-prefix v2:
//! ```
//!
//! ## Route table format
//!
//! The route table maps URL patterns to backend function specs. Pattern
//! segments are literals or `*`; declaration order breaks ranking ties.
//!
//! ```json
//! {
//!   "/img": {
//!     "name": "thumbnailer",
//!     "paramsOnly": true,
//!     "defaults": {"requestParams": {"width": 200}},
//!     "cache": {"key": "/img"}
//!   },
//!   "/*": {"name": "fallback"}
//! }
//! ```
//!
//! ## Environment
//!
//! `CACHE_TTL`, `CACHE_TTR` (seconds) and `CACHE_TIMEOUT` (milliseconds)
//! tune the cache store; flags take precedence over the environment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use argh::FromArgs;

use fnrelay_common::LambdaSpec;
use fnrelay_gateway::{
    BufferedLogSink, CacheConfig, CacheStore, Gateway, GatewayConfig, HttpInvoker, HttpServer,
    RedisCacheStore, RouteTable,
};

/// fnrelay - HTTP gateway in front of named backend functions
#[derive(FromArgs)]
struct Cli {
    /// path to the JSON route table mapping URL patterns to lambdas
    #[argh(option, short = 'l', long = "lambdas")]
    lambdas: Option<String>,

    /// log group name identifying this gateway's diagnostic stream
    #[argh(option, long = "log-group")]
    log_group: Option<String>,

    /// URL of the function-invocation service
    #[argh(option, long = "invoke-endpoint")]
    invoke_endpoint: String,

    /// redis URL for the cache store; caching is disabled when absent
    #[argh(option, long = "redis-url")]
    redis_url: Option<String>,

    /// address to bind the gateway's HTTP server to
    ///
    /// Defaults to "0.0.0.0:8080".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// prefix prepended to every computed cache key
    #[argh(option, long = "cache-prefix", default = "String::new()")]
    cache_prefix: String,

    /// cache entry lifetime in seconds
    ///
    /// Falls back to the CACHE_TTL environment variable, then to 30 days.
    #[argh(option, long = "cache-ttl")]
    cache_ttl_secs: Option<u64>,

    /// cache staleness horizon in seconds
    ///
    /// Falls back to the CACHE_TTR environment variable, then to 7200.
    #[argh(option, long = "cache-ttr")]
    cache_ttr_secs: Option<u64>,

    /// budget per cache store round trip in milliseconds
    ///
    /// Falls back to the CACHE_TIMEOUT environment variable, then to 1000.
    #[argh(option, long = "cache-timeout")]
    cache_timeout_ms: Option<u64>,

    /// invocation RPC timeout in milliseconds
    #[argh(option, long = "invoke-timeout", default = "30000")]
    invoke_timeout_ms: u64,

    /// debounce interval for log sink flushes, in milliseconds
    #[argh(option, long = "log-debounce", default = "5000")]
    log_debounce_ms: u64,

    /// suppress error causes in client-facing error bodies
    #[argh(switch, long = "production")]
    production: bool,
}

/// Reads a numeric environment variable, ignoring unparsable values with a
/// warning so a typo cannot silently change cache behavior.
fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Loads and compiles the route table, preserving declaration order.
fn load_routes(path: &str) -> Result<RouteTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read route table {}", path))?;
    let table: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw).context("route table must be a JSON object")?;

    let mut routes = Vec::with_capacity(table.len());
    for (pattern, spec) in table {
        let lambda: LambdaSpec = serde_json::from_value(spec)
            .with_context(|| format!("invalid lambda spec for route {:?}", pattern))?;
        routes.push((pattern, lambda));
    }

    RouteTable::from_routes(routes).context("invalid route table")
}

fn cache_config(cli: &Cli) -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        ttl: cli
            .cache_ttl_secs
            .or_else(|| env_u64("CACHE_TTL"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl),
        ttr: cli
            .cache_ttr_secs
            .or_else(|| env_u64("CACHE_TTR"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttr),
        timeout: cli
            .cache_timeout_ms
            .or_else(|| env_u64("CACHE_TIMEOUT"))
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let Some(lambdas) = &cli.lambdas else {
        bail!("no lambdas provided");
    };
    let Some(log_group) = &cli.log_group else {
        bail!("no logGroup provided");
    };

    let routes = load_routes(lambdas)?;
    tracing::info!(route_table = %lambdas, "route table loaded");

    let cache: Option<Arc<dyn CacheStore>> = match &cli.redis_url {
        Some(url) => {
            let store = RedisCacheStore::connect(url, cache_config(&cli))?;
            tracing::info!("cache store enabled");
            Some(Arc::new(store))
        }
        None => {
            tracing::info!("no redis URL configured, caching disabled");
            None
        }
    };

    let invoker = Arc::new(HttpInvoker::new(
        cli.invoke_endpoint.clone(),
        Duration::from_millis(cli.invoke_timeout_ms),
    )?);
    let log = Arc::new(BufferedLogSink::spawn(
        log_group.clone(),
        Duration::from_millis(cli.log_debounce_ms),
    ));

    let gateway = Arc::new(Gateway::new(
        routes,
        invoker,
        cache,
        log,
        GatewayConfig {
            cache_prefix: cli.cache_prefix.clone(),
            production: cli.production,
        },
    ));

    let addr: SocketAddr = cli.bind.parse().context("invalid bind address")?;
    HttpServer::new(gateway).run(addr).await?;
    Ok(())
}
