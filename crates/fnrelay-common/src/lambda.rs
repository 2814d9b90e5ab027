//! Per-route backend configuration.
//!
//! A [`LambdaSpec`] names the backend function a route dispatches to and
//! carries the optional cache and auth layers in front of it. Several fields
//! are polymorphic: they hold either a literal value or a function of the
//! current request. Configuration files can only express the literal form;
//! the function form is available when the gateway is embedded as a library.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};
use crate::request::RequestArgs;

/// A value that is either fixed at configuration time or computed per
/// request.
#[derive(Clone)]
pub enum Dynamic<T> {
    Static(T),
    Fn(Arc<dyn Fn(&RequestArgs) -> T + Send + Sync>),
}

impl<T: Clone> Dynamic<T> {
    pub fn eval(&self, args: &RequestArgs) -> T {
        match self {
            Dynamic::Static(value) => value.clone(),
            Dynamic::Fn(f) => f(args),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Static(value) => write!(f, "Static({:?})", value),
            Dynamic::Fn(_) => write!(f, "Fn(..)"),
        }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        Dynamic::Static(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Dynamic<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        T::deserialize(deserializer).map(Dynamic::Static)
    }
}

/// The cache key for a request: a fixed string, or a function that may
/// decline by returning `None` (which disables caching for that request).
#[derive(Clone)]
pub enum CacheKey {
    Static(String),
    Fn(Arc<dyn Fn(&RequestArgs) -> Option<String> + Send + Sync>),
}

impl CacheKey {
    pub fn eval(&self, args: &RequestArgs) -> Option<String> {
        match self {
            CacheKey::Static(key) => Some(key.clone()),
            CacheKey::Fn(f) => f(args),
        }
    }

    /// A key derived from the request pathname, the most common dynamic key.
    pub fn pathname() -> CacheKey {
        CacheKey::Fn(Arc::new(|args| Some(args.url.pathname.clone())))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Static(key) => write!(f, "Static({:?})", key),
            CacheKey::Fn(_) => write!(f, "Fn(..)"),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey::Static(key.to_string())
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(CacheKey::Static)
    }
}

/// Cache layer configuration for one route.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    #[serde(default = "enabled_by_default")]
    pub enabled: Dynamic<bool>,
    pub key: CacheKey,
}

fn enabled_by_default() -> Dynamic<bool> {
    Dynamic::Static(true)
}

impl CacheSpec {
    pub fn new(key: impl Into<CacheKey>) -> Self {
        CacheSpec { enabled: Dynamic::Static(true), key: key.into() }
    }

    pub fn with_enabled(mut self, enabled: impl Into<Dynamic<bool>>) -> Self {
        self.enabled = enabled.into();
        self
    }
}

/// The JWT secret: a fixed string, or a function of the unverified token
/// payload, the request params, and the request headers.
#[derive(Clone)]
pub enum SecretSource {
    Static(String),
    Fn(SecretFn),
}

pub type SecretFn =
    Arc<dyn Fn(&Value, &Map<String, Value>, &HashMap<String, String>) -> String + Send + Sync>;

/// A caller-provided token extractor, overriding the default header/param
/// lookup.
pub type TokenResolver =
    Arc<dyn Fn(&Map<String, Value>, &HashMap<String, String>) -> Option<String> + Send + Sync>;

impl SecretSource {
    pub fn resolve(
        &self,
        payload: &Value,
        params: &Map<String, Value>,
        headers: &HashMap<String, String>,
    ) -> String {
        match self {
            SecretSource::Static(secret) => secret.clone(),
            SecretSource::Fn(f) => f(payload, params, headers),
        }
    }
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Static(_) => write!(f, "Static(*****)"),
            SecretSource::Fn(_) => write!(f, "Fn(..)"),
        }
    }
}

impl From<&str> for SecretSource {
    fn from(secret: &str) -> Self {
        SecretSource::Static(secret.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretSource::Static)
    }
}

/// Options forwarded to JWT verification.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthOptions {
    /// Accepted signing algorithms; HS256 when empty.
    pub algorithms: Vec<String>,
    /// Accepted `aud` values; audience is not validated when empty.
    pub audience: Vec<String>,
    /// Accepted `iss` values; issuer is not validated when empty.
    pub issuer: Vec<String>,
    /// Skip `exp` validation.
    pub ignore_expiration: bool,
    /// Clock-skew tolerance in seconds.
    pub leeway_secs: u64,
}

/// Authentication configuration for one route.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Claim names copied into `params.auth` after verification. `role` is
    /// always copied regardless.
    #[serde(default)]
    pub allowed_fields: Vec<String>,
    pub secret: SecretSource,
    #[serde(skip)]
    pub token: Option<TokenResolver>,
    #[serde(default)]
    pub options: AuthOptions,
    pub required_roles: Option<Vec<String>>,
}

impl AuthSpec {
    pub fn new(secret: impl Into<SecretSource>) -> Self {
        AuthSpec {
            allowed_fields: Vec::new(),
            secret: secret.into(),
            token: None,
            options: AuthOptions::default(),
            required_roles: None,
        }
    }

    pub fn with_allowed_fields(mut self, fields: &[&str]) -> Self {
        self.allowed_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_required_roles(mut self, roles: &[&str]) -> Self {
        self.required_roles = Some(roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn with_token_resolver(mut self, resolver: TokenResolver) -> Self {
        self.token = Some(resolver);
        self
    }

    pub fn with_options(mut self, options: AuthOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSpec")
            .field("allowed_fields", &self.allowed_fields)
            .field("secret", &self.secret)
            .field("token", &self.token.as_ref().map(|_| "Fn(..)"))
            .field("options", &self.options)
            .field("required_roles", &self.required_roles)
            .finish()
    }
}

/// The `auth` field as it appears in configuration: absent, a boolean flag,
/// or a structured spec. A bare `true` is a configuration mistake that is
/// surfaced when the route is first hit, not at load time, so one bad route
/// cannot keep the rest of the table from serving.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum AuthSetting {
    Flag(bool),
    Spec(Box<AuthSpec>),
}

/// Default values merged into requests and responses for one route.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LambdaDefaults {
    /// Merged under client-supplied params (client wins).
    pub request_params: Map<String, Value>,
    /// Merged under backend-returned headers (backend wins).
    pub response_headers: HashMap<String, String>,
    /// Base64 flag used when the backend response does not carry one.
    pub response_base64: bool,
}

/// Configuration for one routed backend function. Immutable after load.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaSpec {
    /// Backend function identifier.
    pub name: String,
    /// Version qualifier passed to the invoker; `$LATEST` when absent.
    pub version: Option<String>,
    /// When set, the backend payload is the merged parameter map instead of
    /// the full request envelope.
    #[serde(default)]
    pub params_only: bool,
    #[serde(default)]
    pub defaults: LambdaDefaults,
    pub cache: Option<CacheSpec>,
    pub auth: Option<AuthSetting>,
}

impl LambdaSpec {
    pub fn new(name: impl Into<String>) -> Self {
        LambdaSpec {
            name: name.into(),
            version: None,
            params_only: false,
            defaults: LambdaDefaults::default(),
            cache: None,
            auth: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn params_only(mut self) -> Self {
        self.params_only = true;
        self
    }

    pub fn with_defaults(mut self, defaults: LambdaDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_cache(mut self, cache: CacheSpec) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_auth(mut self, auth: AuthSpec) -> Self {
        self.auth = Some(AuthSetting::Spec(Box::new(auth)));
        self
    }

    /// Startup validation: a route must name a backend function.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GatewayError::Config("lambda name must not be empty".into()));
        }
        Ok(())
    }
}
