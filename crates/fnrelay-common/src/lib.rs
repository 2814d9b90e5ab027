//! fnrelay Protocol Types
//!
//! This crate provides the request/response model shared by the fnrelay
//! gateway components: scalar coercion for query parameters, the canonical
//! [`RequestArgs`] form of an incoming request, per-route [`LambdaSpec`]
//! configuration, backend response shaping, and the error taxonomy.
//!
//! Nothing in this crate performs I/O; the gateway crate composes these
//! types into the actual request pipeline.
//!
//! # Example
//!
//! ```
//! use fnrelay_common::{CacheKey, CacheSpec, LambdaSpec};
//!
//! let spec = LambdaSpec::new("thumbnailer")
//!     .with_version("7")
//!     .with_cache(CacheSpec::new(CacheKey::pathname()));
//! assert_eq!(spec.name, "thumbnailer");
//! ```

pub mod envelope;
pub mod error;
pub mod lambda;
pub mod request;
pub mod scalar;

pub use envelope::{shape_response, ResponseEnvelope};
pub use error::{GatewayError, Result};
pub use lambda::{
    AuthOptions, AuthSetting, AuthSpec, CacheKey, CacheSpec, Dynamic, LambdaDefaults, LambdaSpec,
    SecretSource, TokenResolver,
};
pub use request::{normalize_uri, RequestArgs, UrlParts};
pub use scalar::{parse_query, parse_scalar};
