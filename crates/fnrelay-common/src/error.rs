use serde_json::{json, Value};
use thiserror::Error;

/// Error taxonomy for the gateway pipeline.
///
/// Every stage of the request pipeline either yields a value or one of these
/// errors; the first error short-circuits the remaining stages and is written
/// back to the client as a JSON error body. Each variant maps to a fixed HTTP
/// status apart from [`GatewayError::Backend`], which carries whatever status
/// the backend reported.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not Found")]
    NotFound,

    #[error("backend returned status {status}")]
    Backend { status: u16, body: Value },

    #[error("request body of {0} bytes exceeds maximum allowed size of {1} bytes")]
    PayloadTooLarge(usize, usize),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status written for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NotFound => 404,
            GatewayError::Backend { status, .. } => *status,
            GatewayError::PayloadTooLarge(_, _) => 413,
            GatewayError::Config(_)
            | GatewayError::Transport(_)
            | GatewayError::Timeout(_)
            | GatewayError::Json(_)
            | GatewayError::Internal(_) => 500,
        }
    }

    /// Whether a retry may succeed.
    ///
    /// Transport failures and timeouts are transient; everything else is a
    /// permanent failure for the request that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::Timeout(_)
        )
    }

    /// The JSON body written to the client for this error.
    ///
    /// Backend error bodies are kept structured: an object body stays an
    /// object instead of collapsing to its string rendering. Outside
    /// production the `cause` field carries the debug form of the error for
    /// diagnosis; in production it is omitted so internals never leak.
    pub fn to_body(&self, production: bool) -> Value {
        let message = match self {
            GatewayError::Backend { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        };
        let mut body = json!({
            "message": message,
            "statusCode": self.status_code(),
        });
        if !production {
            body["cause"] = Value::String(format!("{:?}", self));
        }
        body
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
