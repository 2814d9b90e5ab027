//! Response writing.
//!
//! Every terminal branch of the pipeline goes through this module, which is
//! what guarantees the one-write-per-request invariant: the pipeline returns
//! exactly one [`GatewayResponse`], built here.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use fnrelay_common::{GatewayError, ResponseEnvelope, Result};

use crate::log_sink::{LogLevel, LogSink};

/// Type alias for the gateway's hyper responses.
pub type GatewayResponse = Response<Full<Bytes>>;

/// Headers applied to every response unless the route overrides them.
const DEFAULT_HEADERS: [(&str, &str); 2] = [
    ("content-type", "application/json"),
    ("access-control-allow-origin", "*"),
];

/// Builds HTTP responses and reports error events to the log sink.
pub struct Responder {
    production: bool,
    log: Arc<dyn LogSink>,
}

impl Responder {
    pub fn new(log: Arc<dyn LogSink>, production: bool) -> Self {
        Responder { production, log }
    }

    /// Terminal write for a completed pipeline: success envelope or error.
    pub fn responds(&self, result: Result<ResponseEnvelope>) -> GatewayResponse {
        match result {
            Ok(envelope) => self.write_envelope(envelope),
            Err(err) => self.write_error(&err),
        }
    }

    /// Writes an empty 200 (OPTIONS and favicon fast paths).
    pub fn write_empty(&self) -> GatewayResponse {
        self.build(StatusCode::OK, &HashMap::new(), Bytes::new())
    }

    /// Writes a bare JSON value with default headers (cache admin replies).
    pub fn write_json(&self, value: &Value) -> GatewayResponse {
        self.build(StatusCode::OK, &HashMap::new(), body_bytes(value))
    }

    fn write_envelope(&self, envelope: ResponseEnvelope) -> GatewayResponse {
        let body = if envelope.base64 {
            match envelope.body.as_str().map(|s| BASE64.decode(s)) {
                Some(Ok(bytes)) => Bytes::from(bytes),
                Some(Err(e)) => {
                    return self.write_error(&GatewayError::Internal(format!(
                        "response body is not valid base64: {}",
                        e
                    )));
                }
                // A non-string body ignores the base64 flag.
                None => body_bytes(&envelope.body),
            }
        } else {
            body_bytes(&envelope.body)
        };

        let status =
            StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.build(status, &envelope.headers, body)
    }

    /// Writes the JSON error body and reports the event to the log sink.
    pub fn write_error(&self, err: &GatewayError) -> GatewayResponse {
        let status_code = err.status_code();
        let event = err.to_body(self.production);
        let level = if status_code >= 500 { LogLevel::Error } else { LogLevel::Warn };
        self.log.log(level, event.clone());

        let body = serde_json::to_vec_pretty(&event).unwrap_or_default();
        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.build(status, &HashMap::new(), Bytes::from(body))
    }

    fn build(
        &self,
        status: StatusCode,
        headers: &HashMap<String, String>,
        body: Bytes,
    ) -> GatewayResponse {
        let mut builder = Response::builder().status(status);

        if let Some(map) = builder.headers_mut() {
            for (name, value) in DEFAULT_HEADERS {
                map.insert(
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
            }
            for (name, value) in headers {
                let name = match name.parse::<HeaderName>() {
                    Ok(name) => name,
                    Err(_) => {
                        tracing::warn!(header = %name, "dropping invalid response header name");
                        continue;
                    }
                };
                let value = match HeaderValue::from_str(value) {
                    Ok(value) => value,
                    Err(_) => {
                        tracing::warn!(header = %name, "dropping invalid response header value");
                        continue;
                    }
                };
                map.insert(name, value);
            }
        }

        // Infallible: status and headers are validated above.
        builder.body(Full::new(body)).expect("response construction cannot fail")
    }
}

/// Body serialization: strings are written raw, everything else as JSON.
fn body_bytes(value: &Value) -> Bytes {
    match value {
        Value::String(s) => Bytes::from(s.clone().into_bytes()),
        other => Bytes::from(serde_json::to_vec(other).unwrap_or_default()),
    }
}
