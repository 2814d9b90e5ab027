//! JWT authentication and role authorization.
//!
//! Runs between route resolution and dispatch. Routes without an `auth`
//! spec pass through untouched; everything else must present a verifiable
//! token, and verified claims are attached to the request under
//! `params.auth` so backends can act on them.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use fnrelay_common::{
    AuthOptions, AuthSetting, AuthSpec, GatewayError, LambdaSpec, RequestArgs, Result,
};

/// Applies the route's auth contract to the request.
///
/// On success the request gains `params.auth`, an object holding the token's
/// `role` claim plus every whitelisted claim. Failures are 403s with the
/// verifier's message, except a malformed auth *configuration*, which is a
/// 500-class error.
pub fn authenticate(lambda: &LambdaSpec, args: &mut RequestArgs) -> Result<()> {
    let spec = match &lambda.auth {
        None | Some(AuthSetting::Flag(false)) => return Ok(()),
        Some(AuthSetting::Flag(true)) => {
            return Err(GatewayError::Internal("auth should be an object".into()));
        }
        Some(AuthSetting::Spec(spec)) => spec,
    };

    let token = resolve_token(spec, args)
        .ok_or_else(|| GatewayError::Forbidden("jwt must be provided".into()))?;

    // Unverified decode, so a dynamic secret can key off the token payload
    // (e.g. per-tenant secrets chosen by an `iss` claim).
    let unverified = decode_unverified(&token).unwrap_or(Value::Null);
    let secret = spec.secret.resolve(&unverified, &args.params, &args.headers);

    let validation = build_validation(&spec.options)?;
    let verified = jsonwebtoken::decode::<Value>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| GatewayError::Forbidden(verify_error_message(&e)))?;

    let claims = verified.claims;
    let mut auth = Map::new();
    auth.insert(
        "role".to_string(),
        claims.get("role").cloned().unwrap_or(Value::Null),
    );
    for field in &spec.allowed_fields {
        if let Some(value) = claims.get(field) {
            auth.insert(field.clone(), value.clone());
        }
    }

    if let Some(required) = &spec.required_roles {
        let role_ok = auth
            .get("role")
            .and_then(Value::as_str)
            .map(|role| required.iter().any(|r| r == role))
            .unwrap_or(false);
        if !role_ok {
            return Err(GatewayError::Forbidden("Forbidden".into()));
        }
    }

    args.params.insert("auth".to_string(), Value::Object(auth));
    Ok(())
}

/// Token lookup order: the route's resolver, the `authorization` header
/// (raw token, no scheme prefix), then the `token` query parameter.
fn resolve_token(spec: &AuthSpec, args: &RequestArgs) -> Option<String> {
    if let Some(resolver) = &spec.token {
        return resolver(&args.params, &args.headers);
    }
    if let Some(header) = args.headers.get("authorization") {
        return Some(header.clone());
    }
    args.params
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Decodes a token without checking its signature or claims.
fn decode_unverified(token: &str) -> Option<Value> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.algorithms = all_algorithms();

    jsonwebtoken::decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

fn build_validation(options: &AuthOptions) -> Result<Validation> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.leeway = options.leeway_secs;
    validation.validate_exp = !options.ignore_expiration;

    if !options.algorithms.is_empty() {
        let mut algorithms = Vec::with_capacity(options.algorithms.len());
        for name in &options.algorithms {
            let algorithm = name.parse::<Algorithm>().map_err(|_| {
                GatewayError::Internal(format!("unsupported JWT algorithm: {}", name))
            })?;
            algorithms.push(algorithm);
        }
        validation.algorithms = algorithms;
    }

    if options.audience.is_empty() {
        validation.validate_aud = false;
    } else {
        validation.set_audience(&options.audience);
    }
    if !options.issuer.is_empty() {
        validation.set_issuer(&options.issuer);
    }

    Ok(validation)
}

fn all_algorithms() -> Vec<Algorithm> {
    vec![
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::EdDSA,
    ]
}

/// Stable client-facing messages for the common verification failures.
fn verify_error_message(err: &jsonwebtoken::errors::Error) -> String {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidSignature => "invalid signature".into(),
        ErrorKind::ExpiredSignature => "jwt expired".into(),
        ErrorKind::InvalidToken => "jwt malformed".into(),
        ErrorKind::ImmatureSignature => "jwt not active".into(),
        ErrorKind::InvalidAudience => "jwt audience invalid".into(),
        ErrorKind::InvalidIssuer => "jwt issuer invalid".into(),
        ErrorKind::InvalidAlgorithm => "invalid algorithm".into(),
        _ => err.to_string(),
    }
}
