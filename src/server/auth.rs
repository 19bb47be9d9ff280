//! Signed URL authentication for admin endpoints.
//!
//! # Signing Scheme
//!
//! Each signature covers the HTTP method, the path and the query parameters
//! other than `sig`:
//!
//! ```text
//! signature = HMAC-SHA256(secret_key, "{METHOD} {path}?{canonical_query}")
//! ```
//!
//! The canonical query is sorted by key then value and always contains `exp`
//! (Unix seconds). A URL signed for `GET` cannot be replayed as `DELETE`.
//!
//! ```text
//! DELETE /api/admin/image-cache?exp=1735689600&sig=4f1c...
//! ```
//!
//! Signatures are compared in constant time.
//!
//! # Example
//!
//! ```rust
//! use image_derivatives::server::auth::SignedUrlAuth;
//! use std::time::Duration;
//!
//! let auth = SignedUrlAuth::new("admin-secret");
//! let path = "/api/admin/image-cache/stats";
//! let (signature, expiry) = auth.sign("GET", path, Duration::from_secs(300));
//!
//! assert!(auth.verify("GET", path, &signature, expiry, &[]).is_ok());
//! assert!(auth.verify("DELETE", path, &signature, expiry, &[]).is_err());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Errors
// =============================================================================

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `sig` parameter
    MissingSignature,

    /// No `exp` parameter
    MissingExpiry,

    /// `exp` is in the past
    Expired { expired_at: u64, current_time: u64 },

    /// Signature does not match
    InvalidSignature,

    /// `sig` is not hex, or appears more than once
    InvalidSignatureFormat,

    /// `exp` is not an integer, or appears more than once
    InvalidExpiryFormat,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSignature => write!(f, "Missing signature parameter"),
            AuthError::MissingExpiry => write!(f, "Missing expiry parameter"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Signature expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid signature"),
            AuthError::InvalidSignatureFormat => write!(f, "Invalid signature format"),
            AuthError::InvalidExpiryFormat => write!(f, "Invalid expiry format"),
        }
    }
}

impl AuthError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingSignature => (StatusCode::UNAUTHORIZED, "missing_signature"),
            AuthError::MissingExpiry => (StatusCode::UNAUTHORIZED, "missing_expiry"),
            AuthError::Expired { .. } => (StatusCode::UNAUTHORIZED, "signature_expired"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::InvalidSignatureFormat => {
                (StatusCode::BAD_REQUEST, "invalid_signature_format")
            }
            AuthError::InvalidExpiryFormat => (StatusCode::BAD_REQUEST, "invalid_expiry_format"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = self.to_string();

        // A wrong signature on an admin route is worth noticing
        if matches!(self, AuthError::InvalidSignature) {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Admin authentication failed: {}",
                message
            );
        } else {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Admin authentication failed: {}",
                message
            );
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Signed URL Authentication
// =============================================================================

/// HMAC-SHA256 signer and verifier for admin URLs.
#[derive(Clone)]
pub struct SignedUrlAuth {
    secret_key: Vec<u8>,
}

impl SignedUrlAuth {
    /// Create an authenticator with the given secret.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Sign `method` + `path`, valid for `ttl`.
    ///
    /// Returns the hex signature and the expiry timestamp.
    pub fn sign(&self, method: &str, path: &str, ttl: Duration) -> (String, u64) {
        self.sign_with_params(method, path, ttl, &[])
    }

    /// Sign with extra query parameters (excluding `exp` and `sig`).
    pub fn sign_with_params(
        &self,
        method: &str,
        path: &str,
        ttl: Duration,
        params: &[(&str, &str)],
    ) -> (String, u64) {
        let expiry = unix_now() + ttl.as_secs();
        (self.sign_with_expiry(method, path, expiry, params), expiry)
    }

    /// Sign with an explicit expiry timestamp.
    pub fn sign_with_expiry(
        &self,
        method: &str,
        path: &str,
        expiry: u64,
        params: &[(&str, &str)],
    ) -> String {
        let message = signature_base(method, path, expiry, params);

        let mut mac = HmacSha256::new_from_slice(&self.secret_key)
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a signature.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        signature: &str,
        expiry: u64,
        params: &[(&str, &str)],
    ) -> Result<(), AuthError> {
        let current_time = unix_now();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided = hex::decode(signature).map_err(|_| AuthError::InvalidSignatureFormat)?;
        let expected = hex::decode(self.sign_with_expiry(method, path, expiry, params))
            .map_err(|_| AuthError::InvalidSignatureFormat)?;

        if provided.ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }
}

/// Query string carrying `params`, the expiry and the signature.
///
/// Append it to the signed path with `?`.
pub fn signed_query(params: &[(&str, &str)], expiry: u64, signature: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("exp", &expiry.to_string());
    serializer.append_pair("sig", signature);
    serializer.finish()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn signature_base(method: &str, path: &str, expiry: u64, params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    pairs.push(("exp".to_string(), expiry.to_string()));
    pairs.sort();

    let canonical = pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{} {}?{}", method.to_ascii_uppercase(), path, canonical)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Reject admin requests without a valid signature.
///
/// Reads `sig` and `exp` from the original query string and verifies them
/// against the request method, the full (un-nested) path and the remaining
/// query parameters.
pub async fn auth_middleware(
    State(auth): State<SignedUrlAuth>,
    OriginalUri(original_uri): OriginalUri,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let query = original_uri.query().unwrap_or("");
    let mut signature: Option<String> = None;
    let mut expiry: Option<u64> = None;
    let mut extra_params: Vec<(String, String)> = Vec::new();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "sig" => {
                if signature.replace(value.into_owned()).is_some() {
                    return Err(AuthError::InvalidSignatureFormat);
                }
            }
            "exp" => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| AuthError::InvalidExpiryFormat)?;
                if expiry.replace(parsed).is_some() {
                    return Err(AuthError::InvalidExpiryFormat);
                }
            }
            _ => extra_params.push((key.into_owned(), value.into_owned())),
        }
    }

    let signature = signature.ok_or(AuthError::MissingSignature)?;
    let expiry = expiry.ok_or(AuthError::MissingExpiry)?;

    let params: Vec<(&str, &str)> = extra_params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    auth.verify(
        request.method().as_str(),
        original_uri.path(),
        &signature,
        expiry,
        &params,
    )?;

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
