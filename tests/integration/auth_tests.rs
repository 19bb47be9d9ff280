//! Authentication integration tests.
//!
//! Tests verify:
//! - Admin routes require a valid signed URL
//! - Signatures are bound to method and path
//! - Expired, tampered and malformed signatures are rejected
//! - Image and health routes stay public

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};

use image_derivatives::{KeyStrategy, RouterConfig, SignedUrlAuth};

use super::test_utils::{get, send, TestUploads};

const TEST_SECRET: &str = "test-secret-key-for-hmac-signing";
const STATS_PATH: &str = "/api/admin/image-cache/stats";
const CACHE_PATH: &str = "/api/admin/image-cache";

fn protected_router(uploads: &TestUploads) -> axum::Router {
    uploads.router_with(RouterConfig::new(TEST_SECRET), KeyStrategy::Basename)
}

fn signed(method: &str, path: &str) -> String {
    let auth = SignedUrlAuth::new(TEST_SECRET);
    let (sig, exp) = auth.sign(method, path, Duration::from_secs(300));
    format!("{}?exp={}&sig={}", path, exp, sig)
}

async fn request(router: &axum::Router, method: &str, uri: &str) -> super::test_utils::TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

// =============================================================================
// Valid Signatures
// =============================================================================

#[tokio::test]
async fn test_valid_signature_succeeds() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let response = get(&router, &signed("GET", STATS_PATH)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["file_count"], 0);
}

#[tokio::test]
async fn test_valid_delete_signature_succeeds() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let response = request(&router, "DELETE", &signed("DELETE", CACHE_PATH)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["success"], true);
}

#[tokio::test]
async fn test_extra_params_are_signed() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);
    let auth = SignedUrlAuth::new(TEST_SECRET);

    let (sig, exp) =
        auth.sign_with_params("GET", STATS_PATH, Duration::from_secs(300), &[("v", "2")]);

    let ok = get(&router, &format!("{}?v=2&exp={}&sig={}", STATS_PATH, exp, sig)).await;
    assert_eq!(ok.status, StatusCode::OK);

    let tampered = get(&router, &format!("{}?v=3&exp={}&sig={}", STATS_PATH, exp, sig)).await;
    assert_eq!(tampered.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_missing_signature_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let response = get(&router, STATS_PATH).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "missing_signature");

    let response = get(&router, &format!("{}?sig=abcd", STATS_PATH)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "missing_expiry");
}

#[tokio::test]
async fn test_signature_for_other_method_rejected() {
    let uploads = TestUploads::new();
    uploads.write_jpeg("shirt.jpg", 200, 200);
    let router = protected_router(&uploads);

    // A read-only signature must not clear the cache
    let response = request(&router, "DELETE", &signed("GET", CACHE_PATH)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "invalid_signature");
}

#[tokio::test]
async fn test_signature_for_other_path_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let auth = SignedUrlAuth::new(TEST_SECRET);
    let (sig, exp) = auth.sign("GET", CACHE_PATH, Duration::from_secs(300));

    let response = get(&router, &format!("{}?exp={}&sig={}", STATS_PATH, exp, sig)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_signature_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let auth = SignedUrlAuth::new(TEST_SECRET);
    let sig = auth.sign_with_expiry("GET", STATS_PATH, now - 60, &[]);

    let response = get(&router, &format!("{}?exp={}&sig={}", STATS_PATH, now - 60, sig)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "signature_expired");
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let auth = SignedUrlAuth::new("some-other-secret");
    let (sig, exp) = auth.sign("GET", STATS_PATH, Duration::from_secs(300));

    let response = get(&router, &format!("{}?exp={}&sig={}", STATS_PATH, exp, sig)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_parameters_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let response = get(&router, &format!("{}?exp=soon&sig=abcd", STATS_PATH)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_expiry_format");

    let response = get(&router, &format!("{}?exp=99999999999&sig=not-hex", STATS_PATH)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_signature_format");
}

#[tokio::test]
async fn test_unsigned_upload_rejected() {
    let uploads = TestUploads::new();
    let router = protected_router(&uploads);

    let response = request(&router, "POST", "/api/admin/upload").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn test_public_routes_need_no_signature() {
    let uploads = TestUploads::new();
    uploads.write_jpeg("shirt.jpg", 400, 400);
    let router = protected_router(&uploads);

    assert_eq!(get(&router, "/health").await.status, StatusCode::OK);
    assert_eq!(
        get(&router, "/uploads/shirt.jpg").await.status,
        StatusCode::OK
    );
    assert_eq!(
        get(&router, "/uploads/shirt.jpg?w=200").await.status,
        StatusCode::OK
    );
}
