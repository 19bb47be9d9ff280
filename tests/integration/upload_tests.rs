//! Admin upload tests.
//!
//! Tests verify:
//! - Single and multiple uploads are stored and served
//! - Type, size and count limits
//! - In-place optimization after upload

use axum::http::StatusCode;

use image_derivatives::{KeyStrategy, OptimizeOptions, RouterConfig, UploadPolicy};

use super::test_utils::{
    dimensions, get, is_jpeg, jpeg_bytes, png_bytes, post_multipart, wait_for_file, Part,
    TestUploads,
};

fn stored_files(uploads: &TestUploads) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(uploads.root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn limited_router(uploads: &TestUploads, policy: UploadPolicy) -> axum::Router {
    uploads.router_with(
        RouterConfig::without_auth().with_upload_policy(policy),
        KeyStrategy::Basename,
    )
}

// =============================================================================
// Single Upload
// =============================================================================

#[tokio::test]
async fn test_upload_single_image() {
    let uploads = TestUploads::new();
    let router = uploads.router();
    let data = png_bytes(64, 48);

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[Part {
            field: "image",
            filename: "Summer Shirt.PNG",
            content_type: "image/png",
            data: &data,
        }],
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    let filename = json["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("product-"));
    assert!(filename.ends_with(".png"));
    assert_eq!(json["url"], format!("/uploads/{}", filename));

    assert_eq!(std::fs::read(uploads.path(&filename)).unwrap(), data);

    // The stored file is served and can be derived from
    let original = get(&router, &format!("/uploads/{}", filename)).await;
    assert_eq!(original.status, StatusCode::OK);
    assert_eq!(original.body.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_upload_ignores_other_fields() {
    let uploads = TestUploads::new();
    let router = uploads.router();
    let data = jpeg_bytes(32, 32);

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[
            Part {
                field: "caption",
                filename: "caption.txt",
                content_type: "text/plain",
                data: b"a shirt",
            },
            Part {
                field: "image",
                filename: "shirt.jpg",
                content_type: "image/jpeg",
                data: &data,
            },
        ],
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(stored_files(&uploads).len(), 1);
}

#[tokio::test]
async fn test_upload_missing_field() {
    let uploads = TestUploads::new();
    let router = uploads.router();

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[Part {
            field: "file",
            filename: "shirt.jpg",
            content_type: "image/jpeg",
            data: &jpeg_bytes(16, 16),
        }],
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "missing_file");
    assert!(stored_files(&uploads).is_empty());
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let uploads = TestUploads::new();
    let router = uploads.router();

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[Part {
            field: "image",
            filename: "vector.svg",
            content_type: "image/svg+xml",
            data: b"<svg/>",
        }],
    )
    .await;

    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.json()["error"], "unsupported_type");
    assert!(stored_files(&uploads).is_empty());
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let uploads = TestUploads::new();
    let router = limited_router(
        &uploads,
        UploadPolicy {
            max_file_size: 100,
            optimize: None,
            ..UploadPolicy::default()
        },
    );

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[Part {
            field: "image",
            filename: "big.jpg",
            content_type: "image/jpeg",
            data: &vec![0u8; 1000],
        }],
    )
    .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["error"], "file_too_large");
    assert!(stored_files(&uploads).is_empty());
}

// =============================================================================
// Multiple Upload
// =============================================================================

#[tokio::test]
async fn test_upload_multiple_images() {
    let uploads = TestUploads::new();
    let router = uploads.router();
    let a = jpeg_bytes(40, 40);
    let b = png_bytes(20, 20);

    let response = post_multipart(
        &router,
        "/api/admin/upload-multiple",
        &[
            Part {
                field: "images",
                filename: "front.jpg",
                content_type: "image/jpeg",
                data: &a,
            },
            Part {
                field: "images",
                filename: "back.png",
                content_type: "image/png",
                data: &b,
            },
        ],
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["count"], 2);
    let urls = json["urls"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].as_str().unwrap().ends_with(".jpg"));
    assert!(urls[1].as_str().unwrap().ends_with(".png"));
    assert_eq!(stored_files(&uploads).len(), 2);
}

#[tokio::test]
async fn test_upload_multiple_rejects_too_many() {
    let uploads = TestUploads::new();
    let router = limited_router(
        &uploads,
        UploadPolicy {
            max_files: 2,
            optimize: None,
            ..UploadPolicy::default()
        },
    );
    let data = jpeg_bytes(16, 16);
    let part = || Part {
        field: "images",
        filename: "shirt.jpg",
        content_type: "image/jpeg",
        data: &data,
    };

    let response = post_multipart(
        &router,
        "/api/admin/upload-multiple",
        &[part(), part(), part()],
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "too_many_files");
    assert!(stored_files(&uploads).is_empty());
}

#[tokio::test]
async fn test_upload_multiple_is_all_or_nothing() {
    let uploads = TestUploads::new();
    let router = uploads.router();
    let data = jpeg_bytes(16, 16);

    let response = post_multipart(
        &router,
        "/api/admin/upload-multiple",
        &[
            Part {
                field: "images",
                filename: "ok.jpg",
                content_type: "image/jpeg",
                data: &data,
            },
            Part {
                field: "images",
                filename: "notes.pdf",
                content_type: "application/pdf",
                data: b"%PDF-1.4",
            },
        ],
    )
    .await;

    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(stored_files(&uploads).is_empty());
}

#[tokio::test]
async fn test_upload_multiple_requires_files() {
    let uploads = TestUploads::new();
    let router = uploads.router();

    // The single-upload field name does not count
    let response = post_multipart(
        &router,
        "/api/admin/upload-multiple",
        &[Part {
            field: "image",
            filename: "shirt.jpg",
            content_type: "image/jpeg",
            data: &jpeg_bytes(16, 16),
        }],
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "missing_file");
}

// =============================================================================
// Optimization
// =============================================================================

#[tokio::test]
async fn test_upload_is_optimized_in_place() {
    let uploads = TestUploads::new();
    let router = limited_router(
        &uploads,
        UploadPolicy {
            optimize: Some(OptimizeOptions {
                max_width: 200,
                quality: 85,
            }),
            ..UploadPolicy::default()
        },
    );

    let response = post_multipart(
        &router,
        "/api/admin/upload",
        &[Part {
            field: "image",
            filename: "wide.jpg",
            content_type: "image/jpeg",
            data: &jpeg_bytes(800, 400),
        }],
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let filename = response.json()["filename"].as_str().unwrap().to_string();
    let stem = filename.trim_end_matches(".jpg");

    // The WebP sibling is written after the original has been replaced
    wait_for_file(&uploads.path(&format!("{}.webp", stem))).await;

    let optimized = std::fs::read(uploads.path(&filename)).unwrap();
    assert!(is_jpeg(&optimized));
    assert_eq!(dimensions(&optimized), (200, 100));
}
