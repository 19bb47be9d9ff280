//! Test utilities for integration tests.
//!
//! This module provides a throwaway upload root, synthetic image encoders
//! and helpers for driving the router.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

use image_derivatives::{
    create_router, DerivativeService, ImageStore, KeyStrategy, RouterConfig, UploadPolicy,
};

/// Boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "----image-derivatives-test-boundary";

// =============================================================================
// Upload Root
// =============================================================================

/// A temporary upload root that lives as long as the value.
pub struct TestUploads {
    dir: TempDir,
}

impl TestUploads {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join(".cache")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write raw bytes, backdated so any cache entry written later is fresh.
    pub fn write_bytes(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        set_mtime(&path, SystemTime::now() - Duration::from_secs(60));
        path
    }

    pub fn write_jpeg(&self, relative: &str, width: u32, height: u32) -> Vec<u8> {
        let data = jpeg_bytes(width, height);
        self.write_bytes(relative, &data);
        data
    }

    pub fn write_png(&self, relative: &str, width: u32, height: u32) -> Vec<u8> {
        let data = png_bytes(width, height);
        self.write_bytes(relative, &data);
        data
    }

    /// Router with auth disabled, tracing off and no upload optimization.
    pub fn router(&self) -> Router {
        self.router_with(
            RouterConfig::without_auth().with_upload_policy(UploadPolicy {
                optimize: None,
                ..UploadPolicy::default()
            }),
            KeyStrategy::Basename,
        )
    }

    pub fn router_with(&self, config: RouterConfig, key_strategy: KeyStrategy) -> Router {
        let store = ImageStore::open(self.root(), None).unwrap();
        let service = DerivativeService::new(store, key_strategy);
        create_router(service, config.with_tracing(false))
    }

    /// Names of cache entries, sorted. In-flight temporary files are skipped.
    pub fn cache_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.cache_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.'))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Wait until the background writer has produced `file_name` in the cache.
    pub async fn wait_for_cache_entry(&self, file_name: &str) -> PathBuf {
        let path = self.cache_dir().join(file_name);
        wait_for_file(&path).await;
        path
    }
}

// =============================================================================
// Images
// =============================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF]
}

pub fn is_png(data: &[u8]) -> bool {
    data.len() >= 8 && data[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
}

pub fn is_webp(data: &[u8]) -> bool {
    data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP"
}

// =============================================================================
// Filesystem
// =============================================================================

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

pub async fn wait_for_file(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !path.exists() {
        assert!(
            Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Requests
// =============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

pub async fn head(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method("HEAD")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

pub async fn get_accepting(router: &Router, uri: &str, accept: &str) -> TestResponse {
    let request = Request::builder()
        .uri(uri)
        .header("accept", accept)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

/// A file part for [`multipart_body`].
pub struct Part<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.field, part.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn post_multipart(router: &Router, uri: &str, parts: &[Part<'_>]) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    send(router, request).await
}
