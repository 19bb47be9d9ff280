//! Admin image uploads.
//!
//! Uploaded files are validated against an [`UploadPolicy`], stored flat in
//! the upload root under a generated name, and optionally optimized in place
//! on a background task.

mod optimize;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::derivative::{write_atomic, ImageStore};
use crate::error::{StoreError, UploadError};

pub use optimize::{
    optimize_in_place, spawn_optimize, OptimizeOptions, OptimizeReport,
    DEFAULT_OPTIMIZE_MAX_WIDTH, DEFAULT_OPTIMIZE_QUALITY,
};

/// Default per-file size limit (5 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Default number of files accepted by the multi-upload endpoint.
pub const DEFAULT_MAX_FILES: usize = 10;

/// Content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Limits and behaviour for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Per-file size limit in bytes
    pub max_file_size: usize,

    /// Maximum files per multi-upload request
    pub max_files: usize,

    /// Optimization to run after storing, if any
    pub optimize: Option<OptimizeOptions>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            optimize: Some(OptimizeOptions::default()),
        }
    }
}

impl UploadPolicy {
    /// Check a single file against the policy.
    pub fn check(&self, content_type: &str, size: usize) -> Result<(), UploadError> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if !ALLOWED_CONTENT_TYPES.contains(&mime.as_str()) {
            return Err(UploadError::UnsupportedType(content_type.to_string()));
        }

        if size > self.max_file_size {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Upper bound for a whole multipart request body.
    pub fn body_limit(&self) -> usize {
        // Room for multipart boundaries and headers on top of the file data
        self.max_file_size
            .saturating_mul(self.max_files)
            .saturating_add(64 * 1024)
    }
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Generated file name inside the upload root
    pub filename: String,

    /// Public URL of the file (`/uploads/<filename>`)
    pub url: String,

    /// Absolute path on disk
    pub path: PathBuf,
}

/// Generate a collision-resistant name keeping the original extension.
///
/// The extension falls back to one derived from `content_type` when the
/// original name has none or an unusual one.
pub fn generate_file_name(original_name: &str, content_type: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix = uuid::Uuid::new_v4().simple().to_string();

    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .or_else(|| extension_for(content_type).map(String::from));

    match ext {
        Some(ext) => format!("product-{}-{}.{}", millis, &suffix[..12], ext),
        None => format!("product-{}-{}", millis, &suffix[..12]),
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type.split(';').next().unwrap_or("").trim() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Validate and store one uploaded file under the upload root.
pub async fn save_upload(
    store: &ImageStore,
    policy: &UploadPolicy,
    original_name: &str,
    content_type: &str,
    data: &[u8],
) -> Result<StoredUpload, UploadError> {
    policy.check(content_type, data.len())?;

    let filename = generate_file_name(original_name, content_type);
    let path = store.source_path(&filename)?;

    write_atomic(&path, data)
        .await
        .map_err(|e| UploadError::Store(StoreError::io(&path, e)))?;

    Ok(StoredUpload {
        url: format!("/uploads/{}", filename),
        filename,
        path,
    })
}
