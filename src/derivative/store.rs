//! Upload root and derivative cache directory.
//!
//! Source images live under the upload root. Derivatives live in a cache
//! directory (by default `<upload root>/.cache`) that this crate owns. The
//! filesystem is the only index: cache lookups are direct path construction.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::key::CacheKey;
use crate::error::StoreError;

/// Name of the cache directory created under the upload root.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".cache";

/// Aggregate size of the derivative cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cache entries
    pub file_count: usize,

    /// Total size of all entries in bytes
    pub total_size: u64,

    /// Total size in megabytes, formatted with two decimals
    pub total_size_mb: String,
}

/// Paths for source images and their cached derivatives.
#[derive(Debug, Clone)]
pub struct ImageStore {
    upload_root: PathBuf,
    cache_dir: PathBuf,
}

impl ImageStore {
    /// Open a store, creating the upload root and cache directory if absent.
    ///
    /// `cache_dir` defaults to `<upload_root>/.cache`.
    pub fn open(
        upload_root: impl Into<PathBuf>,
        cache_dir: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        let upload_root = upload_root.into();
        let cache_dir = cache_dir.unwrap_or_else(|| upload_root.join(DEFAULT_CACHE_DIR_NAME));

        for dir in [&upload_root, &cache_dir] {
            if !dir.is_dir() {
                std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
                debug!(dir = %dir.display(), "Created directory");
            }
        }

        Ok(Self {
            upload_root,
            cache_dir,
        })
    }

    /// Directory holding source images.
    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Directory holding cached derivatives.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Map a request path to a file under the upload root.
    ///
    /// The path is percent-decoded and split on `/`. Empty, `.`, `..` and
    /// dot-prefixed segments are rejected, which keeps hidden files and the
    /// cache directory out of reach.
    pub fn resolve_source(&self, request_path: &str) -> Result<PathBuf, StoreError> {
        let relative = normalize_relative(request_path)?;
        Ok(self.upload_root.join(relative))
    }

    /// Map an already decoded relative path to a file under the upload root.
    pub fn source_path(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let relative = validate_relative(relative)?;
        Ok(self.upload_root.join(relative))
    }

    /// Absolute path of the cache entry for `key`.
    pub fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// Count and size the cache entries, ignoring temporary files.
    pub async fn stats(&self) -> Result<CacheStats, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| StoreError::io(&self.cache_dir, e))?;

        let mut file_count = 0;
        let mut total_size = 0u64;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.cache_dir, e))?
        {
            if is_temporary(&entry.file_name()) {
                continue;
            }

            match entry.metadata().await {
                Ok(meta) if meta.is_file() => {
                    file_count += 1;
                    total_size += meta.len();
                }
                Ok(_) => {}
                // Entry removed between listing and stat
                Err(_) => {}
            }
        }

        Ok(CacheStats {
            file_count,
            total_size,
            total_size_mb: format!("{:.2}", total_size as f64 / (1024.0 * 1024.0)),
        })
    }

    /// Delete every cache entry, leaving in-flight temporary files alone.
    ///
    /// Returns the number of entries deleted.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| StoreError::io(&self.cache_dir, e))?;

        let mut deleted = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.cache_dir, e))?
        {
            if is_temporary(&entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(cache_path = %path.display(), "Failed to delete cache entry: {}", e),
            }
        }

        Ok(deleted)
    }
}

/// Cache writes stage into dot-prefixed siblings before renaming.
fn is_temporary(file_name: &std::ffi::OsStr) -> bool {
    file_name.to_string_lossy().starts_with('.')
}

/// Percent-decode and validate a request path into a relative path.
pub fn normalize_relative(request_path: &str) -> Result<String, StoreError> {
    let decoded = urlencoding::decode(request_path)
        .map_err(|_| StoreError::InvalidPath(request_path.to_string()))?;

    validate_relative(&decoded).map(str::to_string)
}

/// Check every segment of a decoded relative path.
fn validate_relative(relative: &str) -> Result<&str, StoreError> {
    let trimmed = relative.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(relative.to_string()));
    }

    for segment in trimmed.split('/') {
        let invalid = segment.is_empty()
            || segment.starts_with('.')
            || segment.contains('\\')
            || segment.contains('\0');
        if invalid {
            return Err(StoreError::InvalidPath(relative.to_string()));
        }
    }

    Ok(trimmed)
}
