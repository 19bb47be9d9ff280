//! Background cache population.
//!
//! Writes are detached from the request: the response is sent as soon as the
//! derivative is encoded. Bytes go to a uniquely named temporary file first
//! and are renamed into place, so a concurrent reader sees either the old
//! entry or the complete new one.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Best-effort writer for cache entries.
#[derive(Debug, Clone, Default)]
pub struct CacheWriter {}

impl CacheWriter {
    /// Create a new cache writer.
    pub fn new() -> Self {
        Self {}
    }

    /// Persist `data` at `path` on a detached task.
    ///
    /// Failures are logged and dropped. The returned handle may be ignored.
    pub fn spawn_write(&self, path: PathBuf, data: Bytes) -> JoinHandle<()> {
        tokio::spawn(async move {
            match write_atomic(&path, &data).await {
                Ok(()) => debug!(cache_path = %path.display(), bytes = data.len(), "Cache entry written"),
                Err(e) => warn!(cache_path = %path.display(), "Failed to write cache entry: {}", e),
            }
        })
    }
}

/// Write `data` to a temporary sibling of `path`, then rename it over `path`.
pub async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = temp_sibling(path);

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}
