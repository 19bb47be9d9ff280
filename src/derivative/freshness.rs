//! Staleness check between a source image and its cached derivative.
//!
//! A cache entry is servable only if its modification time is strictly later
//! than the source's. Equal timestamps count as stale.

use std::path::Path;
use std::time::SystemTime;

use crate::error::StoreError;

/// Why a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No cache entry exists
    Absent,

    /// The entry is not newer than the source
    Stale,
}

/// Result of comparing a derivative against its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Hit,
    Miss(MissReason),
}

/// Compare the cache entry at `cached` against the source at `source`.
///
/// Returns `StoreError::NotFound` if the source is missing or is not a
/// regular file.
pub async fn check_freshness(source: &Path, cached: &Path) -> Result<Freshness, StoreError> {
    let source_meta = match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(StoreError::NotFound(source.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(source.display().to_string()))
        }
        Err(e) => return Err(StoreError::io(source, e)),
    };

    let cached_meta = match tokio::fs::metadata(cached).await {
        Ok(meta) if meta.is_file() => meta,
        _ => return Ok(Freshness::Miss(MissReason::Absent)),
    };

    let source_mtime = source_meta
        .modified()
        .map_err(|e| StoreError::io(source, e))?;

    // Without a cache mtime we cannot prove freshness
    let cached_mtime = cached_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    Ok(compare(source_mtime, cached_mtime))
}

/// Pure form of the staleness rule.
#[inline]
pub fn compare(source_mtime: SystemTime, cached_mtime: SystemTime) -> Freshness {
    if cached_mtime > source_mtime {
        Freshness::Hit
    } else {
        Freshness::Miss(MissReason::Stale)
    }
}
