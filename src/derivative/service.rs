//! Derivative service for orchestrating lookups and generation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DerivativeService                          │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                      derive()                           │    │
//! │  │  1. Resolve source    4. Read + transcode (blocking)    │    │
//! │  │  2. Build cache key   5. Spawn cache write              │    │
//! │  │  3. Check freshness   6. Return bytes                   │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌────────────┐      ┌──────────────┐    ┌──────────────────┐ │
//! │    │ ImageStore │      │  Transcoder  │    │   CacheWriter    │ │
//! │    └────────────┘      └──────────────┘    └──────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two concurrent misses for the same key both transcode and both write.
//! The output is identical, so the last rename wins harmlessly.

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::freshness::{check_freshness, Freshness};
use super::key::{CacheKey, KeyStrategy};
use super::request::{DerivativeRequest, OutputFormat};
use super::store::ImageStore;
use super::transcode::Transcoder;
use super::writer::CacheWriter;
use crate::error::StoreError;

// =============================================================================
// Results
// =============================================================================

/// Encoded derivative bytes.
#[derive(Debug, Clone)]
pub struct Derivative {
    /// The encoded image
    pub data: Bytes,

    /// Encoding of `data`
    pub format: OutputFormat,
}

/// Outcome of a derivative lookup.
#[derive(Debug, Clone)]
pub enum Derived {
    /// Served from a fresh cache entry
    Hit(Derivative),

    /// Freshly generated; the cache write is in flight
    Miss(Derivative),

    /// Generation failed; the caller should serve the original
    Fallback,
}

impl Derived {
    /// Value for the `X-Image-Cache` header, if a derivative was produced.
    pub fn cache_status(&self) -> Option<&'static str> {
        match self {
            Derived::Hit(_) => Some("HIT"),
            Derived::Miss(_) => Some("MISS"),
            Derived::Fallback => None,
        }
    }
}

// =============================================================================
// Derivative Service
// =============================================================================

/// Service for generating and caching image derivatives.
///
/// # Example
///
/// ```ignore
/// use image_derivatives::derivative::{DerivativeService, ImageStore, KeyStrategy};
///
/// let store = ImageStore::open("uploads", None)?;
/// let service = DerivativeService::new(store, KeyStrategy::Basename);
///
/// let request = DerivativeRequest::new("shirt.jpg", OutputFormat::Webp).with_width(200);
/// match service.derive(&request).await? {
///     Derived::Hit(d) | Derived::Miss(d) => println!("{} bytes", d.data.len()),
///     Derived::Fallback => println!("serve the original"),
/// }
/// ```
pub struct DerivativeService {
    store: ImageStore,
    key_strategy: KeyStrategy,
    transcoder: Transcoder,
    writer: CacheWriter,
}

impl DerivativeService {
    /// Create a new derivative service.
    pub fn new(store: ImageStore, key_strategy: KeyStrategy) -> Self {
        Self {
            store,
            key_strategy,
            transcoder: Transcoder::new(),
            writer: CacheWriter::new(),
        }
    }

    /// The store backing this service.
    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// The cache key strategy in use.
    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    /// Cache key for `request` under this service's strategy.
    pub fn cache_key(&self, request: &DerivativeRequest) -> CacheKey {
        CacheKey::new(request, self.key_strategy)
    }

    /// Get a derivative, serving from cache when fresh.
    ///
    /// `request.source_path` must be a decoded path relative to the upload
    /// root.
    ///
    /// # Errors
    ///
    /// Only `StoreError::NotFound` and `StoreError::InvalidPath` are
    /// returned. Every other failure degrades to `Derived::Fallback`.
    pub async fn derive(&self, request: &DerivativeRequest) -> Result<Derived, StoreError> {
        let source = self.store.source_path(&request.source_path)?;
        let key = self.cache_key(request);
        let cache_path = self.store.cache_path(&key);

        let freshness = match check_freshness(&source, &cache_path).await {
            Ok(freshness) => freshness,
            Err(StoreError::Io { path, message }) => {
                warn!(source = %path, "Failed to stat source: {}", message);
                return Ok(Derived::Fallback);
            }
            Err(e) => return Err(e),
        };

        match freshness {
            Freshness::Hit => match tokio::fs::read(&cache_path).await {
                Ok(data) => {
                    debug!(cache_key = %key, "Derivative cache hit");
                    return Ok(Derived::Hit(Derivative {
                        data: Bytes::from(data),
                        format: request.format,
                    }));
                }
                // Entry vanished or is unreadable: regenerate it
                Err(e) => debug!(cache_key = %key, "Cache entry unreadable: {}", e),
            },
            Freshness::Miss(reason) => {
                debug!(cache_key = %key, reason = ?reason, "Derivative cache miss")
            }
        }

        let source_bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(request.source_path.clone()))
            }
            Err(e) => {
                warn!(source = %source.display(), "Failed to read source: {}", e);
                return Ok(Derived::Fallback);
            }
        };

        let transcoder = self.transcoder.clone();
        let (width, quality, format) = (request.width, request.quality, request.format);
        let result = tokio::task::spawn_blocking(move || {
            transcoder.transcode(&source_bytes, width, quality, format)
        })
        .await;

        let data = match result {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(source = %request.source_path, "Image processing failed, serving original: {}", e);
                return Ok(Derived::Fallback);
            }
            Err(e) => {
                error!(source = %request.source_path, "Image processing task failed: {}", e);
                return Ok(Derived::Fallback);
            }
        };

        self.writer.spawn_write(cache_path, data.clone());

        Ok(Derived::Miss(Derivative {
            data,
            format: request.format,
        }))
    }
}
