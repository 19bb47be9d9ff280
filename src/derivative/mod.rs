//! On-demand image derivatives with a disk cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        HTTP middleware (/uploads)       │
//! └────────────────────┬────────────────────┘
//!                      │ Transform::parse
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           DerivativeService             │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  CacheKey +  │  │   Transcoder    │  │
//! │  │  freshness   │  │ (decode, resize │  │
//! │  │              │  │  and encode)    │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      ImageStore + CacheWriter (disk)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Transform`]: parsed request, either `NoTransform` or a [`DerivativeRequest`]
//! - [`CacheKey`]: deterministic cache file name
//! - [`check_freshness`]: mtime comparison between source and cache entry
//! - [`Transcoder`]: decode, resize and encode
//! - [`CacheWriter`]: detached, best-effort cache population
//! - [`ImageStore`]: upload root and cache directory layout
//! - [`DerivativeService`]: ties the above together

mod freshness;
mod key;
mod request;
mod service;
mod store;
mod transcode;
mod writer;

pub use freshness::{check_freshness, Freshness, MissReason};
pub use key::{CacheKey, KeyStrategy};
pub use request::{
    accepts_webp, clamp_quality, clamp_width, negotiate_format, DerivativeQuery,
    DerivativeRequest, OutputFormat, Transform, DEFAULT_QUALITY, MAX_QUALITY, MAX_WIDTH,
    MIN_QUALITY, MIN_WIDTH,
};
pub use service::{Derivative, DerivativeService, Derived};
pub use store::{normalize_relative, CacheStats, ImageStore, DEFAULT_CACHE_DIR_NAME};
pub use transcode::{encode, png_compression_level, resize_to_width, target_dimensions, Transcoder};
pub use writer::{write_atomic, CacheWriter};
