//! # image-derivatives
//!
//! An HTTP server for product images that generates resized and re-encoded
//! derivatives on demand and keeps them in a disk cache.
//!
//! ## Features
//!
//! - **On-demand derivatives**: `?w=`, `?q=` and `?format=` on any image under `/uploads`
//! - **Format negotiation**: WebP for clients that accept it, the source's family otherwise
//! - **Disk cache**: deterministic cache file names, invalidated by source modification time
//! - **Graceful degradation**: undecodable sources are served as-is
//! - **Admin API**: signed-URL protected uploads, cache statistics and cache clearing
//!
//! ## Architecture
//!
//! - [`derivative`] - request parsing, cache keys, freshness, transcoding and the cache
//! - [`upload`] - upload validation, storage and in-place optimization
//! - [`server`] - Axum-based HTTP server, middleware and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use image_derivatives::{create_router, DerivativeService, ImageStore, KeyStrategy, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ImageStore::open("uploads", None)?;
//!     let service = DerivativeService::new(store, KeyStrategy::Basename);
//!     let router = create_router(service, RouterConfig::new("admin-secret"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod derivative;
pub mod error;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat};
pub use derivative::{
    CacheKey, CacheStats, Derivative, DerivativeQuery, DerivativeRequest, DerivativeService,
    Derived, Freshness, ImageStore, KeyStrategy, OutputFormat, Transcoder, Transform,
    DEFAULT_CACHE_DIR_NAME, DEFAULT_QUALITY, MAX_QUALITY, MAX_WIDTH, MIN_QUALITY, MIN_WIDTH,
};
pub use error::{ImageError, OptimizeError, StoreError, UploadError};
pub use server::{
    auth_middleware, create_router, derivative_middleware, health_handler, signed_query, AppState,
    AuthError, ErrorResponse, HealthResponse, RouterConfig, SignedUrlAuth, X_IMAGE_CACHE,
};
pub use upload::{
    optimize_in_place, save_upload, OptimizeOptions, OptimizeReport, StoredUpload, UploadPolicy,
};
