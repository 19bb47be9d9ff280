//! Router configuration for the image server.
//!
//! # Route Structure
//!
//! ```text
//! /health                          - Health check (public)
//! /uploads/{path}?w=&q=&format=    - Originals and derivatives (public)
//! /api/admin/image-cache           - DELETE: clear the cache (protected)
//! /api/admin/image-cache/stats     - GET: cache statistics (protected)
//! /api/admin/upload                - POST: upload one image (protected)
//! /api/admin/upload-multiple       - POST: upload several images (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use image_derivatives::derivative::{DerivativeService, ImageStore, KeyStrategy};
//! use image_derivatives::server::{create_router, RouterConfig};
//!
//! let store = ImageStore::open("uploads", None)?;
//! let service = DerivativeService::new(store, KeyStrategy::Basename);
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://shop.example.com".to_string()]);
//!
//! let router = create_router(service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, SignedUrlAuth};
use super::handlers::{
    cache_clear_handler, cache_stats_handler, health_handler, upload_handler,
    upload_multiple_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use super::middleware::derivative_middleware;
use crate::derivative::DerivativeService;
use crate::upload::UploadPolicy;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for signed admin URLs
    pub auth_secret: String,

    /// Whether authentication is enabled for admin routes
    pub auth_enabled: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for images
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Limits and optimization for admin uploads
    pub upload_policy: UploadPolicy,
}

impl RouterConfig {
    /// Create a new router configuration with the given auth secret.
    ///
    /// By default:
    /// - Authentication is enabled
    /// - CORS allows any origin
    /// - Cache max-age is one year
    /// - Tracing is enabled
    /// - Uploads use [`UploadPolicy::default`]
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            auth_enabled: true,
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            upload_policy: UploadPolicy::default(),
        }
    }

    /// Create a configuration with authentication disabled.
    ///
    /// **Warning**: This leaves the admin API open. Development and tests only.
    pub fn without_auth() -> Self {
        Self::new(String::new()).with_auth_enabled(false)
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable authentication.
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the upload policy.
    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Public routes (health check, images under `/uploads`)
/// - Admin routes (signed URL auth when enabled)
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router(service: DerivativeService, config: RouterConfig) -> Router {
    let app_state = AppState::new(service)
        .with_cache_max_age(config.cache_max_age)
        .with_upload_policy(config.upload_policy.clone());

    let cors = build_cors_layer(&config);

    let admin_routes = build_admin_router(app_state.clone());
    let admin_routes = if config.auth_enabled {
        // Auth is applied AFTER nesting so it sees the full /api/admin/... path
        Router::new()
            .nest("/api/admin", admin_routes)
            .layer(middleware::from_fn_with_state(
                SignedUrlAuth::new(&config.auth_secret),
                auth_middleware,
            ))
    } else {
        Router::new().nest("/api/admin", admin_routes)
    };

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest_service("/uploads", build_image_router(app_state))
        .merge(admin_routes)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Static files with the derivative middleware in front.
fn build_image_router(app_state: AppState) -> Router {
    let static_files = ServeDir::new(app_state.service.store().upload_root());

    Router::new()
        .fallback_service(static_files)
        .layer(middleware::from_fn_with_state(
            app_state,
            derivative_middleware,
        ))
}

/// Admin API, relative to `/api/admin`.
fn build_admin_router(app_state: AppState) -> Router {
    let body_limit = app_state.upload_policy.body_limit();

    Router::new()
        .route("/image-cache", delete(cache_clear_handler))
        .route("/image-cache/stats", get(cache_stats_handler))
        .route("/upload", post(upload_handler))
        .route("/upload-multiple", post(upload_multiple_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
