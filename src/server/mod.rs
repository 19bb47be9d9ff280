//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │       GET /uploads/{path}?w=&q=&format=    /api/admin/*         │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │ middleware  │  │  handlers   │  │          auth           │  │
//! │  │(derivatives)│  │(admin, etc.)│  │  (signed admin URLs)    │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │                 routes (router config)                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use auth::{auth_middleware, signed_query, AuthError, SignedUrlAuth};
pub use handlers::{
    cache_clear_handler, cache_stats_handler, health_handler, upload_handler,
    upload_multiple_handler, AppState, ClearCacheResponse, ErrorResponse, HealthResponse,
    MultiUploadResponse, UploadResponse, DEFAULT_CACHE_MAX_AGE,
};
pub use middleware::{derivative_middleware, X_IMAGE_CACHE};
pub use routes::{create_router, RouterConfig};
