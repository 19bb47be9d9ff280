//! Configuration management for the image server.
//!
//! This module provides the CLI and configuration system:
//! - Subcommands `serve` (default), `sign` and `check`
//! - Environment variables with `IMGD_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use image_derivatives::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Sign(config) => println!("Signing {}", config.path),
//!     Command::Check(config) => println!("Checking {}", config.upload_dir.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `IMGD_HOST` - Server bind address (default: 0.0.0.0)
//! - `IMGD_PORT` - Server port (default: 3000)
//! - `IMGD_UPLOAD_DIR` - Upload root (default: uploads)
//! - `IMGD_CACHE_DIR` - Derivative cache directory (default: `<upload dir>/.cache`)
//! - `IMGD_CACHE_KEY` - Cache key strategy, `basename` or `source-path`
//! - `IMGD_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 31536000)
//! - `IMGD_AUTH_SECRET` - HMAC secret for signed admin URLs
//! - `IMGD_AUTH_ENABLED` - Enable admin authentication (default: true)
//! - `IMGD_MAX_UPLOAD_SIZE` - Per-file upload limit in bytes (default: 5 MiB)
//! - `IMGD_MAX_UPLOAD_FILES` - Files per multi-upload (default: 10)
//! - `IMGD_OPTIMIZE_UPLOADS` - Optimize uploads in place (default: true)
//! - `IMGD_OPTIMIZE_MAX_WIDTH` - Width limit for optimized uploads (default: 1600)
//! - `IMGD_OPTIMIZE_QUALITY` - Quality for optimized uploads (default: 85)
//! - `IMGD_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::derivative::KeyStrategy;
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::upload::{
    OptimizeOptions, UploadPolicy, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_OPTIMIZE_MAX_WIDTH, DEFAULT_OPTIMIZE_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default upload root.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default lifetime of signed admin URLs (1 hour).
pub const DEFAULT_SIGN_TTL: u64 = 3600;

// =============================================================================
// CLI Entry Point
// =============================================================================

/// Image derivatives server.
///
/// Serves product images from an upload directory and generates resized,
/// re-encoded derivatives on demand with a disk cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-derivatives")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // Server options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run, defaulting to `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve(ServeConfig),

    /// Generate a signed URL for an admin endpoint
    Sign(SignConfig),

    /// Check the upload directory and report cache statistics
    Check(CheckConfig),
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IMGD_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Directory holding uploaded source images.
    #[arg(long, default_value = DEFAULT_UPLOAD_DIR, env = "IMGD_UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// Directory for cached derivatives (default: `<upload dir>/.cache`).
    #[arg(long, env = "IMGD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// How cache file names are derived from the source path.
    ///
    /// `basename` shares entries between equal file names in different
    /// directories; `source-path` keeps them apart.
    #[arg(long, value_enum, default_value_t = KeyStrategy::Basename, env = "IMGD_CACHE_KEY")]
    pub cache_key: KeyStrategy,

    /// HTTP Cache-Control max-age in seconds for images.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IMGD_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Secret key for HMAC-SHA256 signed admin URLs.
    ///
    /// If not provided and auth is enabled, the server will fail to start.
    #[arg(long, env = "IMGD_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Require signed URLs on admin endpoints.
    ///
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "IMGD_AUTH_ENABLED")]
    pub auth_enabled: bool,

    // =========================================================================
    // Upload Configuration
    // =========================================================================
    /// Maximum size of a single uploaded file in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE, env = "IMGD_MAX_UPLOAD_SIZE")]
    pub max_upload_size: usize,

    /// Maximum number of files per multi-upload request.
    #[arg(long, default_value_t = DEFAULT_MAX_FILES, env = "IMGD_MAX_UPLOAD_FILES")]
    pub max_upload_files: usize,

    /// Resize and re-encode uploads in place after storing them.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "IMGD_OPTIMIZE_UPLOADS")]
    pub optimize_uploads: bool,

    /// Uploads wider than this are shrunk to it.
    #[arg(long, default_value_t = DEFAULT_OPTIMIZE_MAX_WIDTH, env = "IMGD_OPTIMIZE_MAX_WIDTH")]
    pub optimize_max_width: u32,

    /// Encoder quality for optimized uploads (1-100).
    #[arg(long, default_value_t = DEFAULT_OPTIMIZE_QUALITY, env = "IMGD_OPTIMIZE_QUALITY")]
    pub optimize_quality: u8,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMGD_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or IMGD_AUTH_SECRET, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if self.upload_dir.as_os_str().is_empty() {
            return Err("upload_dir must not be empty".to_string());
        }

        if self.max_upload_size == 0 {
            return Err("max_upload_size must be greater than 0".to_string());
        }
        if self.max_upload_files == 0 {
            return Err("max_upload_files must be greater than 0".to_string());
        }

        if self.optimize_max_width == 0 {
            return Err("optimize_max_width must be greater than 0".to_string());
        }
        if self.optimize_quality == 0 || self.optimize_quality > 100 {
            return Err("optimize_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the auth secret, or an empty string if not set (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    /// Upload limits and optimization settings.
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_file_size: self.max_upload_size,
            max_files: self.max_upload_files,
            optimize: self.optimize_uploads.then_some(OptimizeOptions {
                max_width: self.optimize_max_width,
                quality: self.optimize_quality,
            }),
        }
    }
}

// =============================================================================
// Sign Configuration
// =============================================================================

/// Output format for the `sign` command.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignOutputFormat {
    /// Path (or full URL with --base-url) with query parameters
    #[default]
    Url,

    /// JSON object with signature, expiry and URL
    Json,

    /// Only the hex signature
    Signature,
}

/// Options for the `sign` command.
#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Secret key (must match the server's).
    #[arg(long, env = "IMGD_AUTH_SECRET")]
    pub secret: String,

    /// Admin path to sign, e.g. /api/admin/image-cache/stats.
    #[arg(long)]
    pub path: String,

    /// HTTP method the URL will be used with.
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Lifetime of the signature in seconds.
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL)]
    pub ttl: u64,

    /// Extra query parameters to sign, as key=value (repeatable).
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = SignOutputFormat::Url)]
    pub format: SignOutputFormat,

    /// Base URL of the server, e.g. http://localhost:3000.
    #[arg(long)]
    pub base_url: Option<String>,
}

impl SignConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!("Path must start with '/': {}", self.path));
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        if !matches!(
            self.method.to_ascii_uppercase().as_str(),
            "GET" | "POST" | "DELETE"
        ) {
            return Err(format!("Unsupported method for admin URLs: {}", self.method));
        }
        Ok(())
    }

    /// Parse `--param key=value` arguments.
    pub fn parse_params(&self) -> Result<Vec<(String, String)>, String> {
        self.params
            .iter()
            .map(|param| match param.split_once('=') {
                Some((key, _)) if key == "exp" || key == "sig" => {
                    Err(format!("Parameter '{}' is reserved", key))
                }
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                _ => Err(format!("Invalid parameter (expected key=value): {}", param)),
            })
            .collect()
    }
}

// =============================================================================
// Check Configuration
// =============================================================================

/// Options for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Directory holding uploaded source images.
    #[arg(long, default_value = DEFAULT_UPLOAD_DIR, env = "IMGD_UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// Directory for cached derivatives (default: `<upload dir>/.cache`).
    #[arg(long, env = "IMGD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
