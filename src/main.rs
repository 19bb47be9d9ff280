//! image-derivatives - serves product images and on-demand derivatives.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_derivatives::{
    config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat},
    derivative::{DerivativeService, ImageStore},
    server::{
        auth::{signed_query, SignedUrlAuth},
        create_router, RouterConfig,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("image-derivatives v{}", env!("CARGO_PKG_VERSION"));
    info!("");
    info!("Configuration:");

    let store = match ImageStore::open(&config.upload_dir, config.cache_dir.clone()) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open upload directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("  Upload root: {}", store.upload_root().display());
    info!("  Cache dir: {}", store.cache_dir().display());
    info!("  Cache key: {:?}", config.cache_key);
    info!("  Cache max-age: {}s", config.cache_max_age);

    if config.auth_enabled {
        info!("  Admin auth: enabled");
    } else {
        warn!("  Admin auth: DISABLED - uploads and cache clearing are publicly accessible");
        warn!("              Enable for production: --auth-enabled=true --auth-secret=<secret>");
    }

    if config.optimize_uploads {
        info!(
            "  Uploads: {} bytes max, optimized to {}px at quality {}",
            config.max_upload_size, config.optimize_max_width, config.optimize_quality
        );
    } else {
        info!(
            "  Uploads: {} bytes max, stored as received",
            config.max_upload_size
        );
    }

    let service = DerivativeService::new(store, config.cache_key);
    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl -I 'http://{}/uploads/<file>?w=400&q=80'", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_derivatives=debug,tower_http=debug"
    } else {
        "image_derivatives=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    router_config = router_config
        .with_cache_max_age(config.cache_max_age)
        .with_upload_policy(config.upload_policy())
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let params = match config.parse_params() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let auth = SignedUrlAuth::new(&config.secret);
    let ttl = Duration::from_secs(config.ttl);

    let params_ref: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let (signature, expiry) = auth.sign_with_params(&config.method, &config.path, ttl, &params_ref);
    let query = signed_query(&params_ref, expiry, &signature);
    let url = config
        .base_url
        .as_deref()
        .map(|base| format!("{}{}?{}", base.trim_end_matches('/'), config.path, query));

    match config.format {
        SignOutputFormat::Signature => {
            println!("{}", signature);
        }
        SignOutputFormat::Json => {
            let json = serde_json::json!({
                "signature": signature,
                "expiry": expiry,
                "method": config.method.to_ascii_uppercase(),
                "path": config.path,
                "ttl": config.ttl,
                "url": url,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        SignOutputFormat::Url => match url {
            Some(url) => println!("{}", url),
            None => {
                println!("{}?{}", config.path, query);
                eprintln!();
                eprintln!("Tip: Use --base-url to generate a complete URL");
            }
        },
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("image-derivatives Configuration Check");
    println!("═════════════════════════════════════");
    println!();

    if !config.upload_dir.is_dir() {
        println!(
            "✗ Upload root: {} does not exist or is not a directory",
            config.upload_dir.display()
        );
        return ExitCode::FAILURE;
    }
    println!("✓ Upload root: {}", config.upload_dir.display());

    match count_source_images(&config.upload_dir) {
        Ok(count) => println!("✓ Source images: {}", count),
        Err(e) => {
            println!("✗ Source images: failed to list upload root: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.upload_dir.join(image_derivatives::DEFAULT_CACHE_DIR_NAME));

    if !cache_dir.exists() {
        println!(
            "✓ Cache dir: {} (created on first start)",
            cache_dir.display()
        );
    } else {
        let store = match ImageStore::open(&config.upload_dir, Some(cache_dir.clone())) {
            Ok(store) => store,
            Err(e) => {
                println!("✗ Cache dir: {}", e);
                return ExitCode::FAILURE;
            }
        };

        match store.stats().await {
            Ok(stats) => {
                println!("✓ Cache dir: {}", cache_dir.display());
                println!(
                    "  {} cached derivative(s), {} MB",
                    stats.file_count, stats.total_size_mb
                );
            }
            Err(e) => {
                println!("✗ Cache dir: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═════════════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}

/// Count image files under `dir`, skipping hidden entries.
fn count_source_images(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            count += count_source_images(&path)?;
            continue;
        }

        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                matches!(
                    e.to_ascii_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "gif"
                )
            })
            .unwrap_or(false);
        if is_image {
            count += 1;
        }
    }

    Ok(count)
}
