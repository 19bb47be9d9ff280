//! Cache file names for derivatives.
//!
//! # Key Format
//!
//! ```text
//! {stem}_w{width|orig}_q{quality}.{ext}               (KeyStrategy::Basename)
//! {stem}_{digest}_w{width|orig}_q{quality}.{ext}      (KeyStrategy::SourcePath)
//! ```
//!
//! `Basename` only looks at the file name, so `a/logo.png` and `b/logo.png`
//! share cache entries. Uploads are written flat with generated names, which
//! keeps this from mattering in practice. `SourcePath` adds a short SHA-256
//! digest of the full relative path and has no such collision.

use std::path::Path;

use clap::ValueEnum;
use sha2::{Digest, Sha256};

use super::request::DerivativeRequest;

/// Number of hex digits of the path digest kept in `SourcePath` keys.
const PATH_DIGEST_LEN: usize = 12;

/// How the source path contributes to the cache file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyStrategy {
    /// File stem only
    #[default]
    Basename,

    /// File stem plus a digest of the full relative path
    SourcePath,
}

/// Deterministic cache file name for one derivative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    file_name: String,
}

impl CacheKey {
    /// Build the key for a request.
    pub fn new(request: &DerivativeRequest, strategy: KeyStrategy) -> Self {
        let stem = Path::new(&request.source_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");

        let width = request
            .width
            .map(|w| w.to_string())
            .unwrap_or_else(|| "orig".to_string());

        let prefix = match strategy {
            KeyStrategy::Basename => stem.to_string(),
            KeyStrategy::SourcePath => format!("{}_{}", stem, path_digest(&request.source_path)),
        };

        Self {
            file_name: format!(
                "{}_w{}_q{}.{}",
                prefix,
                width,
                request.quality,
                request.format.extension()
            ),
        }
    }

    /// The file name inside the cache directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name)
    }
}

fn path_digest(source_path: &str) -> String {
    let normalized = source_path.trim_start_matches('/');
    let digest = Sha256::digest(normalized.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(PATH_DIGEST_LEN);
    hex
}
