//! In-place optimization of uploaded images.
//!
//! After an upload is stored, the original is shrunk to a maximum width and
//! re-encoded in its own format, then a WebP sibling is written next to it.
//! Replacing the original refreshes its modification time, which makes every
//! cached derivative of it stale.
//!
//! GIF uploads are not rewritten (re-encoding would flatten animation); they
//! only get the WebP sibling.

use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::derivative::{encode, resize_to_width, OutputFormat, Transcoder};
use crate::error::{ImageError, OptimizeError};

/// Default maximum width for stored originals.
pub const DEFAULT_OPTIMIZE_MAX_WIDTH: u32 = 1600;

/// Default quality for re-encoded originals and WebP siblings.
pub const DEFAULT_OPTIMIZE_QUALITY: u8 = 85;

/// Settings for [`optimize_in_place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOptions {
    /// Originals wider than this are shrunk to it
    pub max_width: u32,

    /// Encoder quality (1-100)
    pub quality: u8,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_OPTIMIZE_MAX_WIDTH,
            quality: DEFAULT_OPTIMIZE_QUALITY,
        }
    }
}

/// What [`optimize_in_place`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Whether the image was wider than the limit
    pub resized: bool,

    /// Final dimensions
    pub width: u32,
    pub height: u32,

    /// Whether the original file was rewritten
    pub rewritten: bool,

    /// Path of the WebP sibling, if one was written
    pub webp_sibling: Option<PathBuf>,
}

/// Format an original is re-encoded in, by extension.
///
/// `None` means the original is left untouched.
fn rewrite_format(ext: &str) -> Result<Option<OutputFormat>, ImageError> {
    match ext {
        "png" => Ok(Some(OutputFormat::Png)),
        "webp" => Ok(Some(OutputFormat::Webp)),
        "jpg" | "jpeg" => Ok(Some(OutputFormat::Jpeg)),
        "gif" => Ok(None),
        other => Err(ImageError::UnsupportedFormat(other.to_string())),
    }
}

/// Shrink and re-encode the image at `path`, then write a WebP sibling.
///
/// Blocking; run it on a blocking thread.
pub fn optimize_in_place(path: &Path, options: OptimizeOptions) -> Result<OptimizeReport, OptimizeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let format = rewrite_format(&ext)?;

    let source = std::fs::read(path).map_err(|e| OptimizeError::io(path, e))?;
    let img = Transcoder::new().decode(&source)?;

    let resized = img.width() > options.max_width;
    let img = resize_to_width(img, options.max_width);

    let rewritten = if let Some(format) = format {
        let data = encode(&img, format, options.quality)?;
        let tmp = dir.join(format!("{}_temp.{}", stem, ext));
        std::fs::write(&tmp, &data).map_err(|e| OptimizeError::io(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(OptimizeError::io(path, e));
        }
        true
    } else {
        false
    };

    let webp_sibling = if ext == "webp" {
        None
    } else {
        let webp_path = dir.join(format!("{}.webp", stem));
        let data = encode(&img, OutputFormat::Webp, options.quality)?;
        std::fs::write(&webp_path, &data).map_err(|e| OptimizeError::io(&webp_path, e))?;
        Some(webp_path)
    };

    Ok(OptimizeReport {
        resized,
        width: img.width(),
        height: img.height(),
        rewritten,
        webp_sibling,
    })
}

/// Run [`optimize_in_place`] on a detached blocking task, logging the outcome.
pub fn spawn_optimize(path: PathBuf, options: OptimizeOptions) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || match optimize_in_place(&path, options) {
        Ok(report) => info!(
            path = %path.display(),
            width = report.width,
            height = report.height,
            resized = report.resized,
            "Image optimized"
        ),
        Err(e) => warn!(path = %path.display(), "Image optimization failed: {}", e),
    })
}
