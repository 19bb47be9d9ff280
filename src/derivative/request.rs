//! Derivative request parsing.
//!
//! Turns the raw `w`, `q` and `format` query parameters plus the `Accept`
//! header into a [`Transform`]. Parsing never fails: out-of-range values are
//! clamped and unrecognized values fall back to defaults.

use std::path::Path;

use serde::Deserialize;

/// Default output quality when `q` is absent (1-100).
pub const DEFAULT_QUALITY: u8 = 80;

/// Minimum allowed quality.
pub const MIN_QUALITY: u8 = 1;

/// Maximum allowed quality.
pub const MAX_QUALITY: u8 = 100;

/// Smallest width a derivative may be resized to.
pub const MIN_WIDTH: u32 = 100;

/// Largest width a derivative may be resized to.
pub const MAX_WIDTH: u32 = 2000;

// =============================================================================
// Output Format
// =============================================================================

/// Encodings a derivative can be produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Parse a `format` query value. Accepts `jpg` as an alias for `jpeg`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "webp" => Some(OutputFormat::Webp),
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    /// The format a source keeps when no other format is negotiated.
    ///
    /// `.png` stays PNG; every other extension is served as JPEG.
    pub fn from_extension(path: &str) -> Self {
        let is_png = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false);

        if is_png {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }

    /// File extension used for cache entries.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }

    /// MIME type for the `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Raw transformation parameters from the query string.
///
/// Values are kept as strings so that malformed numbers degrade to defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DerivativeQuery {
    /// Target width in pixels
    #[serde(default)]
    pub w: Option<String>,

    /// Output quality (1-100)
    #[serde(default)]
    pub q: Option<String>,

    /// Output format (webp, jpeg, png)
    #[serde(default)]
    pub format: Option<String>,
}

impl DerivativeQuery {
    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Whether any transformation parameter was supplied.
    pub fn requests_transform(&self) -> bool {
        Self::present(&self.w).is_some()
            || Self::present(&self.q).is_some()
            || Self::present(&self.format).is_some()
    }
}

// =============================================================================
// Derivative Request
// =============================================================================

/// A normalized request for one derivative of a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeRequest {
    /// Path of the source image relative to the upload root
    pub source_path: String,

    /// Target width, already clamped. `None` keeps the original size.
    pub width: Option<u32>,

    /// Output quality, already clamped
    pub quality: u8,

    /// Output encoding
    pub format: OutputFormat,
}

impl DerivativeRequest {
    /// Create a request with default quality and no resize.
    pub fn new(source_path: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            source_path: source_path.into(),
            width: None,
            quality: DEFAULT_QUALITY,
            format,
        }
    }

    /// Set the target width, clamping it into the allowed range.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(clamp_width(i64::from(width)));
        self
    }

    /// Set the quality, clamping it into the allowed range.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = clamp_quality(i64::from(quality));
        self
    }
}

/// Outcome of parsing an image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// No transformation parameters: serve the file as stored
    NoTransform,

    /// Produce (or fetch from cache) a derivative
    Derive(DerivativeRequest),
}

impl Transform {
    /// Parse query parameters and the `Accept` header for `source_path`.
    pub fn parse(source_path: &str, query: &DerivativeQuery, accept: Option<&str>) -> Self {
        if !query.requests_transform() {
            return Transform::NoTransform;
        }

        let width = DerivativeQuery::present(&query.w)
            .and_then(parse_leading_int)
            .map(clamp_width);

        let quality = DerivativeQuery::present(&query.q)
            .and_then(parse_leading_int)
            .map(clamp_quality)
            .unwrap_or(DEFAULT_QUALITY);

        let format = DerivativeQuery::present(&query.format)
            .and_then(OutputFormat::parse)
            .unwrap_or_else(|| negotiate_format(source_path, accept));

        Transform::Derive(DerivativeRequest {
            source_path: source_path.to_string(),
            width,
            quality,
            format,
        })
    }
}

/// Pick a format from the `Accept` header, falling back to the source's own.
pub fn negotiate_format(source_path: &str, accept: Option<&str>) -> OutputFormat {
    if accept.map(accepts_webp).unwrap_or(false) {
        OutputFormat::Webp
    } else {
        OutputFormat::from_extension(source_path)
    }
}

/// Whether an `Accept` header lists `image/webp` as a media range.
pub fn accepts_webp(accept: &str) -> bool {
    accept.split(',').any(|range| {
        range
            .split(';')
            .next()
            .map(|media| media.trim().eq_ignore_ascii_case("image/webp"))
            .unwrap_or(false)
    })
}

/// Clamp a width into `[MIN_WIDTH, MAX_WIDTH]`.
#[inline]
pub fn clamp_width(width: i64) -> u32 {
    width.clamp(i64::from(MIN_WIDTH), i64::from(MAX_WIDTH)) as u32
}

/// Clamp a quality into `[MIN_QUALITY, MAX_QUALITY]`.
#[inline]
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(i64::from(MIN_QUALITY), i64::from(MAX_QUALITY)) as u8
}

/// Parse the integer prefix of a value (`"250px"` is 250, `"abc"` is none).
///
/// Saturates instead of overflowing; callers clamp the result anyway.
fn parse_leading_int(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let digits: &str = {
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        &digits[..end]
    };
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });

    Some(if negative { -magnitude } else { magnitude })
}

// =============================================================================
// Tests
// =============================================================================
