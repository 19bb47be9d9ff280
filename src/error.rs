use thiserror::Error;

/// Errors from decoding, resizing or encoding image data
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// Source bytes could not be decoded as an image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// The decoded image could not be encoded to the target format
    #[error("Failed to encode {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    /// The file extension does not name an image format we can write
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Errors from the upload root or the derivative cache directory
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Source image does not exist (should map to HTTP 404)
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Request path escapes the upload root or names a hidden file
    #[error("Invalid image path: {0}")]
    InvalidPath(String),

    /// Filesystem error
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl StoreError {
    /// Build an `Io` error from a `std::io::Error` and the path it concerns.
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors from the admin upload endpoints
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The multipart body did not contain the expected file field
    #[error("No file uploaded in field '{0}'")]
    MissingFile(&'static str),

    /// Content type is not one of the accepted image types
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// File exceeds the configured size limit
    #[error("File too large: {size} bytes (limit is {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    /// More files than the multi-upload endpoint accepts
    #[error("Too many files: {count} (limit is {limit})")]
    TooManyFiles { count: usize, limit: usize },

    /// The request body exceeded the upload body limit
    #[error("Request body too large: {0}")]
    BodyTooLarge(String),

    /// Malformed multipart body
    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    /// Writing the upload failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from optimizing an uploaded image in place
#[derive(Debug, Clone, Error)]
pub enum OptimizeError {
    /// Decoding or encoding failed
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Reading, writing or renaming a file failed
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl OptimizeError {
    /// Build an `Io` error from a `std::io::Error` and the path it concerns.
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        OptimizeError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}
