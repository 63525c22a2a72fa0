//! Error types for the annotation core

use std::path::PathBuf;

/// Errors from screen ⇄ document conversion
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    /// The renderer has not produced a viewport for the page yet
    #[error("page viewport is not available yet")]
    UnavailablePage,

    /// Viewport with a non-positive or non-finite scale or page size
    #[error("degenerate viewport (scale {scale}, page {width}x{height})")]
    DegenerateViewport { scale: f64, width: f64, height: f64 },
}

/// Result type for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

/// Errors from the persistence boundary
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Network or storage failure reported by the backend
    #[error("backend error: {0}")]
    Backend(String),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record whose `annotation_type` this reader does not understand
    #[error("unknown annotation type: {0}")]
    UnknownAnnotationType(String),

    /// Record missing a field that no default can stand in for
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    /// Backend answered with a response that does not match the request
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors loading engine configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors embedding a stamp or signature image
#[derive(Debug, thiserror::Error)]
pub enum StampError {
    #[error("no image data was provided")]
    Empty,

    #[error("unsupported image: {0}")]
    UnsupportedImage(#[from] image::ImageError),

    #[error("image could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("no stamp placement is pending")]
    NotPlacing,
}
