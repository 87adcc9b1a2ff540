//! Error types for the upload pipeline.
//!
//! Storage-side failures only. None of them ever reaches a producer: the
//! affected payload or file is logged and skipped, and the pipeline carries
//! on. Upload outcomes are classified separately as
//! [`UploadStatus`](crate::upload::UploadStatus), which carries the
//! retriable/rejected/server split.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid batch file name: {0}")]
    InvalidFileName(String),

    #[error("Feature already registered: {0}")]
    FeatureExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CourierError>;
