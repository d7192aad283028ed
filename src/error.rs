//! Error types for camera-feed-core

use crate::feed::FeedId;
use crate::video::DecodeError;
use std::io;
use thiserror::Error;

/// Result type alias using CameraError
pub type Result<T> = std::result::Result<T, CameraError>;

/// Camera error types
///
/// Lifecycle errors are reported to the caller and are never fatal. Decode
/// failures do not appear here as frame errors: a malformed buffer is a
/// dropped frame, not a failed call.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Operation not allowed in the current feed or server state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Format index out of range
    #[error("Invalid format index {index} (feed has {len} formats)")]
    InvalidFormatIndex {
        /// Requested index
        index: usize,
        /// Number of formats
        len: usize,
    },

    /// No decoder can be built for the pixel layout
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Raw buffer too short or rejected by the codec
    #[error("Malformed buffer: {0}")]
    MalformedBuffer(String),

    /// Backend refused, permission denied or device gone
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Feed is not registered
    #[error("Feed not found: {0}")]
    FeedNotFound(FeedId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CameraError {
    /// Create an InvalidState error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a BackendUnavailable error
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a Config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<DecodeError> for CameraError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnsupportedFormat(msg) => Self::UnsupportedFormat(msg),
            other => Self::MalformedBuffer(other.to_string()),
        }
    }
}
