//! Error Types
//!
//! This module defines the error types used throughout the streaming pipeline.
//!
//! # Overview
//!
//! The main error type [`StreamError`] covers the recoverable failure modes:
//! - GPU adapter / device acquisition failures
//! - Image I/O and decoding errors
//! - GPU primitive failures (mapping, unknown handles)
//! - Background task and upload queue failures
//!
//! Caller protocol violations (recycling a request that never completed,
//! double-unmapping a transfer buffer, feeding an unknown pixel layout) are
//! not represented here. They are hard assertions.
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, StreamError>`.
//!
//! ```rust,ignore
//! use myth_streaming::errors::{Result, StreamError};
//!
//! fn decode(name: &str) -> Result<()> {
//!     Err(StreamError::SourceNotFound(name.to_string()))
//! }
//! ```

use thiserror::Error;

use crate::request::LoadState;

/// The main error type for the streaming pipeline.
#[derive(Error, Debug)]
pub enum StreamError {
    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// A GPU object handle was not found in the shared namespace.
    #[error("Unknown GPU {kind} handle")]
    UnknownHandle {
        /// The kind of object that was looked up
        kind: &'static str,
    },

    /// A transfer buffer could not be mapped, flushed or unmapped.
    #[error("Transfer buffer mapping error: {0}")]
    Mapping(String),

    /// The backend does not implement the requested primitive.
    #[error("Unsupported GPU operation: {0}")]
    Unsupported(&'static str),

    // ========================================================================
    // Source & Decode Errors
    // ========================================================================
    /// The requested image source does not exist.
    #[error("Image source not found: {0}")]
    SourceNotFound(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),

    /// Decoded pixel data does not match the declared dimensions.
    #[error("Pixel data size mismatch: expected {expected} bytes, got {actual}")]
    PixelSizeMismatch {
        /// Bytes implied by width, height and layout
        expected: usize,
        /// Bytes actually provided
        actual: usize,
    },

    // ========================================================================
    // Async & Threading Errors
    // ========================================================================
    /// Task join error (when background tasks are cancelled).
    #[error("Task join error: {0}")]
    TaskJoinError(String),

    /// The secondary upload worker is no longer running.
    #[error("Upload worker disconnected")]
    UploadWorkerDisconnected,

    /// The upload queue is at capacity.
    #[error("Upload queue is full")]
    UploadQueueFull,

    // ========================================================================
    // Request Lifecycle Errors
    // ========================================================================
    /// A load request was recycled while still loading or in use.
    #[error("Load request '{name}' cannot be recycled in state {state:?}")]
    RecycleRejected {
        /// Source name of the request
        name: String,
        /// State the request was in
        state: LoadState,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("Settings parse error: {0}")]
    SettingsError(#[from] serde_json::Error),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for StreamError {
    fn from(err: image::ImageError) -> Self {
        StreamError::ImageDecodeError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StreamError {
    fn from(err: tokio::task::JoinError) -> Self {
        StreamError::TaskJoinError(err.to_string())
    }
}

impl<T> From<flume::TrySendError<T>> for StreamError {
    fn from(err: flume::TrySendError<T>) -> Self {
        match err {
            flume::TrySendError::Full(_) => StreamError::UploadQueueFull,
            flume::TrySendError::Disconnected(_) => StreamError::UploadWorkerDisconnected,
        }
    }
}

/// Alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
