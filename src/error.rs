//! Error types for ClipCache
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the layer that produces them:
//!
//! ### Filesystem
//! - Transient query failures while polling a staged file are absorbed by the
//!   stability poller and never surface here.
//! - `DirectoryUnavailable` is raised once the directory retry budget is spent.
//! - `PromotionFailed` covers a move that did not leave a file at its destination.
//!
//! ### Download
//! - `DownloadFailed` wraps whatever went wrong and names the URL. The cause is
//!   held in an `Arc` because one failure is delivered to every coalesced caller.
//! - `NetworkError` / `UnexpectedStatusCode` come from the HTTP downloader.
//!
//! ### Stability
//! - `StabilityTimeout` is only produced by consumers that need an error value;
//!   the poller itself reports a timeout as `None`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using our CacheError type
pub type Result<T> = std::result::Result<T, CacheError>;

/// Main error type for ClipCache
#[derive(Error, Debug)]
pub enum CacheError {
    // ===== Filesystem Errors =====

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Directory could not be created or verified within the retry budget
    #[error("Directory unavailable after {attempts} attempts: {}", path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        attempts: u32,
    },

    /// A staged file never reached two consecutive equal-size readings
    #[error("File did not stabilize after {attempts} checks: {}", path.display())]
    StabilityTimeout {
        path: PathBuf,
        attempts: u32,
    },

    /// Move to permanent storage did not produce a file at the destination
    #[error("Promotion failed for {}: {reason}", path.display())]
    PromotionFailed {
        path: PathBuf,
        reason: String,
    },

    // ===== Download Errors =====

    /// Caching a remote resource failed; shared by every coalesced caller
    #[error("Failed to cache {url}: {source}")]
    DownloadFailed {
        url: String,
        #[source]
        source: Arc<CacheError>,
    },

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned a non-success status code
    #[error("Server responded with status {status_code} for {url}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// URL could not be parsed or has an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ===== Pipeline Errors =====

    /// External compression engine failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// No active operation registered under this id
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// Operation id is already in use
    #[error("Operation already active: {0}")]
    OperationAlreadyActive(String),

    // ===== Input/Configuration Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== General Errors =====

    /// Operation was cancelled by user or system
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CacheError::Cancelled
        } else {
            CacheError::InternalError(format!("Background task panicked: {}", err))
        }
    }
}

// Helper methods for creating common errors
impl CacheError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        CacheError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        CacheError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        CacheError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Wrap a failure so it names the URL being cached
    pub fn download_failed<S: Into<String>>(url: S, source: CacheError) -> Self {
        CacheError::DownloadFailed {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Check if error is retryable by the caller
    ///
    /// The coordinator never retries downloads itself; this tells callers
    /// whether trying again later has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::NetworkError { is_transient, .. } => *is_transient,
            CacheError::UnexpectedStatusCode { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || (500..=599).contains(status_code)
            }
            CacheError::DownloadFailed { source, .. } => source.is_retryable(),
            CacheError::StabilityTimeout { .. }
            | CacheError::DirectoryUnavailable { .. }
            | CacheError::IoError(_) => true,
            CacheError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        match self {
            CacheError::FileIoError(_)
            | CacheError::DirectoryUnavailable { .. }
            | CacheError::StabilityTimeout { .. }
            | CacheError::PromotionFailed { .. }
            | CacheError::IoError(_) => true,
            CacheError::DownloadFailed { source, .. } => source.is_file_error(),
            _ => false,
        }
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Caching is an optimization, so most messages steer toward "playback
    /// still works" rather than exposing filesystem detail.
    pub fn user_message(&self) -> String {
        match self {
            CacheError::DownloadFailed { .. } | CacheError::NetworkError { .. } => {
                "The video could not be saved for offline playback. It will stream instead.".to_string()
            }
            CacheError::DirectoryUnavailable { .. } => {
                "Storage is not available right now. Please check free space and try again.".to_string()
            }
            CacheError::StabilityTimeout { .. } | CacheError::PromotionFailed { .. } => {
                "The video could not be finalized. The original file was kept.".to_string()
            }
            CacheError::Cancelled => "The operation was cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}
