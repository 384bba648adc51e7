//! Error types for hls-dl
//!
//! This module provides the error taxonomy of the library:
//! - Manifest-stage errors (fetch, parse, redirect loops), which abort a session
//! - Per-segment download errors, which are recoverable at batch level
//! - The empty-result error, raised when a batch yields no segments at all
//! - Ambient errors (configuration, I/O, network, encoder)

use thiserror::Error;

/// Result type alias for hls-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-dl
///
/// Each variant carries enough context (URL, segment index, config key) to
/// diagnose the failure without consulting the logs.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// A manifest URL could not be parsed as an absolute URL
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Fetching manifest text failed (non-2xx response or network failure)
    #[error("failed to fetch manifest {url}: {reason}")]
    ManifestFetch {
        /// The manifest URL
        url: String,
        /// The underlying failure
        reason: String,
    },

    /// The manifest contained no usable streams or segments
    #[error("failed to parse manifest: {0}")]
    ManifestParse(String),

    /// Master playlist redirection exceeded the depth cap or revisited a URL
    #[error("manifest redirect loop at {url} (depth {depth})")]
    ManifestRedirectLoop {
        /// The URL that would have been fetched next
        url: String,
        /// Number of manifests already fetched in this resolution
        depth: usize,
    },

    /// A single segment exhausted its retry budget
    #[error(transparent)]
    SegmentDownload(#[from] SegmentDownloadError),

    /// No segment of the batch was downloaded
    #[error("no segments were downloaded ({total} attempted)")]
    EmptyResult {
        /// Number of segments the batch attempted
        total: usize,
    },

    /// An HTTP request returned a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// The requested URL
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// A request did not complete within its deadline
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// The requested URL
        url: String,
        /// The deadline that was exceeded
        timeout_ms: u64,
    },

    /// The external encoder failed
    #[error("encoder error: {0}")]
    Encode(String),

    /// Operation not supported (missing binary, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Session not found in the registry
    #[error("session not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A segment whose every attempt failed
#[derive(Debug, Clone, Error)]
#[error("segment {index} failed after {attempts} attempt(s): {last_error}")]
pub struct SegmentDownloadError {
    /// Zero-based position of the segment in the media playlist
    pub index: usize,
    /// Number of attempts made before giving up
    pub attempts: u32,
    /// Message of the last attempt's error
    pub last_error: String,
}

impl Error {
    /// Machine-readable error code, stable across releases.
    ///
    /// Used in failure events and session records so consumers can branch
    /// without matching on message text.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::ManifestFetch { .. } => "manifest_fetch_error",
            Error::ManifestParse(_) => "manifest_parse_error",
            Error::ManifestRedirectLoop { .. } => "manifest_redirect_loop",
            Error::SegmentDownload(_) => "segment_download_error",
            Error::EmptyResult { .. } => "empty_result",
            Error::HttpStatus { .. } => "http_status",
            Error::Timeout { .. } => "timeout",
            Error::Encode(_) => "encode_error",
            Error::NotSupported(_) => "not_supported",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this error aborts the whole download session.
    ///
    /// Only per-segment failures are absorbed by the engine; everything else
    /// reaching the session boundary is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::SegmentDownload(_))
    }
}
