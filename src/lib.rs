//! # hls-dl
//!
//! Library for downloading HLS (`.m3u8`) streams.
//!
//! Given a manifest URL, hls-dl follows a master playlist to one of its
//! variants, parses the media playlist into an ordered segment list, fetches
//! every segment into a per-session staging directory with bounded
//! concurrency and per-segment retry, and writes a concatenation list in
//! playlist order. The list can be handed to an [`Encoder`] such as
//! [`FfmpegEncoder`] to produce a single output file.
//!
//! ## Design Philosophy
//!
//! - **Order is positional** - segment order comes from the playlist, never from completion order
//! - **Partial output is acceptable** - a segment that keeps failing is dropped, not fatal
//! - **Library-first** - no CLI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use hls_dl::{Config, HlsDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.max_concurrent = 8;
//!
//!     let downloader = HlsDownloader::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let encoder = downloader.default_encoder()?;
//!     let quality = downloader.config().encoder.quality;
//!     let outcome = downloader
//!         .download_and_encode(
//!             "https://example.com/stream/master.m3u8",
//!             std::path::Path::new("output.mp4"),
//!             quality,
//!             &encoder,
//!         )
//!         .await?;
//!     println!("wrote {}", outcome.output.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download session orchestration
pub mod downloader;
/// Output encoding
pub mod encoder;
/// Concurrent segment download engine
pub mod engine;
/// Error types
pub mod error;
/// Playlist parsing and resolution
pub mod manifest;
/// Retry logic with linear backoff
pub mod retry;
/// Session registry and progress reporting
pub mod session;
/// Per-session staging directories
pub mod staging;
/// HTTP transport abstraction
pub mod transport;
/// Core types and events
pub mod types;
/// Relative reference resolution
pub mod url_resolver;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, EncoderConfig, RetryConfig};
pub use downloader::{DownloadOutcome, EncodeOutcome, HlsDownloader};
pub use encoder::{
    EncodeProgress, Encoder, EncoderSettings, FfmpegEncoder, QualityProfile, format_file_size,
};
pub use engine::{ConcurrentDownloadEngine, DownloadReport, SegmentFetcher};
pub use error::{Error, Result, SegmentDownloadError};
pub use manifest::{ManifestResolver, Playlist, ResolvedManifest, parse_playlist};
pub use session::{SessionRegistry, SessionReporter};
pub use staging::StagingArea;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    DownloadTask, Event, SegmentDescriptor, SessionId, SessionInfo, SessionStatus, StreamSummary,
};
