//! Core types for hls-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One media segment of a media playlist
///
/// Produced by the manifest parser in playlist order and never mutated
/// afterwards. The position of a descriptor in the segment list is the sole
/// source of truth for playback order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Segment duration in seconds (always > 0)
    pub duration: f64,
    /// Segment URL, absolute once the resolver has run
    pub url: String,
}

/// Per-segment unit of work for the download engine
///
/// Created for each segment when the engine starts and owned by the single
/// in-flight fetch working on it.
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// The segment to fetch
    pub segment: SegmentDescriptor,
    /// Zero-based position in the media playlist
    pub index: usize,
    /// Attempts made so far
    pub attempts_made: u32,
}

impl DownloadTask {
    /// Create a fresh task with no attempts recorded
    pub fn new(index: usize, segment: SegmentDescriptor) -> Self {
        Self {
            segment,
            index,
            attempts_made: 0,
        }
    }
}

/// Aggregate information about a resolved media playlist
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Number of segments
    pub segment_count: usize,
    /// Sum of segment durations in seconds
    pub total_duration: f64,
    /// Mean segment duration in seconds
    pub average_duration: f64,
    /// URL of the first segment
    pub first_url: Option<String>,
    /// URL of the last segment
    pub last_url: Option<String>,
}

impl StreamSummary {
    /// Summarize an ordered segment list
    pub fn from_segments(segments: &[SegmentDescriptor]) -> Self {
        let total_duration: f64 = segments.iter().map(|s| s.duration).sum();
        let average_duration = if segments.is_empty() {
            0.0
        } else {
            total_duration / segments.len() as f64
        };

        Self {
            segment_count: segments.len(),
            total_duration,
            average_duration,
            first_url: segments.first().map(|s| s.url.clone()),
            last_url: segments.last().map(|s| s.url.clone()),
        }
    }
}

/// Unique identifier for a download session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Lifecycle state of a download session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Fetching and parsing manifests
    Resolving,
    /// Fetching segments
    Downloading {
        /// Segments downloaded so far
        completed: usize,
        /// Segments that exhausted their retries
        failed: usize,
        /// Segments in the playlist
        total: usize,
    },
    /// Running the encoder
    Encoding,
    /// Finished successfully
    Complete,
    /// Aborted with an error
    Failed {
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },
}

impl SessionStatus {
    /// Whether the session has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed { .. })
    }
}

/// Snapshot of a session's record in the registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session ID
    pub id: SessionId,
    /// Manifest URL the session was started with
    pub url: String,
    /// Current status
    pub status: SessionStatus,
    /// When the session was registered
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

/// Event emitted by the downloader
///
/// Consumers obtain a receiver through
/// [`HlsDownloader::subscribe`](crate::HlsDownloader::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A master playlist was found and one variant chosen
    StreamSelected {
        /// Session ID
        session: SessionId,
        /// Absolute URL of the chosen variant
        url: String,
        /// Zero-based index of the chosen variant
        index: usize,
        /// Number of variants listed
        candidates: usize,
    },

    /// The media playlist was resolved
    ManifestResolved {
        /// Session ID
        session: SessionId,
        /// Number of segments found
        segments: usize,
        /// Total duration in seconds
        total_duration: f64,
    },

    /// A segment attempt failed and will be retried
    SegmentRetry {
        /// Session ID
        session: SessionId,
        /// Segment index
        index: usize,
        /// Attempt that failed (1-based)
        attempt: u32,
        /// Error message
        error: String,
    },

    /// A segment was written to the staging area
    SegmentCompleted {
        /// Session ID
        session: SessionId,
        /// Segment index
        index: usize,
    },

    /// A segment settled, successfully or not
    SegmentProgress {
        /// Session ID
        session: SessionId,
        /// Segments downloaded so far
        completed: usize,
        /// Segments that exhausted their retries so far
        failed: usize,
        /// Segments in the playlist
        total: usize,
        /// Settled share of the playlist (0.0 to 100.0)
        percent: f32,
    },

    /// A segment exhausted its retries and was dropped from the output
    SegmentFailed {
        /// Session ID
        session: SessionId,
        /// Segment index
        index: usize,
        /// Error message
        error: String,
    },

    /// All segments settled and the concat list was written
    DownloadComplete {
        /// Session ID
        session: SessionId,
        /// Segments in the playlist
        total_segments: usize,
        /// Segments downloaded
        downloaded_segments: usize,
        /// Path of the concat list
        concat_list: PathBuf,
    },

    /// The session failed
    DownloadFailed {
        /// Session ID
        session: SessionId,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// The encoder was started
    EncodeStarted {
        /// Session ID
        session: SessionId,
        /// Output path
        output: PathBuf,
    },

    /// The encoder reported progress
    EncodeProgress {
        /// Session ID
        session: SessionId,
        /// Media time encoded so far, in milliseconds
        out_time_ms: u64,
        /// Share of the stream encoded (0.0 to 100.0), when the duration is known
        percent: Option<f32>,
    },

    /// The encoder finished
    EncodeComplete {
        /// Session ID
        session: SessionId,
        /// Output path
        output: PathBuf,
        /// Size of the output file in bytes
        output_bytes: u64,
    },

    /// The staging directory was removed
    StagingCleaned {
        /// Session ID
        session: SessionId,
        /// The removed directory
        path: PathBuf,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn seg(duration: f64, url: &str) -> SegmentDescriptor {
        SegmentDescriptor {
            duration,
            url: url.to_string(),
        }
    }

    #[test]
    fn summary_aggregates_durations() {
        let segments = vec![
            seg(6.0, "http://h/0.ts"),
            seg(6.0, "http://h/1.ts"),
            seg(5.0, "http://h/2.ts"),
        ];

        let summary = StreamSummary::from_segments(&segments);

        assert_eq!(summary.segment_count, 3);
        assert!((summary.total_duration - 17.0).abs() < f64::EPSILON);
        assert!((summary.average_duration - 17.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.first_url.as_deref(), Some("http://h/0.ts"));
        assert_eq!(summary.last_url.as_deref(), Some("http://h/2.ts"));
    }

    #[test]
    fn summary_of_empty_list_has_zero_average() {
        let summary = StreamSummary::from_segments(&[]);
        assert_eq!(summary.segment_count, 0);
        assert_eq!(summary.average_duration, 0.0);
        assert!(summary.first_url.is_none());
    }

    #[test]
    fn new_task_has_no_attempts() {
        let task = DownloadTask::new(4, seg(2.0, "http://h/4.ts"));
        assert_eq!(task.index, 4);
        assert_eq!(task.attempts_made, 0);
    }

    #[test]
    fn session_id_display_and_parse() {
        let id: SessionId = "42".parse().unwrap();
        assert_eq!(id, SessionId(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::SegmentFailed {
            session: SessionId(1),
            index: 3,
            error: "HTTP 404".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "segment_failed");
        assert_eq!(json["session"], 1);
        assert_eq!(json["index"], 3);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Complete.is_finished());
        assert!(
            SessionStatus::Failed {
                code: "empty_result".into(),
                error: "x".into()
            }
            .is_finished()
        );
        assert!(!SessionStatus::Resolving.is_finished());
        assert!(
            !SessionStatus::Downloading {
                completed: 0,
                failed: 0,
                total: 1
            }
            .is_finished()
        );
    }
}
