//! Configuration types for hls-dl

use crate::encoder::QualityProfile;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// User-Agent sent with every segment request unless overridden
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; HLS-Downloader/1.0)";

/// Download behavior configuration (concurrency, timeouts, staging)
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum segment fetches in flight at once (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Hard deadline for a single fetch attempt (default: 30000 ms)
    #[serde(
        rename = "timeout_ms",
        default = "default_timeout",
        with = "duration_ms_serde"
    )]
    pub timeout: Duration,

    /// User-Agent header for segment requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Root directory under which each session creates its staging area (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum number of manifests fetched while resolving one URL (default: 2)
    ///
    /// A master playlist pointing at a media playlist needs 2. Longer chains fail
    /// with [`Error::ManifestRedirectLoop`].
    #[serde(default = "default_max_manifest_depth")]
    pub max_manifest_depth: usize,

    /// Download segments concurrently (default: true)
    ///
    /// When false, segments are fetched one at a time in playlist order.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Keep the staging directory after a successful session (default: false)
    #[serde(default)]
    pub keep_temp: bool,

    /// Finished sessions kept in the registry (default: 100)
    ///
    /// Starting a session drops the oldest finished records beyond this count.
    /// Running sessions are never dropped.
    #[serde(default = "default_max_session_history")]
    pub max_session_history: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            temp_dir: default_temp_dir(),
            max_manifest_depth: default_max_manifest_depth(),
            parallel: true,
            keep_temp: false,
            max_session_history: default_max_session_history(),
        }
    }
}

/// Retry configuration for segment fetches
///
/// Backoff is linear: after the n-th failed attempt the fetcher waits
/// `n * base_delay` before trying again.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per segment (default: 3). Zero is treated as one attempt.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff unit (default: 1000 ms)
    #[serde(
        rename = "retry_base_delay_ms",
        default = "default_base_delay",
        with = "duration_ms_serde"
    )]
    pub base_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            base_delay: default_base_delay(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Number of attempts actually made, never less than one
    pub fn effective_attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}

/// Encoder configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Default quality profile (default: medium)
    #[serde(default)]
    pub quality: QualityProfile,
}

/// Main configuration for [`HlsDownloader`](crate::HlsDownloader)
///
/// Sub-configs are flattened, so the serialized form is a single flat object:
///
/// ```json
/// { "max_concurrent": 5, "retry_attempts": 3, "timeout_ms": 30000 }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry policy for segment fetches
    #[serde(flatten)]
    pub retry: RetryConfig,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,
}

impl Config {
    /// Parse a configuration from JSON text and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent == 0 {
            return Err(config_error("max_concurrent must be greater than 0", "max_concurrent"));
        }
        if self.download.timeout.is_zero() {
            return Err(config_error("timeout_ms must be greater than 0", "timeout_ms"));
        }
        if self.download.max_manifest_depth == 0 {
            return Err(config_error(
                "max_manifest_depth must be at least 1",
                "max_manifest_depth",
            ));
        }
        if self.download.user_agent.trim().is_empty() {
            return Err(config_error("user_agent must not be empty", "user_agent"));
        }
        Ok(())
    }

    /// Concurrency cap to use for a batch of `segment_count` segments
    pub fn effective_concurrency(&self, segment_count: usize) -> usize {
        if !self.download.parallel || segment_count <= 1 {
            1
        } else {
            self.download.max_concurrent.max(1)
        }
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_manifest_depth() -> usize {
    2
}

fn default_max_session_history() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
