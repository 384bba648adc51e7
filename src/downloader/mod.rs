//! Download session orchestration.
//!
//! [`HlsDownloader`] ties the pieces together for one manifest URL:
//!
//! 1. register a session and acquire its staging area
//! 2. resolve the manifest down to a media playlist
//! 3. fetch every segment through the concurrent engine
//! 4. write the concat list (and optionally run an [`Encoder`])
//!
//! Any fatal error removes the staging area before it is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::encoder::{EncodeProgress, Encoder, FfmpegEncoder, QualityProfile, format_file_size};
use crate::engine::{ConcurrentDownloadEngine, DownloadReport, SegmentFetcher};
use crate::error::{Result, SegmentDownloadError};
use crate::manifest::ManifestResolver;
use crate::session::{SessionRegistry, SessionReporter};
use crate::staging::StagingArea;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{Event, SessionId, SessionStatus, StreamSummary};

/// Staged segments of a successful download
///
/// Owns the session's staging area. Dropping the outcome removes the staging
/// directory unless [`retain`](Self::retain) was called or `keep_temp` is set.
/// That removal blocks the current thread; inside async code prefer
/// [`cleanup`](Self::cleanup).
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Session that produced this outcome
    pub session: SessionId,
    /// Path of the concat list
    pub concat_list: PathBuf,
    /// Downloaded segment files in playlist order
    pub segment_files: Vec<PathBuf>,
    /// Segments listed in the media playlist
    pub total_segments: usize,
    /// Segments that exhausted their retries
    pub failures: Vec<SegmentDownloadError>,
    /// Time spent resolving the manifest
    pub resolve_elapsed: Duration,
    /// Time spent fetching segments and writing the concat list
    pub download_elapsed: Duration,
    staging: StagingArea,
}

impl DownloadOutcome {
    /// Number of segments downloaded
    pub fn downloaded_segments(&self) -> usize {
        self.segment_files.len()
    }

    /// Downloaded segments per second of download time
    pub fn segments_per_second(&self) -> f64 {
        segment_rate(self.downloaded_segments(), self.download_elapsed)
    }

    /// The staging directory holding the segments and concat list
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Keep the staging directory after this outcome is dropped
    pub fn retain(&mut self) {
        self.staging.retain();
    }

    /// Remove the staging directory now, without blocking the runtime
    pub async fn cleanup(mut self) -> Result<()> {
        self.staging.cleanup().await
    }
}

/// Result of [`HlsDownloader::download_and_encode`]
#[derive(Clone, Debug)]
pub struct EncodeOutcome {
    /// Session that produced this outcome
    pub session: SessionId,
    /// The encoded file
    pub output: PathBuf,
    /// Segments listed in the media playlist
    pub total_segments: usize,
    /// Segments that went into the output
    pub downloaded_segments: usize,
    /// Segments that exhausted their retries
    pub failures: Vec<SegmentDownloadError>,
    /// Size of the encoded file in bytes
    pub output_bytes: u64,
    /// Time spent resolving the manifest
    pub resolve_elapsed: Duration,
    /// Time spent fetching segments and writing the concat list
    pub download_elapsed: Duration,
    /// Time spent in the encoder
    pub encode_elapsed: Duration,
}

impl EncodeOutcome {
    /// Wall time of the whole session
    pub fn total_elapsed(&self) -> Duration {
        self.resolve_elapsed + self.download_elapsed + self.encode_elapsed
    }

    /// Downloaded segments per second of download time
    pub fn segments_per_second(&self) -> f64 {
        segment_rate(self.downloaded_segments, self.download_elapsed)
    }
}

fn segment_rate(segments: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        segments as f64 / secs
    } else {
        0.0
    }
}

/// What a session has staged before it is handed to the caller or encoder
struct StagedSegments {
    concat_list: PathBuf,
    report: DownloadReport,
    total_duration: f64,
    resolve_elapsed: Duration,
    download_elapsed: Duration,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Independent sessions may run concurrently on clones of the same
/// downloader; each stages under its own `session-<id>` directory.
#[derive(Clone)]
pub struct HlsDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,
    /// HTTP client used for manifests and segments
    transport: Arc<dyn HttpTransport>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Session records
    sessions: SessionRegistry,
}

impl HlsDownloader {
    /// Create a downloader using the reqwest-based transport
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::from_config(&config.download)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a downloader around a custom transport
    pub fn with_transport(config: Config, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::debug!(
            max_concurrent = config.download.max_concurrent,
            retry_attempts = config.retry.retry_attempts,
            timeout_ms = config.download.timeout.as_millis() as u64,
            "Downloader initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            transport,
            event_tx,
            sessions: SessionRegistry::new(),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hls_dl::{Config, HlsDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = HlsDownloader::new(Config::default())?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "download event");
    ///         }
    ///     });
    ///
    ///     let outcome = downloader.download("https://example.com/live/master.m3u8").await?;
    ///     println!("concat list at {}", outcome.concat_list.display());
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The session registry
    ///
    /// Finished sessions beyond `max_session_history` are dropped, oldest first,
    /// whenever a new session starts.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Encoder built from the configured `ffmpeg_path`, or found in PATH
    pub fn default_encoder(&self) -> Result<FfmpegEncoder> {
        FfmpegEncoder::from_config(&self.config.encoder)
    }

    /// Resolve `url` and summarize its media playlist without downloading segments
    pub async fn info(&self, url: &str) -> Result<StreamSummary> {
        self.resolver().summarize(url).await
    }

    /// Download every segment of `url` into a fresh staging area and write the concat list.
    ///
    /// Segments that exhaust their retries are left out and reported in
    /// [`DownloadOutcome::failures`].
    ///
    /// # Errors
    ///
    /// - [`Error::ManifestFetch`](crate::Error::ManifestFetch),
    ///   [`Error::ManifestParse`](crate::Error::ManifestParse) or
    ///   [`Error::ManifestRedirectLoop`](crate::Error::ManifestRedirectLoop) if resolution fails
    /// - [`Error::EmptyResult`](crate::Error::EmptyResult) if no segment could be downloaded
    ///
    /// The staging area is removed before any error is returned.
    pub async fn download(&self, url: &str) -> Result<DownloadOutcome> {
        let (reporter, mut staging) = self.open_session(url).await?;

        match self.stage(url, &reporter, &staging).await {
            Ok(staged) => {
                if self.config.download.keep_temp {
                    staging.retain();
                }
                reporter.set_status(SessionStatus::Complete).await;
                Ok(DownloadOutcome {
                    session: reporter.session(),
                    concat_list: staged.concat_list,
                    segment_files: staged.report.files,
                    total_segments: staged.report.total_segments,
                    failures: staged.report.failures,
                    resolve_elapsed: staged.resolve_elapsed,
                    download_elapsed: staged.download_elapsed,
                    staging,
                })
            }
            Err(e) => Err(self.abort(&reporter, staging, e).await),
        }
    }

    /// Download `url` and encode it into `output` with `encoder`.
    ///
    /// The staging area is removed once encoding finishes, unless `keep_temp` is set.
    pub async fn download_and_encode(
        &self,
        url: &str,
        output: &Path,
        quality: QualityProfile,
        encoder: &dyn Encoder,
    ) -> Result<EncodeOutcome> {
        let (reporter, mut staging) = self.open_session(url).await?;

        let staged = match self.stage(url, &reporter, &staging).await {
            Ok(staged) => staged,
            Err(e) => return Err(self.abort(&reporter, staging, e).await),
        };

        reporter.set_status(SessionStatus::Encoding).await;
        reporter.emit(Event::EncodeStarted {
            session: reporter.session(),
            output: output.to_path_buf(),
        });
        tracing::info!(
            session = %reporter.session(),
            encoder = encoder.name(),
            quality = %quality,
            "Encoding staged segments"
        );

        let session = reporter.session();
        let on_progress = |progress: EncodeProgress| {
            reporter.emit(Event::EncodeProgress {
                session,
                out_time_ms: progress.out_time.as_millis() as u64,
                percent: progress.percent,
            });
        };
        let started = Instant::now();
        let encoded = match encoder
            .encode_with_progress(
                &staged.concat_list,
                output,
                quality,
                staged.total_duration,
                &on_progress,
            )
            .await
        {
            Ok(path) => path,
            Err(e) => return Err(self.abort(&reporter, staging, e).await),
        };
        let encode_elapsed = started.elapsed();

        let output_bytes = match tokio::fs::metadata(&encoded).await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.abort(&reporter, staging, e.into()).await),
        };

        tracing::info!(
            session = %session,
            output = ?encoded,
            size = %format_file_size(output_bytes),
            elapsed_ms = encode_elapsed.as_millis() as u64,
            "Encoded output written"
        );
        reporter.emit(Event::EncodeComplete {
            session,
            output: encoded.clone(),
            output_bytes,
        });

        if self.config.download.keep_temp {
            staging.retain();
            tracing::info!(path = ?staging.path(), "Keeping staging area");
        } else {
            self.release(&reporter, &mut staging).await;
        }
        reporter.set_status(SessionStatus::Complete).await;

        Ok(EncodeOutcome {
            session: reporter.session(),
            output: encoded,
            total_segments: staged.report.total_segments,
            downloaded_segments: staged.report.downloaded(),
            failures: staged.report.failures,
            output_bytes,
            resolve_elapsed: staged.resolve_elapsed,
            download_elapsed: staged.download_elapsed,
            encode_elapsed,
        })
    }

    fn resolver(&self) -> ManifestResolver {
        ManifestResolver::new(self.transport.clone(), self.config.download.max_manifest_depth)
    }

    /// Register a session and create its staging directory
    async fn open_session(&self, url: &str) -> Result<(SessionReporter, StagingArea)> {
        let trimmed = self
            .sessions
            .trim_finished(self.config.download.max_session_history)
            .await;
        if trimmed > 0 {
            tracing::debug!(trimmed, "Dropped finished session records");
        }

        let session = self.sessions.register(url).await;
        let reporter = SessionReporter::new(session, self.event_tx.clone(), self.sessions.clone());
        let dir = self
            .config
            .download
            .temp_dir
            .join(format!("session-{}", session));

        tracing::info!(session = %session, url = %url, "Starting download session");

        match StagingArea::create(dir).await {
            Ok(staging) => Ok((reporter, staging)),
            Err(e) => {
                tracing::error!(session = %session, error = %e, "Failed to create staging area");
                reporter.failed(&e).await;
                Err(e)
            }
        }
    }

    /// Resolve, download and write the concat list
    async fn stage(
        &self,
        url: &str,
        reporter: &SessionReporter,
        staging: &StagingArea,
    ) -> Result<StagedSegments> {
        let session = reporter.session();
        let started = Instant::now();
        let resolved = self.resolver().resolve_manifest(url).await?;
        let resolve_elapsed = started.elapsed();

        for selection in &resolved.selections {
            reporter.emit(Event::StreamSelected {
                session,
                url: selection.url.clone(),
                index: selection.index,
                candidates: selection.candidates,
            });
        }

        let summary = StreamSummary::from_segments(&resolved.segments);
        reporter.emit(Event::ManifestResolved {
            session,
            segments: summary.segment_count,
            total_duration: summary.total_duration,
        });

        let total = resolved.segments.len();
        let started = Instant::now();
        reporter
            .set_status(SessionStatus::Downloading {
                completed: 0,
                failed: 0,
                total,
            })
            .await;

        let fetcher = SegmentFetcher::new(
            self.transport.clone(),
            staging.path(),
            self.config.retry.clone(),
            self.config.download.timeout,
        );
        let engine = ConcurrentDownloadEngine::new(fetcher).with_reporter(reporter.clone());
        let report = engine
            .run(resolved.segments, self.config.effective_concurrency(total))
            .await
            .require_any()?;

        if !report.is_complete() {
            tracing::warn!(
                session = %session,
                downloaded = report.downloaded(),
                failed = report.failures.len(),
                total = total,
                "Continuing with missing segments"
            );
        }

        let concat_list = staging.create_concat_list(&report.files).await?;
        let download_elapsed = started.elapsed();

        tracing::info!(
            session = %session,
            resolve_ms = resolve_elapsed.as_millis() as u64,
            download_ms = download_elapsed.as_millis() as u64,
            segments_per_sec = segment_rate(report.downloaded(), download_elapsed),
            "Segments staged"
        );

        reporter.emit(Event::DownloadComplete {
            session,
            total_segments: report.total_segments,
            downloaded_segments: report.downloaded(),
            concat_list: concat_list.clone(),
        });

        Ok(StagedSegments {
            concat_list,
            report,
            total_duration: summary.total_duration,
            resolve_elapsed,
            download_elapsed,
        })
    }

    /// Remove the staging area and record the failure, handing back `error`
    async fn abort(
        &self,
        reporter: &SessionReporter,
        mut staging: StagingArea,
        error: crate::Error,
    ) -> crate::Error {
        tracing::error!(
            session = %reporter.session(),
            error = %error,
            code = error.error_code(),
            "Download session failed"
        );
        self.release(reporter, &mut staging).await;
        reporter.failed(&error).await;
        error
    }

    async fn release(&self, reporter: &SessionReporter, staging: &mut StagingArea) {
        let path = staging.path().to_path_buf();
        match staging.cleanup().await {
            Ok(()) => reporter.emit(Event::StagingCleaned {
                session: reporter.session(),
                path,
            }),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Failed to remove staging area");
            }
        }
    }
}
