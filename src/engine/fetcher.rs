//! Single-segment download with per-attempt timeout and linear-backoff retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::SegmentDownloadError;
use crate::retry::{IsRetryable, download_with_retry};
use crate::session::SessionReporter;
use crate::staging::segment_file_name;
use crate::transport::HttpTransport;
use crate::types::DownloadTask;

/// Downloads individual segments into a staging directory.
pub struct SegmentFetcher {
    transport: Arc<dyn HttpTransport>,
    staging_dir: PathBuf,
    retry: RetryConfig,
    timeout: Duration,
}

impl SegmentFetcher {
    /// Create a fetcher writing into `staging_dir`
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        staging_dir: &Path,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            staging_dir: staging_dir.to_path_buf(),
            retry,
            timeout,
        }
    }

    /// Where segment `index` is written
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.staging_dir.join(segment_file_name(index))
    }

    /// Download `task`'s segment, retrying failed attempts.
    ///
    /// Each attempt streams the body to `segment_{index:06}.ts`, overwriting
    /// whatever a previous attempt left behind. `task.attempts_made` is updated
    /// before returning. On terminal failure the partial file is removed.
    pub async fn fetch(
        &self,
        task: &mut DownloadTask,
        reporter: Option<&SessionReporter>,
    ) -> Result<PathBuf, SegmentDownloadError> {
        let dest = self.segment_path(task.index);
        let url = task.segment.url.as_str();
        let index = task.index;
        let max_attempts = self.retry.effective_attempts();
        let transport = &self.transport;
        let dest_ref = dest.as_path();
        let timeout = self.timeout;

        let outcome = download_with_retry(&self.retry, |attempt| async move {
            let result = transport.download_to(url, dest_ref, timeout).await;
            if let Err(e) = &result {
                tracing::debug!(
                    segment_index = index,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "Segment attempt failed"
                );
                if attempt < max_attempts
                    && e.is_retryable()
                    && let Some(reporter) = reporter
                {
                    reporter.segment_retry(index, attempt, &e.to_string());
                }
            }
            result
        })
        .await;

        task.attempts_made = outcome.attempts;

        match outcome.value {
            Ok(bytes) => {
                tracing::debug!(
                    segment_index = index,
                    bytes = bytes,
                    path = ?dest,
                    "Segment downloaded"
                );
                Ok(dest)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&dest).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(
                        path = ?dest,
                        error = %remove_err,
                        "Failed to remove partial segment"
                    );
                }
                Err(SegmentDownloadError {
                    index,
                    attempts: outcome.attempts,
                    last_error: e.to_string(),
                })
            }
        }
    }
}
