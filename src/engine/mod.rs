//! Concurrent segment acquisition.
//!
//! - [`fetcher`] - One segment, with timeout and retry
//! - [`ConcurrentDownloadEngine`] - All segments of a playlist under a concurrency cap
//!
//! Fetches settle in arbitrary order. Every result is keyed by the segment's
//! playlist index and the report is assembled in index order, so completion
//! order never reaches the caller.

pub mod fetcher;

pub use fetcher::SegmentFetcher;

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::{Error, Result, SegmentDownloadError};
use crate::session::SessionReporter;
use crate::types::{DownloadTask, SegmentDescriptor};

/// Result of one engine run
#[must_use]
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Downloaded segment files, in playlist order; failed indices are skipped
    pub files: Vec<PathBuf>,
    /// Segments that exhausted their retries, in playlist order
    pub failures: Vec<SegmentDownloadError>,
    /// Number of segments the run was given
    pub total_segments: usize,
}

impl DownloadReport {
    /// Number of segments downloaded
    pub fn downloaded(&self) -> usize {
        self.files.len()
    }

    /// Whether every segment was downloaded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.files.len() == self.total_segments
    }

    /// Fail with [`Error::EmptyResult`] when nothing was downloaded
    pub fn require_any(self) -> Result<Self> {
        if self.files.is_empty() {
            Err(Error::EmptyResult {
                total: self.total_segments,
            })
        } else {
            Ok(self)
        }
    }
}

/// Runs segment fetches with at most `max_concurrent` in flight.
pub struct ConcurrentDownloadEngine {
    fetcher: SegmentFetcher,
    reporter: Option<SessionReporter>,
}

impl ConcurrentDownloadEngine {
    /// Create an engine around `fetcher`
    pub fn new(fetcher: SegmentFetcher) -> Self {
        Self {
            fetcher,
            reporter: None,
        }
    }

    /// Report progress for a session
    pub fn with_reporter(mut self, reporter: SessionReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Download every segment, keeping at most `max_concurrent` fetches in flight.
    ///
    /// A segment that exhausts its retries is logged and left out of
    /// [`DownloadReport::files`]; it never aborts the batch. A cap of zero is
    /// treated as one.
    pub async fn run(
        &self,
        segments: Vec<SegmentDescriptor>,
        max_concurrent: usize,
    ) -> DownloadReport {
        let total = segments.len();
        let cap = max_concurrent.max(1);

        let mut pending: VecDeque<DownloadTask> = segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| DownloadTask::new(index, segment))
            .collect();
        let mut in_flight = FuturesUnordered::new();
        let mut completed: BTreeMap<usize, PathBuf> = BTreeMap::new();
        let mut failures: Vec<SegmentDownloadError> = Vec::new();

        tracing::info!(
            segments = total,
            max_concurrent = cap,
            "Starting segment downloads"
        );

        while !pending.is_empty() || !in_flight.is_empty() {
            while in_flight.len() < cap {
                let Some(mut task) = pending.pop_front() else {
                    break;
                };
                let fetcher = &self.fetcher;
                let reporter = self.reporter.as_ref();
                in_flight.push(async move {
                    let result = fetcher.fetch(&mut task, reporter).await;
                    (task.index, result)
                });
            }

            let Some((index, result)) = in_flight.next().await else {
                continue;
            };
            let settled = completed.len() + failures.len() + 1;

            match result {
                Ok(path) => {
                    tracing::info!(
                        segment_index = index,
                        settled = settled,
                        total = total,
                        "Segment {}/{} downloaded",
                        index + 1,
                        total
                    );
                    completed.insert(index, path);
                    if let Some(reporter) = &self.reporter {
                        reporter.segment_completed(index);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        segment_index = index,
                        error = %e,
                        "Segment download failed permanently"
                    );
                    failures.push(e.clone());
                    if let Some(reporter) = &self.reporter {
                        reporter.segment_failed(&e);
                    }
                }
            }

            if let Some(reporter) = &self.reporter {
                reporter
                    .segment_settled(completed.len(), failures.len(), total)
                    .await;
            }
        }

        failures.sort_by_key(|f| f.index);
        let files: Vec<PathBuf> = completed.into_values().collect();

        tracing::info!(
            downloaded = files.len(),
            failed = failures.len(),
            total = total,
            "Segment downloads finished"
        );

        DownloadReport {
            files,
            failures,
            total_segments: total,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::staging::segment_file_name;
    use crate::test_helpers::{ScriptedTransport, SegmentReply, segments};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine(
        transport: Arc<ScriptedTransport>,
        dir: &Path,
        attempts: u32,
    ) -> ConcurrentDownloadEngine {
        let fetcher = SegmentFetcher::new(
            transport,
            dir,
            RetryConfig {
                retry_attempts: attempts,
                base_delay: Duration::from_millis(2),
                jitter: false,
            },
            Duration::from_secs(5),
        );
        ConcurrentDownloadEngine::new(fetcher)
    }

    /// Later segments finish first: segment i sleeps (n - i) * step
    fn reversed_jitter(n: usize, step_ms: u64) -> ScriptedTransport {
        (0..n).fold(ScriptedTransport::new(), |t, i| {
            t.segment(
                &format!("http://cdn.test/seg{i}.ts"),
                vec![SegmentReply::ok_after(
                    format!("body{i}").as_bytes(),
                    Duration::from_millis((n - i) as u64 * step_ms),
                )],
            )
        })
    }

    /// Pseudo-random per-segment delays
    fn scrambled_jitter(n: usize) -> ScriptedTransport {
        (0..n).fold(ScriptedTransport::new(), |t, i| {
            let delay = ((i * 7919) % 13) as u64;
            t.segment(
                &format!("http://cdn.test/seg{i}.ts"),
                vec![SegmentReply::ok_after(
                    format!("body{i}").as_bytes(),
                    Duration::from_millis(delay),
                )],
            )
        })
    }

    fn expected_files(dir: &Path, indices: impl IntoIterator<Item = usize>) -> Vec<PathBuf> {
        indices
            .into_iter()
            .map(|i| dir.join(segment_file_name(i)))
            .collect()
    }

    #[tokio::test]
    async fn results_follow_playlist_order_despite_reverse_completion() {
        let n = 6;
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(reversed_jitter(n, 15));
        let engine = engine(transport.clone(), dir.path(), 1);

        let report = engine.run(segments(n), n).await;

        assert_eq!(report.files, expected_files(dir.path(), 0..n));
        assert!(report.is_complete());
        for (i, file) in report.files.iter().enumerate() {
            assert_eq!(std::fs::read(file).unwrap(), format!("body{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn every_concurrency_cap_preserves_order() {
        let n = 8;
        for cap in 1..=n {
            let dir = tempfile::tempdir().unwrap();
            let transport = Arc::new(scrambled_jitter(n));
            let engine = engine(transport.clone(), dir.path(), 1);

            let report = engine.run(segments(n), cap).await;

            assert_eq!(report.files.len(), n, "cap {cap}");
            assert_eq!(report.files, expected_files(dir.path(), 0..n), "cap {cap}");
            assert!(
                transport.peak_in_flight() <= cap,
                "cap {cap} exceeded: {}",
                transport.peak_in_flight()
            );
        }
    }

    #[tokio::test]
    async fn concurrency_cap_is_reached_but_not_exceeded() {
        let n = 10;
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new((0..n).fold(ScriptedTransport::new(), |t, i| {
            t.segment(
                &format!("http://cdn.test/seg{i}.ts"),
                vec![SegmentReply::ok_after(b"x", Duration::from_millis(20))],
            )
        }));
        let engine = engine(transport.clone(), dir.path(), 1);

        let _report = engine.run(segments(n), 3).await;

        assert_eq!(transport.peak_in_flight(), 3);
    }

    #[tokio::test]
    async fn zero_cap_is_treated_as_one() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(scrambled_jitter(3));
        let engine = engine(transport.clone(), dir.path(), 1);

        let report = engine.run(segments(3), 0).await;

        assert_eq!(report.downloaded(), 3);
        assert_eq!(transport.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_is_skipped_not_padded() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .segment("http://cdn.test/seg0.ts", vec![SegmentReply::ok(b"0")])
                .segment("http://cdn.test/seg1.ts", vec![SegmentReply::status(404)])
                .segment("http://cdn.test/seg2.ts", vec![SegmentReply::ok(b"2")])
                .segment("http://cdn.test/seg3.ts", vec![SegmentReply::status(500)]),
        );
        let engine = engine(transport.clone(), dir.path(), 2);

        let report = engine.run(segments(4), 2).await;

        assert_eq!(report.files, expected_files(dir.path(), [0, 2]));
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[1].index, 3);
        assert_eq!(report.failures[0].attempts, 2);
        assert!(!report.is_complete());
        assert_eq!(transport.request_count("http://cdn.test/seg1.ts"), 2);
    }

    #[tokio::test]
    async fn failed_segments_never_report_completion() {
        use crate::session::{SessionRegistry, SessionReporter};
        use crate::types::{Event, SessionId};

        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .segment("http://cdn.test/seg0.ts", vec![SegmentReply::status(404)])
                .segment("http://cdn.test/seg1.ts", vec![SegmentReply::ok(b"1")])
                .segment("http://cdn.test/seg2.ts", vec![SegmentReply::status(404)]),
        );
        let (tx, mut rx) = tokio::sync::broadcast::channel(64);
        let reporter = SessionReporter::new(SessionId(1), tx, SessionRegistry::new());
        let engine = engine(transport, dir.path(), 1).with_reporter(reporter);

        let report = engine.run(segments(3), 3).await;
        assert_eq!(report.downloaded(), 1);

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut last_progress = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::SegmentCompleted { index, .. } => completed.push(index),
                Event::SegmentFailed { index, .. } => failed.push(index),
                Event::SegmentProgress {
                    completed,
                    failed,
                    total,
                    percent,
                    ..
                } => last_progress = Some((completed, failed, total, percent)),
                _ => {}
            }
        }
        failed.sort();

        assert_eq!(completed, vec![1]);
        assert_eq!(failed, vec![0, 2]);
        let (done, lost, total, percent) = last_progress.unwrap();
        assert_eq!((done, lost, total), (1, 2, 3));
        assert!((percent - 100.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn retried_segment_appears_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .segment("http://cdn.test/seg0.ts", vec![SegmentReply::ok(b"0")])
                .segment(
                    "http://cdn.test/seg1.ts",
                    vec![
                        SegmentReply::status(503),
                        SegmentReply::status(503),
                        SegmentReply::ok(b"1"),
                    ],
                )
                .segment("http://cdn.test/seg2.ts", vec![SegmentReply::ok(b"2")]),
        );
        let engine = engine(transport.clone(), dir.path(), 3);

        let report = engine.run(segments(3), 3).await;

        assert_eq!(report.files, expected_files(dir.path(), 0..3));
        assert!(report.failures.is_empty());
        assert_eq!(transport.request_count("http://cdn.test/seg1.ts"), 3);
    }

    #[tokio::test]
    async fn all_failures_complete_the_batch_with_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(transport, dir.path(), 2);

        let report = engine.run(segments(4), 2).await;

        assert!(report.files.is_empty());
        assert_eq!(report.failures.len(), 4);
        let err = report.require_any().unwrap_err();
        assert!(matches!(err, Error::EmptyResult { total: 4 }));
    }

    #[tokio::test]
    async fn empty_segment_list_yields_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(ScriptedTransport::new()), dir.path(), 1);

        let report = engine.run(Vec::new(), 4).await;

        assert_eq!(report.total_segments, 0);
        assert!(report.files.is_empty());
        assert!(report.failures.is_empty());
    }
}
