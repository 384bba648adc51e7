//! Shared test fixtures: an in-memory [`HttpTransport`] with scripted responses.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::transport::HttpTransport;
use crate::types::SegmentDescriptor;

/// Scripted reply to one segment request
#[derive(Clone, Debug)]
pub(crate) enum SegmentReply {
    /// Write `body` after sleeping `delay`
    Ok { body: Vec<u8>, delay: Duration },
    /// Fail with this HTTP status after sleeping `delay`
    Status { status: u16, delay: Duration },
    /// Fail with a local I/O error of this kind
    Io(std::io::ErrorKind),
}

impl SegmentReply {
    pub(crate) fn ok(body: &[u8]) -> Self {
        SegmentReply::Ok {
            body: body.to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn ok_after(body: &[u8], delay: Duration) -> Self {
        SegmentReply::Ok {
            body: body.to_vec(),
            delay,
        }
    }

    pub(crate) fn io(kind: std::io::ErrorKind) -> Self {
        SegmentReply::Io(kind)
    }

    pub(crate) fn status(status: u16) -> Self {
        SegmentReply::Status {
            status,
            delay: Duration::ZERO,
        }
    }
}

/// In-memory transport.
///
/// Manifests are served from a map; segment URLs pop replies from a per-URL
/// queue, repeating the last reply once the queue has a single entry left.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    manifests: Mutex<HashMap<String, std::result::Result<String, u16>>>,
    segments: Mutex<HashMap<String, VecDeque<SegmentReply>>>,
    requests: Mutex<Vec<String>>,
    in_flight: Mutex<(usize, usize)>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn manifest(self, url: &str, body: &str) -> Self {
        self.manifests
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub(crate) fn manifest_status(self, url: &str, status: u16) -> Self {
        self.manifests
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(status));
        self
    }

    pub(crate) fn segment(self, url: &str, replies: Vec<SegmentReply>) -> Self {
        self.segments
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    /// Every URL requested, in request order
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests made for `url`
    pub(crate) fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    /// Highest number of segment requests observed in flight at once
    pub(crate) fn peak_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }

    fn next_segment_reply(&self, url: &str) -> Option<SegmentReply> {
        let mut segments = self.segments.lock().unwrap();
        let queue = segments.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn enter(&self) {
        let mut guard = self.in_flight.lock().unwrap();
        guard.0 += 1;
        guard.1 = guard.1.max(guard.0);
    }

    fn leave(&self) {
        self.in_flight.lock().unwrap().0 -= 1;
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        let reply = self.manifests.lock().unwrap().get(url).cloned();
        match reply {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(Error::HttpStatus {
                url: url.to_string(),
                status,
            }),
            None => Err(Error::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn download_to(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
        self.requests.lock().unwrap().push(url.to_string());
        let reply = self.next_segment_reply(url).unwrap_or(SegmentReply::status(404));

        self.enter();
        let result = match reply {
            SegmentReply::Ok { body, delay } => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(Error::Timeout {
                        url: url.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                } else {
                    tokio::time::sleep(delay).await;
                    match tokio::fs::write(dest, &body).await {
                        Ok(()) => Ok(body.len() as u64),
                        Err(e) => Err(Error::Io(e)),
                    }
                }
            }
            SegmentReply::Io(kind) => Err(Error::Io(std::io::Error::from(kind))),
            SegmentReply::Status { status, delay } => {
                tokio::time::sleep(delay).await;
                Err(Error::HttpStatus {
                    url: url.to_string(),
                    status,
                })
            }
        };
        self.leave();
        result
    }
}

pub(crate) fn segment(duration: f64, url: &str) -> SegmentDescriptor {
    SegmentDescriptor {
        duration,
        url: url.to_string(),
    }
}

/// `count` segments at `http://cdn.test/seg{i}.ts`
pub(crate) fn segments(count: usize) -> Vec<SegmentDescriptor> {
    (0..count)
        .map(|i| segment(2.0, &format!("http://cdn.test/seg{i}.ts")))
        .collect()
}
