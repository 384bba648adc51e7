//! Download session tracking.
//!
//! [`SessionRegistry`] is a table of session records keyed by [`SessionId`],
//! shared by every session of a downloader. Each session only writes its own
//! entry. [`SessionReporter`] is the handle a running session uses to publish
//! progress: it updates the registry entry and broadcasts [`Event`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};

use crate::error::{Error, Result, SegmentDownloadError};
use crate::types::{Event, SessionId, SessionInfo, SessionStatus};

/// Shared table of download sessions (cloneable - all fields are Arc-wrapped)
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionInfo>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for `url` in the `Resolving` state
    pub async fn register(&self, url: &str) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let info = SessionInfo {
            id,
            url: url.to_string(),
            status: SessionStatus::Resolving,
            created_at: now,
            updated_at: now,
        };
        self.sessions.write().await.insert(id, info);
        id
    }

    /// Set the status of session `id`
    pub async fn update(&self, id: SessionId, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let info = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        info.status = status;
        info.updated_at = Utc::now();
        Ok(())
    }

    /// Snapshot of session `id`
    pub async fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Snapshot of all sessions, oldest first
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut all: Vec<_> = self.sessions.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Remove session `id`, returning its final record
    pub async fn remove(&self, id: SessionId) -> Result<SessionInfo> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Drop every finished (complete or failed) session, returning how many were removed
    pub async fn prune_finished(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, info| !info.status.is_finished());
        before - sessions.len()
    }

    /// Drop the oldest finished sessions so at most `keep` finished records remain,
    /// returning how many were removed
    pub async fn trim_finished(&self, keep: usize) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut finished: Vec<SessionId> = sessions
            .values()
            .filter(|info| info.status.is_finished())
            .map(|info| info.id)
            .collect();
        if finished.len() <= keep {
            return 0;
        }
        finished.sort();
        let excess = finished.len() - keep;
        for id in &finished[..excess] {
            sessions.remove(id);
        }
        excess
    }
}

/// Progress publisher for one running session
#[derive(Clone)]
pub struct SessionReporter {
    session: SessionId,
    event_tx: broadcast::Sender<Event>,
    registry: SessionRegistry,
}

impl SessionReporter {
    /// Create a reporter for `session`
    pub fn new(
        session: SessionId,
        event_tx: broadcast::Sender<Event>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            session,
            event_tx,
            registry,
        }
    }

    /// The session this reporter publishes for
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Broadcast `event`; having no subscribers is not an error
    pub fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Set the session's status, logging if the record has been removed
    pub async fn set_status(&self, status: SessionStatus) {
        if let Err(e) = self.registry.update(self.session, status).await {
            tracing::debug!(session = %self.session, error = %e, "Session record missing");
        }
    }

    pub(crate) fn segment_retry(&self, index: usize, attempt: u32, error: &str) {
        self.emit(Event::SegmentRetry {
            session: self.session,
            index,
            attempt,
            error: error.to_string(),
        });
    }

    pub(crate) fn segment_failed(&self, error: &SegmentDownloadError) {
        self.emit(Event::SegmentFailed {
            session: self.session,
            index: error.index,
            error: error.last_error.clone(),
        });
    }

    pub(crate) fn segment_completed(&self, index: usize) {
        self.emit(Event::SegmentCompleted {
            session: self.session,
            index,
        });
    }

    /// Publish running totals after a segment settled
    pub(crate) async fn segment_settled(&self, completed: usize, failed: usize, total: usize) {
        let settled = completed + failed;
        let percent = if total == 0 {
            100.0
        } else {
            (settled as f32 / total as f32) * 100.0
        };
        self.emit(Event::SegmentProgress {
            session: self.session,
            completed,
            failed,
            total,
            percent,
        });
        self.set_status(SessionStatus::Downloading {
            completed,
            failed,
            total,
        })
        .await;
    }

    /// Mark the session failed and broadcast the failure
    pub async fn failed(&self, error: &Error) {
        self.set_status(SessionStatus::Failed {
            code: error.error_code().to_string(),
            error: error.to_string(),
        })
        .await;
        self.emit(Event::DownloadFailed {
            session: self.session,
            code: error.error_code().to_string(),
            error: error.to_string(),
        });
    }
}
