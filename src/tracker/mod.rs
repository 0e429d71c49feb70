//! Per-document pipeline status, advanced by the pipeline and read by pollers.
//!
//! Stage transitions are monotonic. `Failed` may be entered from any
//! non-terminal stage, and terminal statuses never change again, so a late
//! chunk result cannot resurrect a document that already timed out.
//!
//! State is in-memory and lost on restart.

mod sweeper;

pub use sweeper::SweeperHandle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::ExtractError;
use crate::models::{PipelineStatus, Stage, StatusError};
use crate::strategy::Strategy;

/// Rejected status updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("{document_id}: cannot move from {from} back to {to}")]
    StageRegression {
        document_id: String,
        from: Stage,
        to: Stage,
    },

    #[error("{document_id}: already {stage}")]
    AlreadyTerminal { document_id: String, stage: Stage },

    #[error("{document_id}: already tracked ({stage})")]
    AlreadyTracked { document_id: String, stage: Stage },
}

#[derive(Debug)]
struct TrackedDocument {
    status: watch::Sender<PipelineStatus>,
    last_activity: Instant,
    /// Inactivity window for this document.
    deadline: Duration,
}

impl TrackedDocument {
    fn snapshot(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }
}

/// Outcome of one inactivity sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Documents marked failed with `ProcessingTimeout`.
    pub timed_out: Vec<String>,
    /// Terminal documents dropped after the retention window.
    pub purged: usize,
}

/// Process-wide status map keyed by document id.
#[derive(Clone)]
pub struct StageTracker {
    documents: Arc<RwLock<HashMap<String, TrackedDocument>>>,
    config: TrackerConfig,
}

impl StageTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Start tracking a document in `Queued` with the default inactivity window.
    pub async fn begin(
        &self,
        document_id: &str,
    ) -> Result<watch::Receiver<PipelineStatus>, TrackerError> {
        self.begin_with_deadline(document_id, self.config.inactivity_timeout())
            .await
    }

    /// Start tracking a document with its own inactivity window.
    ///
    /// An id that is still tracked, live or terminal, is refused; terminal
    /// entries free their id once acknowledged or past retention. Expired
    /// terminal entries are purged here as well, so the map stays bounded
    /// without a running sweeper.
    pub async fn begin_with_deadline(
        &self,
        document_id: &str,
        deadline: Duration,
    ) -> Result<watch::Receiver<PipelineStatus>, TrackerError> {
        let now = Instant::now();
        let mut documents = self.documents.write().await;

        let purged = purge_expired(&mut documents, now, self.config.retention());
        if purged > 0 {
            debug!(purged, "Purged finished statuses");
        }

        if let Some(existing) = documents.get(document_id) {
            return Err(TrackerError::AlreadyTracked {
                document_id: document_id.to_string(),
                stage: existing.status.borrow().stage,
            });
        }

        let (tx, rx) = watch::channel(PipelineStatus::queued(document_id));
        documents.insert(
            document_id.to_string(),
            TrackedDocument {
                status: tx,
                last_activity: now,
                deadline,
            },
        );
        debug!(document_id, deadline_secs = deadline.as_secs(), "Tracking document");
        Ok(rx)
    }

    /// Move a document to `stage` with `progress`, clamped into the stage's band.
    ///
    /// Within the same stage progress never decreases. Moving to an earlier
    /// stage, or updating a terminal document, is rejected and leaves the
    /// status untouched. `Stage::Failed` is accepted from any live stage.
    pub async fn advance(
        &self,
        document_id: &str,
        stage: Stage,
        progress: u8,
    ) -> Result<PipelineStatus, TrackerError> {
        self.update(document_id, |current| {
            if stage < current.stage && stage != Stage::Failed {
                return Err(TrackerError::StageRegression {
                    document_id: document_id.to_string(),
                    from: current.stage,
                    to: stage,
                });
            }
            let clamped = stage.clamp_progress(progress);
            current.progress = if stage == current.stage || stage == Stage::Failed {
                current.progress.max(clamped)
            } else {
                clamped
            };
            current.stage = stage;
            Ok(())
        })
        .await
    }

    /// Record the strategy currently being attempted.
    pub async fn set_strategy(
        &self,
        document_id: &str,
        strategy: Strategy,
    ) -> Result<PipelineStatus, TrackerError> {
        self.update(document_id, |current| {
            current.strategy = Some(strategy);
            Ok(())
        })
        .await
    }

    /// Mark a document failed. The first terminal transition wins.
    pub async fn fail(
        &self,
        document_id: &str,
        error: &ExtractError,
    ) -> Result<PipelineStatus, TrackerError> {
        let status = self
            .update(document_id, |current| {
                current.stage = Stage::Failed;
                current.error = Some(StatusError::from(error));
                Ok(())
            })
            .await?;
        warn!(document_id, kind = %error.kind(), "Document failed: {}", error);
        Ok(status)
    }

    pub async fn complete(&self, document_id: &str) -> Result<PipelineStatus, TrackerError> {
        let status = self.advance(document_id, Stage::Completed, 100).await?;
        info!(document_id, "Document completed");
        Ok(status)
    }

    pub async fn status(&self, document_id: &str) -> Option<PipelineStatus> {
        let documents = self.documents.read().await;
        documents.get(document_id).map(TrackedDocument::snapshot)
    }

    /// Watch a document's status. Each accepted update is published.
    pub async fn subscribe(&self, document_id: &str) -> Option<watch::Receiver<PipelineStatus>> {
        let documents = self.documents.read().await;
        documents.get(document_id).map(|doc| doc.status.subscribe())
    }

    /// Drop a terminal status the caller has seen. Returns false for
    /// unknown or still-running documents.
    pub async fn acknowledge(&self, document_id: &str) -> bool {
        let mut documents = self.documents.write().await;
        let terminal = documents
            .get(document_id)
            .map(|doc| doc.status.borrow().is_terminal())
            .unwrap_or(false);
        if terminal {
            documents.remove(document_id);
        }
        terminal
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Fail live documents idle past their window and purge terminal ones
    /// idle past the retention window, as of `now`.
    pub async fn sweep_once(&self, now: Instant) -> SweepReport {
        let retention = self.config.retention();
        let mut report = SweepReport::default();
        let mut documents = self.documents.write().await;

        for (document_id, doc) in documents.iter_mut() {
            if doc.status.borrow().is_terminal() {
                continue;
            }
            let idle = now.saturating_duration_since(doc.last_activity);
            if idle < doc.deadline {
                continue;
            }
            let error = ExtractError::ProcessingTimeout {
                document_id: document_id.clone(),
                idle_secs: idle.as_secs(),
            };
            warn!(document_id = %document_id, idle_secs = idle.as_secs(), "No progress, marking failed");
            doc.status.send_modify(|status| {
                status.stage = Stage::Failed;
                status.error = Some(StatusError::from(&error));
                status.last_updated = Utc::now();
            });
            doc.last_activity = now;
            report.timed_out.push(document_id.clone());
        }

        report.purged = purge_expired(&mut documents, now, retention);
        if report.purged > 0 {
            debug!(purged = report.purged, "Purged finished statuses");
        }

        report
    }

    /// Run [`sweep_once`](Self::sweep_once) on the configured interval until
    /// the handle is shut down.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.spawn_sweeper_every(self.config.sweep_interval())
    }

    pub fn spawn_sweeper_every(&self, interval: Duration) -> SweeperHandle {
        SweeperHandle::spawn(self.clone(), interval)
    }

    async fn update<F>(&self, document_id: &str, apply: F) -> Result<PipelineStatus, TrackerError>
    where
        F: FnOnce(&mut PipelineStatus) -> Result<(), TrackerError>,
    {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(document_id)
            .ok_or_else(|| TrackerError::UnknownDocument(document_id.to_string()))?;

        let mut next = doc.snapshot();
        if next.is_terminal() {
            return Err(TrackerError::AlreadyTerminal {
                document_id: document_id.to_string(),
                stage: next.stage,
            });
        }
        apply(&mut next)?;
        next.last_updated = Utc::now();

        doc.last_activity = Instant::now();
        doc.status.send_replace(next.clone());
        debug!(document_id, stage = %next.stage, progress = next.progress, "Status updated");
        Ok(next)
    }
}

/// Drop terminal entries idle at least `retention` as of `now`.
fn purge_expired(
    documents: &mut HashMap<String, TrackedDocument>,
    now: Instant,
    retention: Duration,
) -> usize {
    let before = documents.len();
    documents.retain(|_, doc| {
        !(doc.status.borrow().is_terminal()
            && now.saturating_duration_since(doc.last_activity) >= retention)
    });
    before - documents.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn tracker() -> StageTracker {
        StageTracker::new(TrackerConfig::default())
    }

    #[tokio::test]
    async fn test_monotonic_stages() {
        let tracker = tracker();
        let mut rx = tracker.begin("doc").await.unwrap();

        tracker.advance("doc", Stage::Uploading, 10).await.unwrap();
        tracker.advance("doc", Stage::Extracting, 30).await.unwrap();

        let err = tracker
            .advance("doc", Stage::Uploading, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::StageRegression { .. }));

        let status = tracker.status("doc").await.unwrap();
        assert_eq!(status.stage, Stage::Extracting);
        assert_eq!(status.progress, 30);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().stage, Stage::Extracting);
    }

    #[tokio::test]
    async fn test_progress_clamped_and_non_decreasing() {
        let tracker = tracker();
        tracker.begin("doc").await.unwrap();

        let status = tracker.advance("doc", Stage::Chunking, 10).await.unwrap();
        assert_eq!(status.progress, 50);
        let status = tracker.advance("doc", Stage::Chunking, 70).await.unwrap();
        assert_eq!(status.progress, 70);
        let status = tracker.advance("doc", Stage::Chunking, 60).await.unwrap();
        assert_eq!(status.progress, 70);
        let status = tracker.advance("doc", Stage::Chunking, 99).await.unwrap();
        assert_eq!(status.progress, 74);
    }

    #[tokio::test]
    async fn test_observed_sequence_is_non_decreasing() {
        let tracker = tracker();
        tracker.begin("doc").await.unwrap();

        let updates = [
            Stage::Uploading,
            Stage::Queued,
            Stage::Chunking,
            Stage::Extracting,
            Stage::Embedding,
            Stage::Chunking,
            Stage::Completed,
            Stage::Embedding,
        ];
        let mut observed = vec![Stage::Queued];
        for stage in updates {
            if let Ok(status) = tracker.advance("doc", stage, 0).await {
                observed.push(status.stage);
            }
        }
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(observed.last(), Some(&Stage::Completed));
    }

    #[tokio::test]
    async fn test_failed_from_any_stage_is_terminal() {
        let tracker = tracker();
        tracker.begin("doc").await.unwrap();
        tracker.advance("doc", Stage::Chunking, 60).await.unwrap();

        let err = ExtractError::UnreadableDocument("bad xref".into());
        let status = tracker.fail("doc", &err).await.unwrap();
        assert_eq!(status.stage, Stage::Failed);
        assert_eq!(status.progress, 60);
        assert_eq!(
            status.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::UnreadableDocument)
        );

        let late = tracker.advance("doc", Stage::Completed, 100).await;
        assert!(matches!(late, Err(TrackerError::AlreadyTerminal { .. })));
        assert_eq!(tracker.status("doc").await.unwrap().stage, Stage::Failed);

        let second = tracker
            .fail("doc", &ExtractError::Config("other".into()))
            .await;
        assert!(second.is_err());
        assert_eq!(
            tracker.status("doc").await.unwrap().error.unwrap().kind,
            ErrorKind::UnreadableDocument
        );
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let tracker = tracker();
        let err = tracker
            .advance("missing", Stage::Uploading, 0)
            .await
            .unwrap_err();
        assert_eq!(err, TrackerError::UnknownDocument("missing".into()));
        assert!(tracker.status("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_times_out_idle_document() {
        let tracker = tracker();
        tracker
            .begin_with_deadline("slow", Duration::from_secs(300))
            .await
            .unwrap();
        tracker
            .begin_with_deadline("fast", Duration::from_secs(900))
            .await
            .unwrap();

        let report = tracker
            .sweep_once(Instant::now() + Duration::from_secs(301))
            .await;
        assert_eq!(report.timed_out, vec!["slow".to_string()]);

        let status = tracker.status("slow").await.unwrap();
        assert_eq!(status.stage, Stage::Failed);
        assert_eq!(
            status.error.map(|e| e.kind),
            Some(ErrorKind::ProcessingTimeout)
        );
        assert_eq!(tracker.status("fast").await.unwrap().stage, Stage::Queued);

        // A chunk finishing after the timeout does not revive the document.
        assert!(tracker.advance("slow", Stage::Chunking, 70).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_purges_after_retention() {
        let tracker = tracker();
        tracker.begin("done").await.unwrap();
        tracker.complete("done").await.unwrap();

        let report = tracker.sweep_once(Instant::now()).await;
        assert_eq!(report.purged, 0);

        let report = tracker
            .sweep_once(Instant::now() + Duration::from_secs(3601))
            .await;
        assert_eq!(report.purged, 1);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_acknowledge_only_terminal() {
        let tracker = tracker();
        tracker.begin("doc").await.unwrap();
        assert!(!tracker.acknowledge("doc").await);
        tracker.complete("doc").await.unwrap();
        assert!(tracker.acknowledge("doc").await);
        assert!(tracker.status("doc").await.is_none());
    }

    #[tokio::test]
    async fn test_begin_refuses_live_document() {
        let tracker = tracker();
        let mut rx = tracker.begin("doc").await.unwrap();
        tracker.advance("doc", Stage::Chunking, 60).await.unwrap();

        let err = tracker.begin("doc").await.unwrap_err();
        assert_eq!(
            err,
            TrackerError::AlreadyTracked {
                document_id: "doc".into(),
                stage: Stage::Chunking,
            }
        );

        let status = tracker.status("doc").await.unwrap();
        assert_eq!(status.stage, Stage::Chunking);
        assert_eq!(status.progress, 60);

        // The first receiver still hears later updates.
        tracker
            .fail("doc", &ExtractError::UnreadableDocument("x".into()))
            .await
            .unwrap();
        assert!(rx.borrow_and_update().is_failed());
    }

    #[tokio::test]
    async fn test_begin_refuses_terminal_until_acknowledged() {
        let tracker = tracker();
        tracker.begin("doc").await.unwrap();
        tracker.complete("doc").await.unwrap();

        let err = tracker.begin("doc").await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::AlreadyTracked {
                stage: Stage::Completed,
                ..
            }
        ));
        assert_eq!(tracker.status("doc").await.unwrap().stage, Stage::Completed);

        assert!(tracker.acknowledge("doc").await);
        tracker.begin("doc").await.unwrap();
        assert_eq!(tracker.status("doc").await.unwrap().stage, Stage::Queued);
    }

    #[tokio::test]
    async fn test_begin_purges_expired_terminal_entries() {
        let tracker = StageTracker::new(TrackerConfig {
            retention_secs: 0,
            ..TrackerConfig::default()
        });
        tracker.begin("old").await.unwrap();
        tracker.complete("old").await.unwrap();
        tracker.begin("live").await.unwrap();

        tracker.begin("new").await.unwrap();
        assert!(tracker.status("old").await.is_none());
        assert_eq!(tracker.len().await, 2);
    }
}
