//! Pipeline stages and the pollable per-document status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ExtractError};
use crate::strategy::Strategy;

/// Observable processing phase of a document.
///
/// Declaration order is the progression order; the tracker only lets a
/// document move forward (or into `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Uploading,
    Extracting,
    Chunking,
    Embedding,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "uploading" => Some(Self::Uploading),
            "extracting" => Some(Self::Extracting),
            "chunking" => Some(Self::Chunking),
            "embedding" => Some(Self::Embedding),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Progress percentage band for this stage as `(floor, ceiling)`.
    ///
    /// Progress reported within a stage is clamped to `[floor, ceiling)`;
    /// the single-point stages return `(p, p)`. `Failed` keeps whatever
    /// progress the document had.
    pub fn progress_range(&self) -> Option<(u8, u8)> {
        match self {
            Self::Queued => Some((0, 0)),
            Self::Uploading => Some((0, 25)),
            Self::Extracting => Some((25, 50)),
            Self::Chunking => Some((50, 75)),
            Self::Embedding => Some((75, 100)),
            Self::Completed => Some((100, 100)),
            Self::Failed => None,
        }
    }

    /// Clamp a progress value into this stage's band.
    pub fn clamp_progress(&self, progress: u8) -> u8 {
        match self.progress_range() {
            Some((lo, hi)) if lo == hi => lo,
            Some((lo, hi)) => progress.clamp(lo, hi - 1),
            None => progress.min(100),
        }
    }

    /// Map a fraction in `[0, 1]` of this stage's work to a percentage.
    pub fn progress_at(&self, fraction: f64) -> u8 {
        match self.progress_range() {
            Some((lo, hi)) if hi > lo => {
                let span = (hi - lo) as f64;
                let value = lo as f64 + span * fraction.clamp(0.0, 1.0);
                self.clamp_progress(value.floor() as u8)
            }
            Some((lo, _)) => lo,
            None => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error recorded on a failed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExtractError> for StatusError {
    fn from(err: &ExtractError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Current state of one document, as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub document_id: String,
    pub stage: Stage,
    pub progress: u8,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
}

impl PipelineStatus {
    pub fn queued(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            stage: Stage::Queued,
            progress: 0,
            last_updated: Utc::now(),
            strategy: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Queued < Stage::Uploading);
        assert!(Stage::Extracting < Stage::Chunking);
        assert!(Stage::Embedding < Stage::Completed);
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(Stage::Queued.clamp_progress(40), 0);
        assert_eq!(Stage::Uploading.clamp_progress(40), 24);
        assert_eq!(Stage::Extracting.clamp_progress(10), 25);
        assert_eq!(Stage::Completed.clamp_progress(3), 100);
        assert_eq!(Stage::Failed.clamp_progress(61), 61);
    }

    #[test]
    fn test_progress_at() {
        assert_eq!(Stage::Chunking.progress_at(0.0), 50);
        assert_eq!(Stage::Chunking.progress_at(0.5), 62);
        assert_eq!(Stage::Chunking.progress_at(1.0), 74);
        assert_eq!(Stage::Extracting.progress_at(2.0), 49);
    }

    #[test]
    fn test_status_error_from_extract_error() {
        let err = ExtractError::ProcessingTimeout {
            document_id: "doc".into(),
            idle_secs: 300,
        };
        let status_error = StatusError::from(&err);
        assert_eq!(status_error.kind, ErrorKind::ProcessingTimeout);
        assert!(status_error.message.contains("300"));
    }
}
