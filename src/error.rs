//! Error taxonomy for the extraction pipeline.
//!
//! Every error knows its [`FailureClass`], which is what the retry wrapper and
//! the fallback chain act on. Callers never match on error variants to decide
//! control flow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::Strategy;

/// How the pipeline should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying the same call after a backoff.
    Transient,
    /// The current strategy cannot succeed; move to the next one.
    StrategyFatal,
    /// No strategy can succeed; surface to the caller immediately.
    Terminal,
}

/// Errors returned by a remote OCR or LLM service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service}: authentication failed ({message})")]
    Auth { service: String, message: String },

    #[error("{service}: quota exceeded, retry after {retry_after_secs:?}s")]
    QuotaExceeded {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{service}: payload too large ({size} bytes)")]
    PayloadTooLarge { service: String, size: usize },

    #[error("{service}: unsupported format {mime_type}")]
    UnsupportedFormat { service: String, mime_type: String },

    #[error("{service}: unexpected response: {message}")]
    BadResponse { service: String, message: String },

    #[error("{service}: request timed out")]
    Timeout { service: String },

    #[error("{service}: unavailable (HTTP {status})")]
    Unavailable { service: String, status: u16 },

    #[error("{service}: network error: {message}")]
    Network { service: String, message: String },

    #[error("{service}: not configured: {hint}")]
    NotConfigured { service: String, hint: String },
}

impl ServiceError {
    /// Map an HTTP status (with the response body for context) to a service error.
    pub fn from_status(service: &str, status: u16, body: &str, payload_size: usize) -> Self {
        let service = service.to_string();
        let message = truncate_body(body);
        match status {
            401 | 403 => ServiceError::Auth { service, message },
            408 | 504 => ServiceError::Timeout { service },
            413 => ServiceError::PayloadTooLarge {
                service,
                size: payload_size,
            },
            415 => ServiceError::UnsupportedFormat {
                service,
                mime_type: message,
            },
            429 => ServiceError::QuotaExceeded {
                service,
                retry_after_secs: None,
            },
            500..=599 => ServiceError::Unavailable { service, status },
            _ => ServiceError::BadResponse {
                service,
                message: format!("HTTP {}: {}", status, message),
            },
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_reqwest(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout {
                service: service.to_string(),
            }
        } else if err.is_decode() {
            ServiceError::BadResponse {
                service: service.to_string(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Network {
                service: service.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            ServiceError::Timeout { .. }
            | ServiceError::Unavailable { .. }
            | ServiceError::Network { .. } => FailureClass::Transient,
            ServiceError::Auth { .. }
            | ServiceError::QuotaExceeded { .. }
            | ServiceError::PayloadTooLarge { .. }
            | ServiceError::UnsupportedFormat { .. }
            | ServiceError::BadResponse { .. }
            | ServiceError::NotConfigured { .. } => FailureClass::StrategyFatal,
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// One failed strategy attempt, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub error: String,
}

/// Errors produced by the extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Document too large: {size} bytes exceeds {limit} bytes{}", if *.overridable { " (override required)" } else { "" })]
    OversizedDocument {
        size: u64,
        limit: u64,
        /// Whether an explicit override would admit the document.
        overridable: bool,
    },

    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("Unsupported document type: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("All {chunks} chunks failed; last error: {last}")]
    AllChunksFailed {
        chunks: usize,
        last: Box<ExtractError>,
    },

    #[error("All strategies failed ({}); last error: {last}", format_attempts(.attempts))]
    AllStrategiesFailed {
        attempts: Vec<StrategyAttempt>,
        last: Box<ExtractError>,
    },

    #[error("Processing timed out for {document_id} after {idle_secs}s without progress")]
    ProcessingTimeout { document_id: String, idle_secs: u64 },

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Document {0} is already being tracked")]
    DuplicateDocument(String),

    #[error("Upload rate limited, retry after {retry_after_secs}s")]
    UploadRateLimited { retry_after_secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.strategy.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ExtractError {
    pub fn class(&self) -> FailureClass {
        match self {
            ExtractError::Service(e) => e.class(),
            ExtractError::AllChunksFailed { .. } => FailureClass::StrategyFatal,
            ExtractError::Io(_) => FailureClass::StrategyFatal,
            ExtractError::OversizedDocument { .. }
            | ExtractError::UnreadableDocument(_)
            | ExtractError::UnsupportedFormat(_)
            | ExtractError::AllStrategiesFailed { .. }
            | ExtractError::ProcessingTimeout { .. }
            | ExtractError::InvalidBatch(_)
            | ExtractError::DuplicateDocument(_)
            | ExtractError::UploadRateLimited { .. }
            | ExtractError::Config(_) => FailureClass::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// The serializable error class reported through `PipelineStatus`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::OversizedDocument { .. } => ErrorKind::OversizedDocument,
            ExtractError::UnreadableDocument(_) => ErrorKind::UnreadableDocument,
            ExtractError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ExtractError::Service(e) if e.class() == FailureClass::Transient => {
                ErrorKind::Transient
            }
            ExtractError::Service(_) | ExtractError::AllChunksFailed { .. } => {
                ErrorKind::StrategyFatal
            }
            ExtractError::AllStrategiesFailed { .. } => ErrorKind::AllStrategiesFailed,
            ExtractError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            ExtractError::InvalidBatch(_)
            | ExtractError::DuplicateDocument(_)
            | ExtractError::UploadRateLimited { .. }
            | ExtractError::Config(_)
            | ExtractError::Io(_) => ErrorKind::Rejected,
        }
    }
}

/// Error class exposed to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OversizedDocument,
    UnreadableDocument,
    UnsupportedFormat,
    StrategyFatal,
    Transient,
    AllStrategiesFailed,
    ProcessingTimeout,
    Rejected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::OversizedDocument => "oversized_document",
            ErrorKind::UnreadableDocument => "unreadable_document",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::StrategyFatal => "strategy_fatal",
            ErrorKind::Transient => "transient",
            ErrorKind::AllStrategiesFailed => "all_strategies_failed",
            ErrorKind::ProcessingTimeout => "processing_timeout",
            ErrorKind::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
