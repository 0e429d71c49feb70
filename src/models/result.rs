//! Per-chunk and per-document extraction outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::request::DocumentFormat;
use crate::chunker::PageRange;
use crate::error::StrategyAttempt;
use crate::strategy::Strategy;

/// Token counts reported by an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Estimate output tokens from text length when the service omits them.
    pub fn estimate_output(text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

/// Estimated spend for one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd: f64,
}

impl CostEstimate {
    pub fn ocr(pages: u32, cost_per_page_usd: f64) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            usd: pages as f64 * cost_per_page_usd,
        }
    }

    pub fn llm(usage: TokenUsage, usd: f64) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            usd,
        }
    }
}

impl std::ops::Add for CostEstimate {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            usd: self.usd + other.usd,
        }
    }
}

/// Outcome of extracting a single chunk.
///
/// A failed chunk has empty text, zero confidence and an `error`, but does
/// not abort its siblings.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub index: usize,
    pub pages: PageRange,
    pub text: String,
    pub confidence: f64,
    pub pages_processed: u32,
    pub tokens: Option<TokenUsage>,
    pub cost: CostEstimate,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ChunkResult {
    pub fn failed(index: usize, pages: PageRange, elapsed: Duration, error: String) -> Self {
        Self {
            index,
            pages,
            text: String::new(),
            confidence: 0.0,
            pages_processed: 0,
            tokens: None,
            cost: CostEstimate::default(),
            elapsed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether this chunk contributes weight to the aggregate confidence.
    pub fn has_text(&self) -> bool {
        self.is_success() && !self.text.trim().is_empty()
    }

    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            index: self.index,
            pages: self.pages.label(),
            text_chars: self.text.chars().count(),
            confidence: self.confidence,
            elapsed_ms: self.elapsed.as_millis() as u64,
            error: self.error.clone(),
        }
    }
}

/// Serializable view of a chunk for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub index: usize,
    /// 1-based inclusive page label, e.g. "1-114".
    pub pages: String,
    pub text_chars: usize,
    pub confidence: f64,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The document-level outcome. Produced exactly once per successful request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    pub content_sha256: String,
    pub text: String,
    pub confidence: f64,
    pub total_pages: u32,
    pub strategy: Strategy,
    /// Strategies that failed before `strategy` succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_strategies: Vec<StrategyAttempt>,
    pub elapsed_ms: u64,
    pub cost: CostEstimate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<String>,
}

impl ExtractionResult {
    pub fn is_partial(&self) -> bool {
        !self.failed_pages.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
