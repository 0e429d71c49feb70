//! Extraction strategy executors.
//!
//! Every executor turns one byte payload (a whole document or a chunk) into
//! text plus metadata. Services are injected at construction; executors hold
//! no global state.

mod inline_llm;
mod managed_file;
mod ocr;

pub use inline_llm::InlineLlmExecutor;
pub use managed_file::ManagedFileExecutor;
pub use ocr::OcrExecutor;

use std::sync::Arc;

use async_trait::async_trait;

use crate::chunker::PageRange;
use crate::error::ExtractError;
use crate::models::{CostEstimate, DocumentFormat, TokenUsage};
use crate::retry::RetryPolicy;

/// Confidence reported for LLM extraction, which has no native score.
pub const LLM_CONFIDENCE: f64 = 0.95;

/// Payload for one executor call.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorInput<'a> {
    pub bytes: &'a [u8],
    pub format: DocumentFormat,
    /// Page range this payload covers; `None` for a whole document.
    pub pages: Option<PageRange>,
    /// Page count of the whole document, when known.
    pub total_pages: Option<u32>,
    pub language_hints: &'a [String],
    pub display_name: &'a str,
}

impl<'a> ExecutorInput<'a> {
    pub fn whole(
        bytes: &'a [u8],
        format: DocumentFormat,
        language_hints: &'a [String],
        display_name: &'a str,
    ) -> Self {
        Self {
            bytes,
            format,
            pages: None,
            total_pages: None,
            language_hints,
            display_name,
        }
    }

    pub fn with_pages(mut self, pages: PageRange, total_pages: u32) -> Self {
        self.pages = Some(pages);
        self.total_pages = Some(total_pages);
        self
    }

    pub fn with_total_pages(mut self, total_pages: Option<u32>) -> Self {
        self.total_pages = total_pages;
        self
    }

    /// Page count this payload is expected to hold.
    pub fn expected_pages(&self) -> Option<u32> {
        self.pages.map(|p| p.len()).or(self.total_pages)
    }
}

/// What an executor produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOutput {
    pub text: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub page_count: u32,
    pub tokens: Option<TokenUsage>,
    pub cost: CostEstimate,
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExtractError>;
}

/// An executor whose every call goes through the retry wrapper.
pub struct RetryingExecutor {
    inner: Arc<dyn Executor>,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(inner: Arc<dyn Executor>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Executor for RetryingExecutor {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn execute(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExtractError> {
        let label = match input.pages {
            Some(pages) => format!("{} {}", self.inner.name(), pages),
            None => self.inner.name().to_string(),
        };
        self.policy
            .run(&label, move |_attempt| self.inner.execute(input))
            .await
    }
}
