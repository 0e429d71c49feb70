//! Inline LLM executor: chunk bytes embedded directly in the request.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Executor, ExecutorInput, ExecutorOutput, LLM_CONFIDENCE};
use crate::error::ExtractError;
use crate::llm::pricing::llm_cost;
use crate::llm::prompts::{document_prompt, section_prompt};
use crate::llm::LlmService;
use crate::models::TokenUsage;

pub struct InlineLlmExecutor {
    service: Arc<dyn LlmService>,
}

impl InlineLlmExecutor {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Executor for InlineLlmExecutor {
    fn name(&self) -> &'static str {
        "inline-llm"
    }

    async fn execute(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExtractError> {
        let prompt = match (input.pages, input.total_pages) {
            (Some(pages), Some(total)) => section_prompt(pages, total, input.language_hints),
            _ => document_prompt(input.language_hints),
        };

        let response = self
            .service
            .generate_inline(input.bytes, input.format.mime_type(), &prompt)
            .await?;

        let usage = response
            .usage
            .unwrap_or_else(|| TokenUsage::new(0, TokenUsage::estimate_output(&response.text)));
        debug!(
            model = %response.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Inline extraction complete"
        );

        Ok(ExecutorOutput {
            cost: llm_cost(&response.model, usage),
            page_count: input.expected_pages().unwrap_or(0),
            confidence: LLM_CONFIDENCE,
            tokens: Some(usage),
            text: response.text,
        })
    }
}
