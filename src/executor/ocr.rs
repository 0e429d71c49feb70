//! OCR executor for the direct and chunked OCR strategies.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Executor, ExecutorInput, ExecutorOutput};
use crate::error::ExtractError;
use crate::models::CostEstimate;
use crate::ocr::{OcrRequest, OcrService};

pub struct OcrExecutor {
    service: Arc<dyn OcrService>,
    cost_per_page_usd: f64,
}

impl OcrExecutor {
    pub fn new(service: Arc<dyn OcrService>, cost_per_page_usd: f64) -> Self {
        Self {
            service,
            cost_per_page_usd,
        }
    }
}

#[async_trait]
impl Executor for OcrExecutor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn execute(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExtractError> {
        let response = self
            .service
            .recognize(OcrRequest {
                bytes: input.bytes,
                mime_type: input.format.mime_type(),
                language_hints: input.language_hints,
            })
            .await?;

        let page_count = if response.page_count > 0 {
            response.page_count
        } else {
            input.expected_pages().unwrap_or(0)
        };
        let confidence = response.mean_confidence();

        debug!(
            service = self.service.name(),
            pages = page_count,
            confidence,
            chars = response.text.len(),
            "OCR call complete"
        );

        Ok(ExecutorOutput {
            text: response.text,
            confidence,
            page_count,
            tokens: None,
            cost: CostEstimate::ocr(page_count, self.cost_per_page_usd),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::DocumentFormat;
    use crate::ocr::OcrResponse;

    struct StaticOcr {
        response: OcrResponse,
    }

    #[async_trait]
    impl OcrService for StaticOcr {
        fn name(&self) -> &'static str {
            "static"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        async fn recognize(&self, _request: OcrRequest<'_>) -> Result<OcrResponse, ServiceError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_averages_page_confidences() {
        let executor = OcrExecutor::new(
            Arc::new(StaticOcr {
                response: OcrResponse {
                    text: "text".into(),
                    page_confidences: vec![1.0, 0.8, 0.6],
                    page_count: 3,
                },
            }),
            0.01,
        );
        let output = executor
            .execute(&ExecutorInput::whole(b"%PDF", DocumentFormat::Pdf, &[], "doc"))
            .await
            .unwrap();
        assert!((output.confidence - 0.8).abs() < 1e-9);
        assert_eq!(output.page_count, 3);
        assert!((output.cost.usd - 0.03).abs() < 1e-9);
        assert!(output.tokens.is_none());
    }

    #[tokio::test]
    async fn test_page_count_falls_back_to_range() {
        let executor = OcrExecutor::new(
            Arc::new(StaticOcr {
                response: OcrResponse {
                    text: "text".into(),
                    page_confidences: vec![],
                    page_count: 0,
                },
            }),
            0.0,
        );
        let input = ExecutorInput::whole(b"%PDF", DocumentFormat::Pdf, &[], "doc")
            .with_pages(crate::chunker::PageRange::new(10, 25), 40);
        let output = executor.execute(&input).await.unwrap();
        assert_eq!(output.page_count, 15);
        assert_eq!(output.confidence, 0.0);
    }
}
