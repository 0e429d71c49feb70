//! Managed-file LLM executor: upload once, extract by reference, clean up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Executor, ExecutorInput, ExecutorOutput, LLM_CONFIDENCE};
use crate::error::{ExtractError, ServiceError};
use crate::llm::pricing::llm_cost;
use crate::llm::prompts::document_prompt;
use crate::llm::{FileState, LlmService, RemoteFile};
use crate::models::TokenUsage;
use crate::retry::RetryPolicy;

/// Retries apply to the upload and generate calls separately, so a failed
/// generation reuses the uploaded file instead of sending the document again.
pub struct ManagedFileExecutor {
    service: Arc<dyn LlmService>,
    activation_timeout: Duration,
    poll_interval: Duration,
    retry: RetryPolicy,
}

impl ManagedFileExecutor {
    pub fn new(service: Arc<dyn LlmService>, activation_timeout: Duration) -> Self {
        Self {
            service,
            activation_timeout,
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until the uploaded file is usable.
    async fn wait_active(&self, file: &RemoteFile) -> Result<(), ServiceError> {
        if file.state == FileState::Active {
            return Ok(());
        }
        let started = Instant::now();
        loop {
            match self.service.file_state(file).await? {
                FileState::Active => {
                    debug!(file = %file.name, waited_ms = started.elapsed().as_millis() as u64, "File is active");
                    return Ok(());
                }
                FileState::Failed => {
                    return Err(ServiceError::BadResponse {
                        service: self.service.name().to_string(),
                        message: format!("processing of {} failed", file.name),
                    });
                }
                FileState::Processing => {}
            }
            if started.elapsed() >= self.activation_timeout {
                return Err(ServiceError::Timeout {
                    service: self.service.name().to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Executor for ManagedFileExecutor {
    fn name(&self) -> &'static str {
        "managed-file"
    }

    async fn execute(&self, input: &ExecutorInput<'_>) -> Result<ExecutorOutput, ExtractError> {
        if !self.service.managed_files_enabled() {
            return Err(ServiceError::NotConfigured {
                service: self.service.name().to_string(),
                hint: "managed-file uploads are disabled".to_string(),
            }
            .into());
        }

        let service = &self.service;
        let (bytes, mime_type, display_name) =
            (input.bytes, input.format.mime_type(), input.display_name);
        let file = self
            .retry
            .run("upload", move |_| async move {
                service
                    .upload_file(bytes, mime_type, display_name)
                    .await
                    .map_err(ExtractError::from)
            })
            .await?;
        info!(file = %file.name, bytes = input.bytes.len(), "Uploaded document");

        let prompt = document_prompt(input.language_hints);
        let result = async {
            self.wait_active(&file).await?;
            let (file, prompt) = (&file, prompt.as_str());
            self.retry
                .run("generate", move |_| async move {
                    service
                        .generate_from_file(file, prompt)
                        .await
                        .map_err(ExtractError::from)
                })
                .await
        }
        .await;

        if let Err(e) = self.service.delete_file(&file).await {
            warn!(file = %file.name, "Failed to delete uploaded file: {}", e);
        }

        let response = result?;
        let usage = response
            .usage
            .unwrap_or_else(|| TokenUsage::new(0, TokenUsage::estimate_output(&response.text)));

        Ok(ExecutorOutput {
            cost: llm_cost(&response.model, usage),
            page_count: input.expected_pages().unwrap_or(0),
            confidence: LLM_CONFIDENCE,
            tokens: Some(usage),
            text: response.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use crate::models::DocumentFormat;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeFiles {
        polls_until_active: u32,
        polls: AtomicU32,
        uploads: AtomicU32,
        generations: AtomicU32,
        deletes: AtomicU32,
        fail_generate: bool,
        unavailable_generations: u32,
    }

    impl FakeFiles {
        fn new(polls_until_active: u32, fail_generate: bool) -> Self {
            Self {
                polls_until_active,
                polls: AtomicU32::new(0),
                uploads: AtomicU32::new(0),
                generations: AtomicU32::new(0),
                deletes: AtomicU32::new(0),
                fail_generate,
                unavailable_generations: 0,
            }
        }

        /// The first `n` generate calls answer 503.
        fn unavailable_for(mut self, n: u32) -> Self {
            self.unavailable_generations = n;
            self
        }
    }

    #[async_trait]
    impl LlmService for FakeFiles {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        async fn upload_file(
            &self,
            _bytes: &[u8],
            mime_type: &str,
            _display_name: &str,
        ) -> Result<RemoteFile, ServiceError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteFile {
                name: "files/1".into(),
                uri: "uri://files/1".into(),
                mime_type: mime_type.into(),
                state: FileState::Processing,
            })
        }

        async fn file_state(&self, _file: &RemoteFile) -> Result<FileState, ServiceError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n >= self.polls_until_active {
                FileState::Active
            } else {
                FileState::Processing
            })
        }

        async fn generate_from_file(
            &self,
            _file: &RemoteFile,
            _prompt: &str,
        ) -> Result<LlmResponse, ServiceError> {
            let n = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.unavailable_generations {
                return Err(ServiceError::Unavailable {
                    service: "fake".into(),
                    status: 503,
                });
            }
            if self.fail_generate {
                return Err(ServiceError::QuotaExceeded {
                    service: "fake".into(),
                    retry_after_secs: None,
                });
            }
            Ok(LlmResponse {
                text: "extracted".into(),
                model: "gemini-2.5-flash".into(),
                usage: Some(TokenUsage::new(100, 20)),
            })
        }

        async fn generate_inline(
            &self,
            _bytes: &[u8],
            _mime_type: &str,
            _prompt: &str,
        ) -> Result<LlmResponse, ServiceError> {
            unreachable!("managed-file executor never inlines")
        }

        async fn delete_file(&self, _file: &RemoteFile) -> Result<(), ServiceError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn input() -> ExecutorInput<'static> {
        ExecutorInput::whole(b"%PDF-1.5", DocumentFormat::Pdf, &[], "big.pdf")
            .with_total_pages(Some(300))
    }

    #[tokio::test]
    async fn test_upload_poll_generate_delete() {
        let service = Arc::new(FakeFiles::new(3, false));
        let executor = ManagedFileExecutor::new(service.clone(), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1));
        let output = executor.execute(&input()).await.unwrap();
        assert_eq!(output.text, "extracted");
        assert_eq!(output.confidence, LLM_CONFIDENCE);
        assert_eq!(output.page_count, 300);
        assert_eq!(output.tokens, Some(TokenUsage::new(100, 20)));
        assert_eq!(service.polls.load(Ordering::SeqCst), 3);
        assert_eq!(service.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_deleted_even_when_generation_fails() {
        let service = Arc::new(FakeFiles::new(1, true));
        let executor = ManagedFileExecutor::new(service.clone(), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1));
        let err = executor.execute(&input()).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Service(ServiceError::QuotaExceeded { .. })
        ));
        assert_eq!(service.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activation_timeout() {
        let service = Arc::new(FakeFiles::new(u32::MAX, false));
        let executor = ManagedFileExecutor::new(service.clone(), Duration::from_millis(20))
            .with_poll_interval(Duration::from_millis(5));
        let err = executor.execute(&input()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(service.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_generate_failure_reuses_upload() {
        let service = Arc::new(FakeFiles::new(1, false).unavailable_for(1));
        let executor = ManagedFileExecutor::new(service.clone(), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1))
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
        let output = executor.execute(&input()).await.unwrap();
        assert_eq!(output.text, "extracted");
        assert_eq!(service.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(service.generations.load(Ordering::SeqCst), 2);
        assert_eq!(service.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_generate_retries_delete_once() {
        let service = Arc::new(FakeFiles::new(1, false).unavailable_for(u32::MAX));
        let executor = ManagedFileExecutor::new(service.clone(), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(1))
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
        let err = executor.execute(&input()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(service.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(service.generations.load(Ordering::SeqCst), 2);
        assert_eq!(service.deletes.load(Ordering::SeqCst), 1);
    }
}
