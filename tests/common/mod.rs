//! In-process fakes for the OCR and LLM services and the page splitter.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use docextract::chunker::{DocumentSplitter, PageRange, PageSource};
use docextract::config::{ChunkingConfig, Config, RetryConfig, SizeLimits};
use docextract::llm::{FileState, LlmResponse, LlmService, RemoteFile};
use docextract::models::{DocumentFormat, TokenUsage};
use docextract::ocr::{OcrRequest, OcrResponse, OcrService};
use docextract::tracker::StageTracker;
use docextract::{ExtractError, ExtractionRequest, ServiceError, Stage};

pub const KB: u64 = 1024;

/// Thresholds scaled from MB to KB so tests stay small.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.limits = SizeLimits {
        comfortable_bytes: 20 * KB,
        chunk_bytes: 40 * KB,
        managed_file_bytes: 100 * KB,
        recommended_max_bytes: 100 * KB,
        absolute_max_bytes: 500 * KB,
    };
    config.chunking = ChunkingConfig {
        ocr_budget_bytes: 20 * KB,
        llm_budget_bytes: 12 * KB,
    };
    config.retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
    };
    config.llm.managed_file_enabled = true;
    config.hand_off_to_embedding = false;
    config
}

/// A PDF-looking payload of exactly `size` bytes.
pub fn pdf_bytes(size: u64) -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.resize(size as usize, b' ');
    bytes
}

pub fn pdf_request(size: u64, name: &str) -> ExtractionRequest {
    ExtractionRequest::new(pdf_bytes(size)).with_filename(name)
}

/// Records the tracked stage of one document whenever a fake service is called.
#[derive(Default)]
pub struct StageProbe {
    target: OnceLock<(StageTracker, String)>,
    seen: Mutex<Vec<Stage>>,
}

impl StageProbe {
    pub fn watch(&self, tracker: &StageTracker, document_id: &str) {
        let _ = self.target.set((tracker.clone(), document_id.to_string()));
    }

    async fn record(&self) {
        if let Some((tracker, id)) = self.target.get() {
            if let Some(status) = tracker.status(id).await {
                self.seen.lock().unwrap().push(status.stage);
            }
        }
    }

    pub fn seen(&self) -> Vec<Stage> {
        self.seen.lock().unwrap().clone()
    }
}

pub enum OcrBehavior {
    Succeed,
    /// Fail with 503 this many times, then succeed.
    FailTransient(usize),
    /// Fail every call whose payload contains this marker.
    FailWhenContains(&'static str),
    FailAlways,
    Hang,
}

pub struct FakeOcr {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
    pub behavior: OcrBehavior,
    pub probe: StageProbe,
}

impl FakeOcr {
    pub fn new(behavior: OcrBehavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            behavior,
            probe: StageProbe::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrService for FakeOcr {
    fn name(&self) -> &'static str {
        "fake-ocr"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        String::new()
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrResponse, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.probe.record().await;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let payload = String::from_utf8_lossy(request.bytes).trim().to_string();
        let unavailable = || ServiceError::Unavailable {
            service: "fake-ocr".into(),
            status: 503,
        };
        match &self.behavior {
            OcrBehavior::Succeed => {}
            OcrBehavior::FailTransient(n) if call < *n => return Err(unavailable()),
            OcrBehavior::FailTransient(_) => {}
            OcrBehavior::FailWhenContains(marker) if payload.contains(marker) => {
                return Err(unavailable())
            }
            OcrBehavior::FailWhenContains(_) => {}
            OcrBehavior::FailAlways => return Err(unavailable()),
            OcrBehavior::Hang => std::future::pending::<()>().await,
        }

        Ok(OcrResponse {
            text: format!("ocr[{}]", payload),
            page_confidences: vec![0.9],
            page_count: 0,
        })
    }
}

pub struct FakeLlm {
    pub uploads: AtomicUsize,
    pub file_generations: AtomicUsize,
    pub inline_calls: AtomicUsize,
    pub deletes: AtomicUsize,
    pub upload_error: Option<ServiceError>,
    pub unavailable_generations: usize,
    pub probe: StageProbe,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            file_generations: AtomicUsize::new(0),
            inline_calls: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            upload_error: None,
            unavailable_generations: 0,
            probe: StageProbe::default(),
        }
    }

    pub fn failing_uploads(error: ServiceError) -> Self {
        Self {
            upload_error: Some(error),
            ..Self::new()
        }
    }

    /// The first `n` generate-from-file calls answer 503.
    pub fn unavailable_generations(n: usize) -> Self {
        Self {
            unavailable_generations: n,
            ..Self::new()
        }
    }

    pub fn total_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
            + self.file_generations.load(Ordering::SeqCst)
            + self.inline_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmService for FakeLlm {
    fn name(&self) -> &'static str {
        "fake-llm"
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
        self.probe.record().await;
        if let Some(e) = &self.upload_error {
            return Err(e.clone());
        }
        Ok(RemoteFile {
            name: "files/fake".into(),
            uri: "https://example.invalid/files/fake".into(),
            mime_type: mime_type.to_string(),
            state: FileState::Active,
        })
    }

    async fn file_state(&self, _file: &RemoteFile) -> Result<FileState, ServiceError> {
        Ok(FileState::Active)
    }

    async fn generate_from_file(
        &self,
        _file: &RemoteFile,
        _prompt: &str,
    ) -> Result<LlmResponse, ServiceError> {
        let n = self.file_generations.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.unavailable_generations {
            return Err(ServiceError::Unavailable {
                service: "fake-llm".into(),
                status: 503,
            });
        }
        Ok(LlmResponse {
            text: "managed file text".into(),
            model: "gemini-2.5-flash".into(),
            usage: Some(TokenUsage::new(2_000, 500)),
        })
    }

    async fn generate_inline(
        &self,
        bytes: &[u8],
        _mime_type: &str,
        _prompt: &str,
    ) -> Result<LlmResponse, ServiceError> {
        self.inline_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.record().await;
        Ok(LlmResponse {
            text: format!("llm[{}]", String::from_utf8_lossy(bytes).trim()),
            model: "gemini-2.5-pro".into(),
            usage: Some(TokenUsage::new(1_000, 100)),
        })
    }

    async fn delete_file(&self, _file: &RemoteFile) -> Result<(), ServiceError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports a fixed page count; chunk bytes are the chunk's page label.
pub struct FakeSplitter {
    pub pages: u32,
    pub opens: Arc<AtomicUsize>,
    pub unreadable: bool,
}

impl FakeSplitter {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            opens: Arc::new(AtomicUsize::new(0)),
            unreadable: false,
        }
    }

    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::new(0)
        }
    }
}

struct LabelPages {
    pages: u32,
}

impl PageSource for LabelPages {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn extract_pages(&self, range: PageRange) -> Result<Vec<u8>, ExtractError> {
        Ok(range.label().into_bytes())
    }
}

impl DocumentSplitter for FakeSplitter {
    fn open(
        &self,
        _bytes: &[u8],
        _format: DocumentFormat,
    ) -> Result<Box<dyn PageSource>, ExtractError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.unreadable {
            return Err(ExtractError::UnreadableDocument("corrupt xref".into()));
        }
        Ok(Box::new(LabelPages { pages: self.pages }))
    }
}
