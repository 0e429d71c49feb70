//! The extraction service exposed to callers.
//!
//! `submit` runs one document through the strategy plan and returns the
//! merged result or a typed error; `status` reads the tracked progress.
//! Every stage transition goes through the [`StageTracker`], and a
//! document the tracker fails (inactivity timeout) is abandoned even while
//! chunk calls are still in flight.

mod batch;

pub use batch::{BatchItem, BatchSummary};

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chunker::{self, DocumentSplitter, PageRange};
use crate::config::Config;
use crate::error::ExtractError;
use crate::executor::{
    Executor, ExecutorInput, InlineLlmExecutor, ManagedFileExecutor, OcrExecutor,
    RetryingExecutor,
};
use crate::fallback::run_chain;
use crate::fanout::{extract_chunks, ChunkContext};
use crate::llm::{GeminiClient, LlmService};
use crate::models::{
    ChunkResult, ChunkSummary, CostEstimate, DocumentFormat, ExtractionRequest,
    ExtractionResult, PipelineStatus, Stage,
};
use crate::ocr::{DocumentAiClient, OcrService};
use crate::rate_limit::UploadLimiter;
use crate::retry::RetryPolicy;
use crate::strategy::{self, Strategy, StrategyPlan};
use crate::tracker::{StageTracker, SweeperHandle};

/// Progress reported once the bytes are received and hashed.
const RECEIVED_PROGRESS: u8 = 20;

/// New opaque document id.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// What one successful strategy produced, before result assembly.
struct StrategyOutput {
    text: String,
    confidence: f64,
    total_pages: u32,
    cost: CostEstimate,
    chunks: Vec<ChunkSummary>,
    failed_pages: Vec<String>,
}

/// Per-document inputs shared by every strategy attempt.
struct Job<'a> {
    document_id: &'a str,
    request: &'a ExtractionRequest,
    format: DocumentFormat,
}

pub struct Pipeline {
    config: Config,
    tracker: StageTracker,
    uploads: UploadLimiter,
    splitter: Arc<dyn DocumentSplitter>,
    ocr: Arc<dyn Executor>,
    managed_file: Arc<dyn Executor>,
    inline_llm: Arc<dyn Executor>,
    managed_files_enabled: bool,
}

impl Pipeline {
    /// Build a pipeline over the given services. Every call goes through the
    /// configured retry policy.
    pub fn new(config: Config, ocr: Arc<dyn OcrService>, llm: Arc<dyn LlmService>) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        let activation_timeout = Duration::from_secs(config.llm.file_activation_timeout_secs);

        if !ocr.is_available() {
            warn!("OCR service {} unavailable: {}", ocr.name(), ocr.availability_hint());
        }
        if !llm.is_available() {
            warn!("LLM service {} unavailable: {}", llm.name(), llm.availability_hint());
        }

        let managed_files_enabled = config.llm.managed_file_enabled && llm.managed_files_enabled();
        let ocr_executor = OcrExecutor::new(ocr, config.ocr.cost_per_page_usd);
        let managed_file =
            ManagedFileExecutor::new(Arc::clone(&llm), activation_timeout).with_retry(policy);
        let inline_llm = InlineLlmExecutor::new(llm);

        Self {
            tracker: StageTracker::new(config.tracker.clone()),
            uploads: UploadLimiter::new(config.uploads.clone()),
            splitter: chunker::default_splitter(),
            ocr: Arc::new(RetryingExecutor::new(Arc::new(ocr_executor), policy)),
            // Retries its own upload and generate steps, never the whole round trip.
            managed_file: Arc::new(managed_file),
            inline_llm: Arc::new(RetryingExecutor::new(Arc::new(inline_llm), policy)),
            managed_files_enabled,
            config,
        }
    }

    /// Build a pipeline backed by Document AI and Gemini.
    pub fn from_config(config: Config) -> Result<Self, ExtractError> {
        config.validate()?;
        let ocr = DocumentAiClient::new(config.ocr.clone())?;
        let llm = GeminiClient::new(config.llm.clone())?;
        Ok(Self::new(config, Arc::new(ocr), Arc::new(llm)))
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn DocumentSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    /// Start the background inactivity sweep. Without it documents never
    /// time out; finished statuses are still purged as new documents begin.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.tracker.spawn_sweeper()
    }

    /// Current status of a tracked document.
    pub async fn status(&self, document_id: &str) -> Option<PipelineStatus> {
        self.tracker.status(document_id).await
    }

    /// Strategy plan for a request, without touching any service.
    pub fn plan(&self, request: &ExtractionRequest) -> Result<StrategyPlan, ExtractError> {
        request.detect_format()?;
        self.plan_for_size(request.size(), request.allow_oversized())
    }

    fn plan_for_size(&self, size: u64, allow_oversized: bool) -> Result<StrategyPlan, ExtractError> {
        let mut plan = strategy::select(size, allow_oversized, &self.config.limits)?;
        if !self.managed_files_enabled && plan.contains(Strategy::ManagedFileLlm) {
            debug!("Managed-file uploads disabled, skipping strategy");
            plan = plan.without(Strategy::ManagedFileLlm);
        }
        Ok(plan)
    }

    /// Overall inactivity window for a document of `size` bytes.
    pub fn deadline_for(&self, size: u64) -> Duration {
        self.config
            .tracker
            .inactivity_timeout()
            .max(self.config.limits.timeout_for(size))
    }

    /// Extract one document under a fresh id.
    pub async fn submit(&self, request: ExtractionRequest) -> Result<ExtractionResult, ExtractError> {
        let document_id = new_document_id();
        self.submit_as(&document_id, request).await
    }

    /// Extract one document on behalf of `user_id`, subject to the upload
    /// rate limit.
    pub async fn submit_for(
        &self,
        user_id: &str,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractError> {
        self.uploads.acquire(user_id).await?;
        self.submit(request).await
    }

    pub fn uploads(&self) -> &UploadLimiter {
        &self.uploads
    }

    /// Extract one document under a caller-chosen id, so the caller can poll
    /// [`status`](Self::status) while this runs.
    ///
    /// Fails with `DuplicateDocument` while the id is still tracked.
    pub async fn submit_as(
        &self,
        document_id: &str,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractError> {
        let deadline = self.deadline_for(request.size());
        // A refused id belongs to another submission; leave its status alone.
        let mut status_rx = match self.tracker.begin_with_deadline(document_id, deadline).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(document_id, "Submission refused: {}", e);
                return Err(ExtractError::DuplicateDocument(document_id.to_string()));
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = wait_for_failure(&mut status_rx) => Err(ExtractError::ProcessingTimeout {
                document_id: document_id.to_string(),
                idle_secs: deadline.as_secs(),
            }),
            result = self.run(document_id, &request) => result,
        };

        match outcome {
            Ok(result) => {
                let finished = if self.config.hand_off_to_embedding {
                    self.tracker
                        .advance(document_id, Stage::Embedding, 0)
                        .await
                } else {
                    self.tracker.complete(document_id).await
                };
                if let Err(e) = finished {
                    debug!(document_id, "Final status update rejected: {}", e);
                }
                Ok(result)
            }
            Err(e) => {
                if let Err(te) = self.tracker.fail(document_id, &e).await {
                    debug!(document_id, "Failure already recorded: {}", te);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        document_id: &str,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractError> {
        let started = Instant::now();

        // Both checks run before any service call.
        let format = request.detect_format()?;
        let plan = self.plan_for_size(request.size(), request.allow_oversized())?;
        if plan.requires_confirmation {
            info!(
                document_id,
                size = request.size(),
                "Document past the managed-file threshold admitted by override"
            );
        }

        self.track(document_id, Stage::Uploading, 0).await;
        let content_sha256 = hex::encode(Sha256::digest(request.bytes()));
        self.track(document_id, Stage::Uploading, RECEIVED_PROGRESS).await;

        info!(
            document_id,
            file = request.display_name(),
            format = %format,
            size = request.size(),
            plan = %plan.describe(),
            "Starting extraction"
        );

        let job = Job {
            document_id,
            request,
            format,
        };
        let job = &job;
        let success = run_chain(&plan, move |strategy| self.run_strategy(job, strategy)).await?;
        let output = success.value;

        let result = ExtractionResult {
            document_id: document_id.to_string(),
            filename: request.filename().map(str::to_string),
            format,
            size_bytes: request.size(),
            content_sha256,
            text: output.text,
            confidence: output.confidence,
            total_pages: output.total_pages,
            strategy: success.strategy,
            failed_strategies: success.failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
            cost: output.cost,
            chunks: output.chunks,
            failed_pages: output.failed_pages,
        };
        info!(
            document_id,
            strategy = %result.strategy,
            pages = result.total_pages,
            confidence = result.confidence,
            cost_usd = result.cost.usd,
            elapsed_ms = result.elapsed_ms,
            "Extraction finished"
        );
        Ok(result)
    }

    async fn run_strategy(
        &self,
        job: &Job<'_>,
        strategy: Strategy,
    ) -> Result<StrategyOutput, ExtractError> {
        if let Err(e) = self.tracker.set_strategy(job.document_id, strategy).await {
            debug!(document_id = job.document_id, "Strategy not recorded: {}", e);
        }
        match strategy {
            Strategy::DirectOcr => self.run_whole(job, self.ocr.as_ref(), None).await,
            Strategy::ManagedFileLlm => {
                let total_pages = match chunker::count_pages(
                    Arc::clone(&self.splitter),
                    job.request.shared_bytes(),
                    job.format,
                )
                .await
                {
                    Ok(pages) => Some(pages),
                    Err(e) => {
                        debug!(document_id = job.document_id, "Page count unavailable: {}", e);
                        None
                    }
                };
                self.run_whole(job, self.managed_file.as_ref(), total_pages)
                    .await
            }
            Strategy::ChunkedOcr => {
                self.run_chunked(job, self.ocr.as_ref(), self.config.chunking.ocr_budget_bytes)
                    .await
            }
            Strategy::ChunkedLlm => {
                self.run_chunked(
                    job,
                    self.inline_llm.as_ref(),
                    self.config.chunking.llm_budget_bytes,
                )
                .await
            }
        }
    }

    /// One call over the whole document.
    async fn run_whole(
        &self,
        job: &Job<'_>,
        executor: &dyn Executor,
        total_pages: Option<u32>,
    ) -> Result<StrategyOutput, ExtractError> {
        self.track(job.document_id, Stage::Extracting, 0).await;

        let request = job.request;
        let input = ExecutorInput::whole(
            request.bytes(),
            job.format,
            request.language_hints(),
            request.display_name(),
        )
        .with_total_pages(total_pages);

        let started = Instant::now();
        let output = executor.execute(&input).await?;
        let pages = output.page_count.max(1);
        let chunk = ChunkResult {
            index: 0,
            pages: PageRange::new(0, pages),
            text: output.text,
            confidence: output.confidence.clamp(0.0, 1.0),
            pages_processed: output.page_count,
            tokens: output.tokens,
            cost: output.cost,
            elapsed: started.elapsed(),
            error: None,
        };

        self.track(job.document_id, Stage::Extracting, Stage::Extracting.progress_at(1.0))
            .await;
        Ok(StrategyOutput {
            chunks: vec![chunk.summary()],
            failed_pages: Vec::new(),
            text: chunk.text,
            confidence: chunk.confidence,
            total_pages: output.page_count,
            cost: chunk.cost,
        })
    }

    /// Split into page-range chunks, fan out, merge.
    async fn run_chunked(
        &self,
        job: &Job<'_>,
        executor: &dyn Executor,
        budget_bytes: u64,
    ) -> Result<StrategyOutput, ExtractError> {
        let document_id = job.document_id;
        self.track(document_id, Stage::Chunking, 0).await;

        let chunks = chunker::split_document(
            Arc::clone(&self.splitter),
            job.request.shared_bytes(),
            job.format,
            budget_bytes,
        )
        .await?;
        let total_pages = chunks.last().map(|c| c.pages.end).unwrap_or(0);

        let ctx = ChunkContext {
            format: job.format,
            total_pages,
            language_hints: job.request.language_hints(),
            display_name: job.request.display_name(),
        };
        let tracker = &self.tracker;
        let merged = extract_chunks(executor, &chunks, ctx, move |done, total| async move {
            let progress = Stage::Chunking.progress_at(done as f64 / total.max(1) as f64);
            if let Err(e) = tracker.advance(document_id, Stage::Chunking, progress).await {
                debug!(document_id, "Chunk progress not recorded: {}", e);
            }
        })
        .await?;

        if !merged.failed_pages().is_empty() {
            warn!(
                document_id,
                failed = ?merged.failed_pages(),
                "Partial extraction, some page ranges produced no text"
            );
        }

        Ok(StrategyOutput {
            failed_pages: merged.failed_pages(),
            chunks: merged.chunks.iter().map(ChunkResult::summary).collect(),
            text: merged.text,
            confidence: merged.confidence,
            total_pages: merged.total_pages,
            cost: merged.cost,
        })
    }

    /// Advance the tracker, ignoring rejected updates. A rejection means the
    /// document already failed and the select in `submit_as` will drop us.
    async fn track(&self, document_id: &str, stage: Stage, progress: u8) {
        if let Err(e) = self.tracker.advance(document_id, stage, progress).await {
            debug!(document_id, "Status update rejected: {}", e);
        }
    }
}

/// Resolve once the document's status turns `Failed`.
async fn wait_for_failure(rx: &mut watch::Receiver<PipelineStatus>) {
    loop {
        if rx.borrow_and_update().is_failed() {
            return;
        }
        if rx.changed().await.is_err() {
            // Tracker entry dropped; nothing left to watch.
            std::future::pending::<()>().await;
        }
    }
}
