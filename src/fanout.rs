//! Parallel fan-out over document chunks and ordered merge of the results.
//!
//! All chunks of a document are dispatched at once; the chunk count is
//! already bounded by the document size limits. Each chunk failure is
//! captured in its `ChunkResult` instead of aborting its siblings.

use std::future::Future;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::chunker::{DocumentChunk, PageRange};
use crate::error::ExtractError;
use crate::executor::{Executor, ExecutorInput};
use crate::models::{ChunkResult, CostEstimate, DocumentFormat, TokenUsage};

/// Per-document context shared by every chunk call.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub format: DocumentFormat,
    pub total_pages: u32,
    pub language_hints: &'a [String],
    pub display_name: &'a str,
}

/// Merged outcome of a chunked extraction.
#[derive(Debug, Clone)]
pub struct MergedExtraction {
    pub text: String,
    pub confidence: f64,
    pub total_pages: u32,
    pub cost: CostEstimate,
    pub tokens: Option<TokenUsage>,
    /// Per-chunk results in page order.
    pub chunks: Vec<ChunkResult>,
}

impl MergedExtraction {
    /// Page ranges that produced no text, as 1-based labels.
    pub fn failed_pages(&self) -> Vec<String> {
        self.chunks
            .iter()
            .filter(|c| !c.has_text())
            .map(|c| c.pages.label())
            .collect()
    }
}

/// Separator placed before each chunk's text after the first.
pub fn page_separator(pages: PageRange) -> String {
    format!("\n\n--- Pages {} ---\n\n", pages.label())
}

/// Run `executor` over every chunk concurrently and merge the results.
///
/// `on_progress(done, total)` is awaited as each chunk settles, in completion
/// order.
pub async fn extract_chunks<P, Fut>(
    executor: &dyn Executor,
    chunks: &[DocumentChunk],
    ctx: ChunkContext<'_>,
    on_progress: P,
) -> Result<MergedExtraction, ExtractError>
where
    P: Fn(usize, usize) -> Fut,
    Fut: Future<Output = ()>,
{
    let total = chunks.len();
    info!(
        executor = executor.name(),
        chunks = total,
        pages = ctx.total_pages,
        "Dispatching chunks"
    );

    let mut pending: FuturesUnordered<_> = chunks
        .iter()
        .map(|chunk| run_chunk(executor, chunk, ctx))
        .collect();

    let mut results = Vec::with_capacity(total);
    let mut last_error = None;
    while let Some((result, error)) = pending.next().await {
        results.push(result);
        if error.is_some() {
            last_error = error;
        }
        on_progress(results.len(), total).await;
    }

    merge_chunk_results(results, last_error)
}

async fn run_chunk(
    executor: &dyn Executor,
    chunk: &DocumentChunk,
    ctx: ChunkContext<'_>,
) -> (ChunkResult, Option<ExtractError>) {
    let input = ExecutorInput::whole(
        &chunk.bytes,
        ctx.format,
        ctx.language_hints,
        ctx.display_name,
    )
    .with_pages(chunk.pages, ctx.total_pages);

    let started = Instant::now();
    match executor.execute(&input).await {
        Ok(output) => {
            debug!(
                chunk = chunk.index,
                pages = %chunk.pages.label(),
                chars = output.text.len(),
                "Chunk extracted"
            );
            let result = ChunkResult {
                index: chunk.index,
                pages: chunk.pages,
                text: output.text,
                confidence: output.confidence.clamp(0.0, 1.0),
                pages_processed: output.page_count,
                tokens: output.tokens,
                cost: output.cost,
                elapsed: started.elapsed(),
                error: None,
            };
            (result, None)
        }
        Err(e) => {
            warn!(chunk = chunk.index, pages = %chunk.pages.label(), "Chunk failed: {}", e);
            let result =
                ChunkResult::failed(chunk.index, chunk.pages, started.elapsed(), e.to_string());
            (result, Some(e))
        }
    }
}

/// Merge per-chunk results, in any order, into one document-level extraction.
///
/// Text is concatenated in page order. Confidence is the page-weighted mean
/// over chunks that produced text; failed or empty chunks add no weight.
/// When every chunk failed, returns `AllChunksFailed` carrying `last_error`.
pub fn merge_chunk_results(
    mut results: Vec<ChunkResult>,
    last_error: Option<ExtractError>,
) -> Result<MergedExtraction, ExtractError> {
    if results.is_empty() {
        return Err(ExtractError::UnreadableDocument(
            "no chunks to extract".to_string(),
        ));
    }
    results.sort_by_key(|r| r.pages.start);

    if results.iter().all(|r| !r.is_success()) {
        let chunks = results.len();
        let last = last_error.unwrap_or_else(|| {
            ExtractError::UnreadableDocument(
                results
                    .last()
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "chunk extraction failed".to_string()),
            )
        });
        return Err(ExtractError::AllChunksFailed {
            chunks,
            last: Box::new(last),
        });
    }

    let mut text = String::new();
    let mut weighted = 0.0;
    let mut weight = 0u64;
    let mut cost = CostEstimate::default();
    let mut tokens: Option<TokenUsage> = None;

    for result in &results {
        cost = cost + result.cost;
        if let Some(usage) = result.tokens {
            tokens = Some(tokens.unwrap_or_default() + usage);
        }
        if !result.has_text() {
            continue;
        }
        if !text.is_empty() {
            text.push_str(&page_separator(result.pages));
        }
        text.push_str(result.text.trim_end());

        let pages = result.pages.len() as u64;
        weighted += result.confidence * pages as f64;
        weight += pages;
    }

    let confidence = if weight > 0 {
        weighted / weight as f64
    } else {
        0.0
    };
    let total_pages = results.iter().map(|r| r.pages.len()).sum();

    Ok(MergedExtraction {
        text,
        confidence,
        total_pages,
        cost,
        tokens,
        chunks: results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::executor::ExecutorOutput;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn ok_chunk(index: usize, pages: PageRange, text: &str, confidence: f64) -> ChunkResult {
        ChunkResult {
            index,
            pages,
            text: text.to_string(),
            confidence,
            pages_processed: pages.len(),
            tokens: None,
            cost: CostEstimate::default(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    #[test]
    fn test_partial_merge_confidence() {
        let results = vec![
            ok_chunk(0, PageRange::new(0, 10), "first", 0.9),
            ChunkResult::failed(1, PageRange::new(10, 20), Duration::ZERO, "boom".into()),
            ok_chunk(2, PageRange::new(20, 30), "third", 0.8),
        ];
        let merged = merge_chunk_results(results, None).unwrap();
        assert!((merged.confidence - 0.85).abs() < 1e-9);
        assert_eq!(merged.total_pages, 30);
        assert_eq!(merged.failed_pages(), vec!["11-20".to_string()]);
    }

    #[test]
    fn test_merge_restores_page_order() {
        let results = vec![
            ok_chunk(2, PageRange::new(20, 30), "C", 0.5),
            ok_chunk(0, PageRange::new(0, 10), "A", 0.5),
            ok_chunk(1, PageRange::new(10, 20), "B", 0.5),
        ];
        let merged = merge_chunk_results(results, None).unwrap();
        assert_eq!(
            merged.text,
            "A\n\n--- Pages 11-20 ---\n\nB\n\n--- Pages 21-30 ---\n\nC"
        );
        let order: Vec<usize> = merged.chunks.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_all_failed_is_document_failure() {
        let results = vec![
            ChunkResult::failed(0, PageRange::new(0, 5), Duration::ZERO, "a".into()),
            ChunkResult::failed(1, PageRange::new(5, 9), Duration::ZERO, "b".into()),
        ];
        let last = ExtractError::Service(ServiceError::Timeout {
            service: "ocr".into(),
        });
        match merge_chunk_results(results, Some(last)).unwrap_err() {
            ExtractError::AllChunksFailed { chunks, last } => {
                assert_eq!(chunks, 2);
                assert!(matches!(
                    *last,
                    ExtractError::Service(ServiceError::Timeout { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_text_success_has_zero_weight() {
        let results = vec![
            ok_chunk(0, PageRange::new(0, 10), "   ", 0.99),
            ok_chunk(1, PageRange::new(10, 12), "text", 0.5),
        ];
        let merged = merge_chunk_results(results, None).unwrap();
        assert!((merged.confidence - 0.5).abs() < 1e-9);
        assert_eq!(merged.text, "text");
    }

    /// Completes chunks in reverse order and fails the ones listed.
    struct StaggeredExecutor {
        fail: HashSet<u32>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Executor for StaggeredExecutor {
        fn name(&self) -> &'static str {
            "staggered"
        }

        async fn execute(
            &self,
            input: &ExecutorInput<'_>,
        ) -> Result<ExecutorOutput, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let pages = input.pages.unwrap_or(PageRange::new(0, 1));
            let delay = 50u64.saturating_sub(pages.start as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&pages.start) {
                return Err(ExtractError::Service(ServiceError::Unavailable {
                    service: "fake".into(),
                    status: 503,
                }));
            }
            Ok(ExecutorOutput {
                text: format!("page {}", pages.start + 1),
                confidence: 0.9,
                page_count: pages.len(),
                tokens: None,
                cost: CostEstimate::ocr(pages.len(), 0.01),
            })
        }
    }

    fn single_page_chunks(n: u32) -> Vec<DocumentChunk> {
        (0..n)
            .map(|i| DocumentChunk {
                index: i as usize,
                pages: PageRange::new(i, i + 1),
                bytes: vec![i as u8],
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extract_chunks_concurrent_ordered_partial() {
        let executor = StaggeredExecutor {
            fail: [2].into_iter().collect(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };
        let chunks = single_page_chunks(5);
        let progress = Mutex::new(Vec::new());
        let ctx = ChunkContext {
            format: DocumentFormat::Pdf,
            total_pages: 5,
            language_hints: &[],
            display_name: "doc.pdf",
        };

        let merged = extract_chunks(&executor, &chunks, ctx, |done, total| {
            progress.lock().unwrap().push((done, total));
            async {}
        })
        .await
        .unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 5);
        assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 5);
        assert!(merged.text.starts_with("page 1"));
        assert!(merged.text.ends_with("page 5"));
        assert!(!merged.text.contains("page 3"));
        assert_eq!(merged.failed_pages(), vec!["3".to_string()]);
        assert_eq!(merged.total_pages, 5);
        assert!((merged.cost.usd - 0.04).abs() < 1e-9);
        assert_eq!(
            progress.lock().unwrap().last().copied(),
            Some((5usize, 5usize))
        );
    }
}
