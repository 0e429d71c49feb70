//! Document chunking: page-range planning under a per-call byte budget.
//!
//! Planning is a pure function of the document's byte length, page count and
//! budget. It uses a flat average page size, so documents with very uneven
//! page weight can produce chunks that overshoot or undershoot the budget.
//! Materializing the chunk bytes is delegated to a [`DocumentSplitter`].

mod pdf;

pub use pdf::LopdfSplitter;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtractError;
use crate::models::DocumentFormat;

/// Half-open zero-based page range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1-based inclusive label, e.g. `[0, 114)` is "1-114".
    pub fn label(&self) -> String {
        if self.len() == 1 {
            format!("{}", self.start + 1)
        } else {
            format!("{}-{}", self.start + 1, self.end)
        }
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pages {}", self.label())
    }
}

/// One contiguous slice of a document with its own standalone bytes.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub index: usize,
    pub pages: PageRange,
    pub bytes: Vec<u8>,
}

impl DocumentChunk {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Number of pages per chunk so that `pages × average page size ≤ budget`.
///
/// Always at least one page.
pub fn pages_per_chunk(total_bytes: u64, total_pages: u32, budget_bytes: u64) -> u32 {
    if total_pages == 0 {
        return 0;
    }
    if total_bytes == 0 {
        return total_pages;
    }
    let fit = (budget_bytes as u128 * total_pages as u128) / total_bytes as u128;
    fit.clamp(1, total_pages as u128) as u32
}

/// Plan page ranges covering `[0, total_pages)` exactly once, in order.
pub fn plan_chunks(
    total_bytes: u64,
    total_pages: u32,
    budget_bytes: u64,
) -> Result<Vec<PageRange>, ExtractError> {
    if total_pages == 0 {
        return Err(ExtractError::UnreadableDocument(
            "document has no pages".to_string(),
        ));
    }

    let per_chunk = pages_per_chunk(total_bytes, total_pages, budget_bytes);
    let mut ranges = Vec::with_capacity(total_pages.div_ceil(per_chunk) as usize);
    let mut start = 0;
    while start < total_pages {
        let end = (start + per_chunk).min(total_pages);
        ranges.push(PageRange::new(start, end));
        start = end;
    }

    debug!(
        total_bytes,
        total_pages,
        budget_bytes,
        per_chunk,
        chunks = ranges.len(),
        "Planned page-range chunks"
    );
    Ok(ranges)
}

/// An opened document that can produce standalone page-range extracts.
pub trait PageSource: Send {
    fn page_count(&self) -> u32;

    /// Bytes of a standalone document holding only `range`.
    fn extract_pages(&self, range: PageRange) -> Result<Vec<u8>, ExtractError>;
}

/// Opens raw document bytes as a [`PageSource`].
pub trait DocumentSplitter: Send + Sync {
    fn open(&self, bytes: &[u8], format: DocumentFormat)
        -> Result<Box<dyn PageSource>, ExtractError>;
}

/// A single-page source for formats that cannot be split.
pub struct WholeDocument {
    bytes: Vec<u8>,
}

impl WholeDocument {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl PageSource for WholeDocument {
    fn page_count(&self) -> u32 {
        1
    }

    fn extract_pages(&self, _range: PageRange) -> Result<Vec<u8>, ExtractError> {
        Ok(self.bytes.clone())
    }
}

/// Count pages without producing chunks.
pub async fn count_pages(
    splitter: Arc<dyn DocumentSplitter>,
    bytes: Arc<[u8]>,
    format: DocumentFormat,
) -> Result<u32, ExtractError> {
    tokio::task::spawn_blocking(move || {
        let source = splitter.open(&bytes, format)?;
        Ok(source.page_count())
    })
    .await
    .map_err(|e| ExtractError::UnreadableDocument(format!("page count task failed: {}", e)))?
}

/// Split a document into chunks of at most `budget_bytes` (by flat page-size
/// estimate). Runs on the blocking pool since parsing is CPU-bound.
///
/// Fails with `UnreadableDocument` when the document cannot be parsed into
/// pages; no partial chunk list is ever returned.
pub async fn split_document(
    splitter: Arc<dyn DocumentSplitter>,
    bytes: Arc<[u8]>,
    format: DocumentFormat,
    budget_bytes: u64,
) -> Result<Vec<DocumentChunk>, ExtractError> {
    tokio::task::spawn_blocking(move || {
        split_blocking(splitter.as_ref(), &bytes, format, budget_bytes)
    })
    .await
    .map_err(|e| ExtractError::UnreadableDocument(format!("split task failed: {}", e)))?
}

fn split_blocking(
    splitter: &dyn DocumentSplitter,
    bytes: &[u8],
    format: DocumentFormat,
    budget_bytes: u64,
) -> Result<Vec<DocumentChunk>, ExtractError> {
    let source = splitter.open(bytes, format)?;
    let ranges = plan_chunks(bytes.len() as u64, source.page_count(), budget_bytes)?;

    // A single range spanning the whole document needs no re-encoding.
    if ranges.len() == 1 {
        return Ok(vec![DocumentChunk {
            index: 0,
            pages: ranges[0],
            bytes: bytes.to_vec(),
        }]);
    }

    ranges
        .into_iter()
        .enumerate()
        .map(|(index, pages)| {
            let chunk_bytes = source.extract_pages(pages)?;
            Ok(DocumentChunk {
                index,
                pages,
                bytes: chunk_bytes,
            })
        })
        .collect()
}

/// Default splitter: lopdf for PDFs, whole-document for images.
pub fn default_splitter() -> Arc<dyn DocumentSplitter> {
    Arc::new(LopdfSplitter::new())
}
