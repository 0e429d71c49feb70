//! Bounded multi-document batches.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::info;

use super::Pipeline;
use crate::error::ExtractError;
use crate::models::{ExtractionRequest, ExtractionResult};

/// Outcome of one document in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub name: String,
    pub result: Result<ExtractionResult, ExtractError>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Serializable batch totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let succeeded = items.iter().filter(|i| i.is_success()).count();
        Self {
            succeeded,
            failed: items.len() - succeeded,
        }
    }
}

impl Pipeline {
    /// Reject a batch up front if it is too large or holds any document that
    /// could not be admitted on its own. The error names every offender.
    pub fn validate_batch(&self, requests: &[ExtractionRequest]) -> Result<(), ExtractError> {
        let limits = &self.config.batch;
        if requests.is_empty() {
            return Err(ExtractError::InvalidBatch("batch is empty".to_string()));
        }
        if requests.len() > limits.max_files_per_batch {
            return Err(ExtractError::InvalidBatch(format!(
                "{} files exceeds the limit of {}",
                requests.len(),
                limits.max_files_per_batch
            )));
        }
        let total: u64 = requests.iter().map(ExtractionRequest::size).sum();
        if total > limits.max_batch_bytes {
            return Err(ExtractError::InvalidBatch(format!(
                "{} bytes exceeds the batch limit of {} bytes",
                total, limits.max_batch_bytes
            )));
        }

        let problems: Vec<String> = requests
            .iter()
            .filter_map(|request| {
                self.plan(request)
                    .err()
                    .map(|e| format!("{}: {}", request.display_name(), e))
            })
            .collect();
        if !problems.is_empty() {
            return Err(ExtractError::InvalidBatch(problems.join("; ")));
        }
        Ok(())
    }

    /// Validate, then extract with at most `max_concurrent_documents` in
    /// flight. Items come back in input order.
    pub async fn submit_batch(
        &self,
        requests: Vec<ExtractionRequest>,
    ) -> Result<Vec<BatchItem>, ExtractError> {
        self.validate_batch(&requests)?;
        let concurrency = self.config.batch.max_concurrent_documents.max(1);
        info!(documents = requests.len(), concurrency, "Starting batch");

        let mut items: Vec<(usize, BatchItem)> = stream::iter(requests.into_iter().enumerate())
            .map(|(position, request)| async move {
                let name = request.display_name().to_string();
                let result = self.submit(request).await;
                (position, BatchItem { name, result })
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        items.sort_by_key(|(position, _)| *position);
        let items: Vec<BatchItem> = items.into_iter().map(|(_, item)| item).collect();

        let summary = BatchSummary::from_items(&items);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch finished"
        );
        Ok(items)
    }
}
