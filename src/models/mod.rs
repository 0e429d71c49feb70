//! Data models for docextract.

mod request;
mod result;
mod status;

pub use request::{DocumentFormat, ExtractionRequest};
pub use result::{ChunkResult, ChunkSummary, CostEstimate, ExtractionResult, TokenUsage};
pub use status::{PipelineStatus, Stage, StatusError};
