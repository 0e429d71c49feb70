//! docextract - adaptive document text extraction.
//!
//! A document's size picks an ordered strategy plan (direct OCR, chunked
//! OCR, managed-file LLM, chunked LLM). Chunked strategies split the PDF
//! into page ranges under a byte budget and extract them in parallel.
//! Strategies fall back in order on failure, transient errors are retried,
//! and every document's progress is tracked for polling.

pub mod chunker;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod fanout;
pub mod http_client;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod strategy;
pub mod tracker;
pub mod utils;

pub use config::Config;
pub use error::{ExtractError, FailureClass, ServiceError};
pub use models::{ExtractionRequest, ExtractionResult, PipelineStatus, Stage};
pub use pipeline::Pipeline;
