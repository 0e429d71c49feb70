//! OCR service contract and the Document AI client.

mod document_ai;
mod service;

pub use document_ai::DocumentAiClient;
pub use service::{OcrRequest, OcrResponse, OcrService};
