//! LLM content-extraction service: contract, Gemini client, prompts and pricing.

mod gemini;
pub mod pricing;
pub mod prompts;
mod service;

pub use gemini::GeminiClient;
pub use service::{FileState, LlmResponse, LlmService, RemoteFile};
