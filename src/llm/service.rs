//! LLM content-extraction service contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::TokenUsage;

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
}

impl FileState {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" | "STATE_UNSPECIFIED" => Some(Self::Processing),
            "ACTIVE" => Some(Self::Active),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A document held in the LLM service's file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    /// `None` when the service did not report usage.
    pub usage: Option<TokenUsage>,
}

/// A remote LLM able to read documents.
///
/// Two call shapes: managed-file (upload once, generate by reference) and
/// inline (bytes embedded in the request).
#[async_trait]
pub trait LlmService: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn availability_hint(&self) -> String;

    /// Whether the managed-file path is enabled for this deployment.
    fn managed_files_enabled(&self) -> bool {
        true
    }

    async fn upload_file(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ServiceError>;

    async fn file_state(&self, file: &RemoteFile) -> Result<FileState, ServiceError>;

    async fn generate_from_file(
        &self,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<LlmResponse, ServiceError>;

    async fn generate_inline(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<LlmResponse, ServiceError>;

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), ServiceError>;
}
