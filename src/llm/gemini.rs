//! Google Gemini client for document extraction.
//!
//! Two call shapes against the Generative Language REST API:
//! - managed file: multipart upload to `upload/v1beta/files`, poll the file
//!   until `ACTIVE`, then `generateContent` with a `fileData` reference
//! - inline: `generateContent` with the bytes as base64 `inline_data`
//!
//! Requires GEMINI_API_KEY (or GOOGLE_AI_API_KEY).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::service::{FileState, LlmResponse, LlmService, RemoteFile};
use crate::config::LlmConfig;
use crate::error::ServiceError;
use crate::http_client::HttpClient;
use crate::models::TokenUsage;

const SERVICE: &str = "gemini";

pub struct GeminiClient {
    config: LlmConfig,
    client: HttpClient,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        inline_data: InlineData<'a>,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    #[serde(rename = "fileUri")]
    file_uri: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    file: UploadFileMeta<'a>,
}

#[derive(Debug, Serialize)]
struct UploadFileMeta<'a> {
    #[serde(rename = "displayName")]
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    state: Option<String>,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Result<Self, ServiceError> {
        let client = HttpClient::new(SERVICE, Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(LlmConfig::default())
    }

    fn api_key(&self) -> Result<&str, ServiceError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServiceError::NotConfigured {
                service: SERVICE.to_string(),
                hint: self.availability_hint(),
            })
    }

    fn base(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    async fn generate(
        &self,
        model: &str,
        parts: Vec<GeminiPart<'_>>,
        payload_size: usize,
    ) -> Result<LlmResponse, ServiceError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base(),
            model,
            self.api_key()?
        );
        let request = GenerateRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post_json(&url, &request, &[])
            .await?
            .error_for_status(payload_size)
            .await?;
        parse_generate_response(response.json().await?, model)
    }
}

fn parse_generate_response(
    body: GenerateResponse,
    model: &str,
) -> Result<LlmResponse, ServiceError> {
    if let Some(error) = body.error {
        return Err(ServiceError::BadResponse {
            service: SERVICE.to_string(),
            message: error.message,
        });
    }

    let text: String = body
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let usage = body.usage_metadata.map(|u| {
        let output = u
            .candidates_token_count
            .unwrap_or_else(|| TokenUsage::estimate_output(&text));
        TokenUsage::new(u.prompt_token_count.unwrap_or(0), output)
    });

    Ok(LlmResponse {
        text,
        model: model.to_string(),
        usage,
    })
}

fn into_remote_file(resource: FileResource, fallback_mime: &str) -> RemoteFile {
    RemoteFile {
        state: resource
            .state
            .as_deref()
            .and_then(FileState::from_str)
            .unwrap_or(FileState::Processing),
        name: resource.name,
        uri: resource.uri,
        mime_type: resource
            .mime_type
            .unwrap_or_else(|| fallback_mime.to_string()),
    }
}

/// Build a `multipart/related` body: JSON metadata part then the file bytes.
fn multipart_body(boundary: &str, metadata: &str, mime_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
            b = boundary,
            m = metadata,
            t = mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl LlmService for GeminiClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    fn availability_hint(&self) -> String {
        if self.config.is_configured() {
            format!(
                "Gemini is available (file model: {}, inline model: {})",
                self.config.managed_file_model, self.config.inline_model
            )
        } else {
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string()
        }
    }

    fn managed_files_enabled(&self) -> bool {
        self.config.managed_file_enabled
    }

    async fn upload_file(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ServiceError> {
        let url = format!("{}/upload/v1beta/files?key={}", self.base(), self.api_key()?);
        let metadata = serde_json::to_string(&UploadMetadata {
            file: UploadFileMeta { display_name },
        })
        .map_err(|e| ServiceError::BadResponse {
            service: SERVICE.to_string(),
            message: format!("failed to encode upload metadata: {}", e),
        })?;
        let boundary = format!("docextract-{}", uuid::Uuid::new_v4().simple());
        let content_type = format!("multipart/related; boundary={}", boundary);
        let body = multipart_body(&boundary, &metadata, mime_type, bytes);

        debug!(bytes = bytes.len(), display_name, "Uploading file to Gemini");
        let response = self
            .client
            .post_bytes(
                &url,
                body,
                &[
                    ("Content-Type", content_type.as_str()),
                    ("X-Goog-Upload-Protocol", "multipart"),
                ],
            )
            .await?
            .error_for_status(bytes.len())
            .await?;

        let uploaded: UploadResponse = response.json().await?;
        Ok(into_remote_file(uploaded.file, mime_type))
    }

    async fn file_state(&self, file: &RemoteFile) -> Result<FileState, ServiceError> {
        let url = format!("{}/v1beta/{}?key={}", self.base(), file.name, self.api_key()?);
        let response = self
            .client
            .get(&url, &[])
            .await?
            .error_for_status(0)
            .await?;

        // File info may be at the root or under `file`.
        let value: serde_json::Value = response.json().await?;
        let info = value.get("file").unwrap_or(&value);
        info.get("state")
            .and_then(|s| s.as_str())
            .and_then(FileState::from_str)
            .ok_or_else(|| ServiceError::BadResponse {
                service: SERVICE.to_string(),
                message: "file info has no state".to_string(),
            })
    }

    async fn generate_from_file(
        &self,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<LlmResponse, ServiceError> {
        let parts = vec![
            GeminiPart::FileData {
                file_data: FileData {
                    file_uri: &file.uri,
                    mime_type: &file.mime_type,
                },
            },
            GeminiPart::Text { text: prompt },
        ];
        self.generate(&self.config.managed_file_model, parts, 0).await
    }

    async fn generate_inline(
        &self,
        bytes: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<LlmResponse, ServiceError> {
        let parts = vec![
            GeminiPart::Text { text: prompt },
            GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            },
        ];
        self.generate(&self.config.inline_model, parts, bytes.len())
            .await
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), ServiceError> {
        let url = format!("{}/v1beta/{}?key={}", self.base(), file.name, self.api_key()?);
        self.client
            .delete(&url, &[])
            .await?
            .error_for_status(0)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_response_with_usage() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}],
            "usageMetadata": {"promptTokenCount": 1200, "candidatesTokenCount": 3}
        }"#;
        let body: GenerateResponse = serde_json::from_str(json).unwrap();
        let response = parse_generate_response(body, "gemini-2.5-flash").unwrap();
        assert_eq!(response.text, "Hello world");
        assert_eq!(response.usage, Some(TokenUsage::new(1200, 3)));
    }

    #[test]
    fn test_missing_output_count_is_estimated() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "abcdefghi"}]}}],
            "usageMetadata": {"promptTokenCount": 10}
        }"#;
        let body: GenerateResponse = serde_json::from_str(json).unwrap();
        let response = parse_generate_response(body, "m").unwrap();
        assert_eq!(response.usage, Some(TokenUsage::new(10, 3)));
    }

    #[test]
    fn test_api_error_is_bad_response() {
        let body: GenerateResponse =
            serde_json::from_str(r#"{"error": {"message": "nope"}}"#).unwrap();
        assert!(matches!(
            parse_generate_response(body, "m"),
            Err(ServiceError::BadResponse { .. })
        ));
    }

    #[test]
    fn test_part_serialization() {
        let part = GeminiPart::FileData {
            file_data: FileData {
                file_uri: "https://files/abc",
                mime_type: "application/pdf",
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["fileData"]["fileUri"], "https://files/abc");

        let part = GeminiPart::InlineData {
            inline_data: InlineData {
                mime_type: "image/png",
                data: "AAAA".into(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn test_into_remote_file() {
        let resource: FileResource = serde_json::from_str(
            r#"{"name": "files/abc", "uri": "https://x/files/abc", "state": "ACTIVE"}"#,
        )
        .unwrap();
        let file = into_remote_file(resource, "application/pdf");
        assert_eq!(file.state, FileState::Active);
        assert_eq!(file.mime_type, "application/pdf");
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("B", "{}", "application/pdf", b"PDFDATA");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--B\r\nContent-Type: application/json"));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\nPDFDATA\r\n--B--\r\n"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let mut config = LlmConfig::default();
        config.api_key = None;
        let client = GeminiClient::new(config).unwrap();
        assert!(!client.is_available());
        let err = client
            .generate_inline(b"x", "image/png", "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured { .. }));
    }
}
