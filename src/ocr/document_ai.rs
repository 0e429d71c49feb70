//! Google Document AI OCR client.
//!
//! Calls the processor's synchronous `:process` endpoint with the document
//! inlined as base64. Requires `DOCUMENT_AI_PROJECT`, `DOCUMENT_AI_PROCESSOR_ID`
//! and a bearer token in `DOCUMENT_AI_TOKEN` (or an explicit endpoint).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::service::{OcrRequest, OcrResponse, OcrService};
use crate::config::OcrServiceConfig;
use crate::error::ServiceError;
use crate::http_client::HttpClient;

const SERVICE: &str = "document-ai";

pub struct DocumentAiClient {
    config: OcrServiceConfig,
    client: HttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_options: Option<ProcessOptions<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessOptions<'a> {
    ocr_config: OcrConfigOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrConfigOptions<'a> {
    hints: OcrHints<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrHints<'a> {
    language_hints: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<DocumentBody>,
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    layout: Option<Layout>,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    layout: Option<Layout>,
}

#[derive(Debug, Deserialize)]
struct Layout {
    #[serde(default)]
    confidence: Option<f64>,
}

impl DocumentAiClient {
    pub fn new(config: OcrServiceConfig) -> Result<Self, ServiceError> {
        let client = HttpClient::new(SERVICE, Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(OcrServiceConfig::default())
    }
}

/// Per-page confidence: mean of paragraph confidences, else the page layout's.
fn page_confidence(page: &Page) -> Option<f64> {
    let paragraph_scores: Vec<f64> = page
        .paragraphs
        .iter()
        .filter_map(|p| p.layout.as_ref().and_then(|l| l.confidence))
        .collect();
    if !paragraph_scores.is_empty() {
        return Some(paragraph_scores.iter().sum::<f64>() / paragraph_scores.len() as f64);
    }
    page.layout.as_ref().and_then(|l| l.confidence)
}

fn into_ocr_response(body: ProcessResponse) -> Result<OcrResponse, ServiceError> {
    let document = body.document.ok_or_else(|| ServiceError::BadResponse {
        service: SERVICE.to_string(),
        message: "response has no document".to_string(),
    })?;
    let page_confidences = document.pages.iter().filter_map(page_confidence).collect();
    Ok(OcrResponse {
        page_count: document.pages.len() as u32,
        page_confidences,
        text: document.text,
    })
}

#[async_trait]
impl OcrService for DocumentAiClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    fn availability_hint(&self) -> String {
        if self.config.process_url().is_none() {
            "Set DOCUMENT_AI_PROJECT and DOCUMENT_AI_PROCESSOR_ID (or DOCUMENT_AI_ENDPOINT)"
                .to_string()
        } else if self.config.access_token.is_none() {
            "Set DOCUMENT_AI_TOKEN to an OAuth access token (gcloud auth print-access-token)"
                .to_string()
        } else {
            format!("Document AI is available (location: {})", self.config.location)
        }
    }

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrResponse, ServiceError> {
        let not_configured = |hint: String| ServiceError::NotConfigured {
            service: SERVICE.to_string(),
            hint,
        };
        let url = self
            .config
            .process_url()
            .ok_or_else(|| not_configured(self.availability_hint()))?;
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or_else(|| not_configured(self.availability_hint()))?;

        let body = ProcessRequest {
            raw_document: RawDocument {
                content: base64::engine::general_purpose::STANDARD.encode(request.bytes),
                mime_type: request.mime_type,
            },
            process_options: (!request.language_hints.is_empty()).then(|| ProcessOptions {
                ocr_config: OcrConfigOptions {
                    hints: OcrHints {
                        language_hints: request.language_hints,
                    },
                },
            }),
        };

        let bearer = format!("Bearer {}", token);
        debug!(bytes = request.bytes.len(), mime = request.mime_type, "Document AI process");
        let response = self
            .client
            .post_json(&url, &body, &[("Authorization", bearer.as_str())])
            .await?
            .error_for_status(request.bytes.len())
            .await?;

        into_ocr_response(response.json().await?)
    }
}
