//! Extraction request and document format detection.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Document types the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Gif,
    Webp,
}

impl DocumentFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let normalized = mime
            .split(';')
            .next()
            .unwrap_or(mime)
            .trim()
            .to_lowercase();
        match normalized.as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/tiff" | "image/tif" => Some(Self::Tiff),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Only PDFs can be split into page ranges; images are a single page.
    pub fn is_splittable(&self) -> bool {
        matches!(self, Self::Pdf)
    }

    /// Resolve the format from content, falling back to the declared MIME type
    /// and then the filename extension.
    pub fn detect(
        bytes: &[u8],
        declared_mime: Option<&str>,
        filename: Option<&str>,
    ) -> Result<Self, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::UnreadableDocument(
                "document is empty".to_string(),
            ));
        }

        if let Some(kind) = infer::get(bytes) {
            return Self::from_mime(kind.mime_type()).ok_or_else(|| {
                ExtractError::UnsupportedFormat(format!(
                    "{} (detected from content)",
                    kind.mime_type()
                ))
            });
        }

        if let Some(format) = declared_mime.and_then(Self::from_mime) {
            return Ok(format);
        }

        let ext = filename
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str());
        if let Some(format) = ext.and_then(Self::from_extension) {
            return Ok(format);
        }

        Err(ExtractError::UnsupportedFormat(
            declared_mime
                .map(str::to_string)
                .or_else(|| ext.map(|e| format!(".{}", e)))
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// A document submitted for extraction. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    bytes: Arc<[u8]>,
    mime_type: Option<String>,
    filename: Option<String>,
    allow_oversized: bool,
    language_hints: Vec<String>,
}

impl ExtractionRequest {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: None,
            filename: None,
            allow_oversized: false,
            language_hints: Vec::new(),
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Admit the document past the recommended maximum (never past the absolute one).
    pub fn with_oversized_override(mut self, allow: bool) -> Self {
        self.allow_oversized = allow;
        self
    }

    pub fn with_language_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.language_hints = hints.into_iter().map(Into::into).collect();
        self
    }

    /// Read a file into a request, taking the filename from the path.
    pub async fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let bytes = tokio::fs::read(path).await?;
        let mut request = Self::new(bytes);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            request = request.with_filename(name);
        }
        Ok(request)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn allow_oversized(&self) -> bool {
        self.allow_oversized
    }

    pub fn language_hints(&self) -> &[String] {
        &self.language_hints
    }

    /// Name used in logs and error messages.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("document")
    }

    pub fn detect_format(&self) -> Result<DocumentFormat, ExtractError> {
        DocumentFormat::detect(&self.bytes, self.mime_type(), self.filename())
    }
}
