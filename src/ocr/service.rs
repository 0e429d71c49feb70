//! OCR service contract.

use async_trait::async_trait;

use crate::error::ServiceError;

/// One OCR call: the bytes of a whole document or a chunk.
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
    pub language_hints: &'a [String],
}

/// What the OCR service returns for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResponse {
    pub text: String,
    /// Service-reported confidence per page, each in `[0, 1]`.
    pub page_confidences: Vec<f64>,
    pub page_count: u32,
}

impl OcrResponse {
    /// Mean of the per-page confidences, or 0.0 when none were reported.
    pub fn mean_confidence(&self) -> f64 {
        if self.page_confidences.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.page_confidences.iter().sum();
        (sum / self.page_confidences.len() as f64).clamp(0.0, 1.0)
    }
}

/// A remote OCR engine.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Short service name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the service has what it needs (credentials, endpoint) to run.
    fn is_available(&self) -> bool;

    /// Human-readable setup hint when unavailable.
    fn availability_hint(&self) -> String;

    async fn recognize(&self, request: OcrRequest<'_>) -> Result<OcrResponse, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_confidence() {
        let response = OcrResponse {
            text: "x".into(),
            page_confidences: vec![0.9, 0.7],
            page_count: 2,
        };
        assert!((response.mean_confidence() - 0.8).abs() < 1e-9);
        assert_eq!(OcrResponse::default().mean_confidence(), 0.0);
    }
}
