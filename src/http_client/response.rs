//! HTTP response wrapper.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ServiceError;

/// Response from one of the extraction services.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub(crate) service: &'static str,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub(crate) fn from_reqwest(service: &'static str, response: Response) -> Self {
        Self {
            status: response.status(),
            headers: extract_response_headers(&response),
            service,
            response,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Case-insensitive header lookup (keys are stored lowercased by reqwest).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Seconds from the Retry-After header, if present and numeric.
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(self.header("retry-after"))
    }

    /// Turn a non-2xx response into a classified `ServiceError`, consuming the body.
    ///
    /// `payload_size` is reported on 413 responses.
    pub async fn error_for_status(self, payload_size: usize) -> Result<Self, ServiceError> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status.as_u16();
        let retry_after = self.retry_after();
        let service = self.service;
        let body = self.response.text().await.unwrap_or_default();
        let mut error = ServiceError::from_status(service, status, &body, payload_size);
        if let ServiceError::QuotaExceeded {
            ref mut retry_after_secs,
            ..
        } = error
        {
            *retry_after_secs = retry_after.map(|d| d.as_secs());
        }
        Err(error)
    }

    /// Deserialize the JSON body.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ServiceError> {
        let service = self.service;
        self.response
            .json()
            .await
            .map_err(|e| ServiceError::BadResponse {
                service: service.to_string(),
                message: format!("failed to parse response: {}", e),
            })
    }

    pub async fn text(self) -> Result<String, ServiceError> {
        let service = self.service;
        self.response
            .text()
            .await
            .map_err(|e| ServiceError::from_reqwest(service, &e))
    }
}

fn extract_response_headers(response: &Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// Parse a numeric Retry-After header, capped at one minute.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}
