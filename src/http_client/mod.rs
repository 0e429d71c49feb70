//! Thin reqwest wrapper shared by the OCR and LLM service clients.
//!
//! Every transport failure is classified into a [`ServiceError`] here so the
//! service clients only deal with response bodies.

mod response;

pub use response::{parse_retry_after, HttpResponse};

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::error::ServiceError;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("docextract/", env!("CARGO_PKG_VERSION"));

/// HTTP client bound to one named service.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    service: &'static str,
}

impl HttpClient {
    /// Create a client for `service` with an overall request timeout.
    pub fn new(service: &'static str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ServiceError::Network {
                service: service.to_string(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, service })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// POST a JSON body.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        json: &T,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ServiceError> {
        let request = with_headers(self.client.post(url).json(json), headers);
        self.send("POST", url, request).await
    }

    /// POST a raw byte body.
    pub async fn post_bytes(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ServiceError> {
        let request = with_headers(self.client.post(url).body(body), headers);
        self.send("POST", url, request).await
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ServiceError> {
        let request = with_headers(self.client.get(url), headers);
        self.send("GET", url, request).await
    }

    pub async fn delete(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, ServiceError> {
        let request = with_headers(self.client.delete(url), headers);
        self.send("DELETE", url, request).await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<HttpResponse, ServiceError> {
        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(self.service, &e))?;
        debug!(
            service = self.service,
            method,
            url = %redact_key(url),
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "HTTP request complete"
        );
        Ok(HttpResponse::from_reqwest(self.service, response))
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
}

/// Strip an API key query parameter before a URL is logged.
fn redact_key(url: &str) -> String {
    match url.find("key=") {
        Some(pos) => {
            let rest = &url[pos + 4..];
            let end = rest.find('&').map(|i| pos + 4 + i).unwrap_or(url.len());
            format!("{}key=***{}", &url[..pos], &url[end..])
        }
        None => url.to_string(),
    }
}
