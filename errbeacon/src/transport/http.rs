//! Built-in HTTP transport
//!
//! POSTs the payload as JSON. Any 2xx status counts as delivered; everything
//! else, including connection failures and timeouts, is reported back as a
//! failed [`Response`]. There are no retries: the buffer is resent with the next
//! capture instead.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;

use crate::config::CollectorConfig;
use crate::flush::Payload;

use super::{Response, SendFuture, Transport, TransportError};

/// HTTP client for the remote collector
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn new(config: &CollectorConfig) -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Create a transport with an explicit request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Client(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, url: &str, payload: Payload) -> Result<SendFuture, TransportError> {
        let request = self.http_client.post(url).json(&payload);

        Ok(Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| Response::failure(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let body = parse_body(&text);

            if status.is_success() {
                Ok(Response::new(Some(status.as_u16()), body))
            } else {
                tracing::debug!(status = %status, body = %text, "Collector rejected payload");
                Err(Response::new(Some(status.as_u16()), body))
            }
        }))
    }
}

/// JSON bodies are kept structured; anything else is kept as text
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
