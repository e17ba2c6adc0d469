//! The single HTTP call made per analysis.

use async_trait::async_trait;

use crate::analysis::AnalysisRequest;
use crate::config::ClientConfig;
use crate::error::{AnalysisError, Result};

/// Raw answer from the service, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Posts one request body to the analysis endpoint.
///
/// Implementations issue exactly one call per invocation and never retry.
/// Non-2xx answers are returned as responses, not errors; only failures to
/// get any answer are errors.
#[async_trait(?Send)]
pub trait AnalysisTransport {
    async fn post_json(&self, request: &AnalysisRequest) -> Result<TransportResponse>;
}

/// Transport backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(config.request_timeout);

        let client = builder.build().map_err(|e| {
            AnalysisError::Configuration(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait(?Send)]
impl AnalysisTransport for HttpTransport {
    async fn post_json(&self, request: &AnalysisRequest) -> Result<TransportResponse> {
        let mut builder = self
            .client
            .post(self.config.endpoint.clone())
            .json(request);
        if let Some(credential) = &self.config.credential {
            builder = builder.header(credential.header.as_str(), credential.value.as_str());
        }

        log::debug!(
            "📤 POST {} ({} base64 bytes)",
            self.config.endpoint,
            request.image_data().len()
        );

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

fn transport_error(err: reqwest::Error) -> AnalysisError {
    #[cfg(not(target_arch = "wasm32"))]
    if err.is_timeout() {
        return AnalysisError::transport(None, "the analysis service did not respond in time");
    }
    AnalysisError::transport(err.status().map(|s| s.as_u16()), err.to_string())
}
