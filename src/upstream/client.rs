//! reqwest implementation of [`UpstreamClient`].

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header;
use reqwest::{Client, RequestBuilder, Response};

use super::sse::fragment_stream;
use super::types::{CompletionRequest, CompletionResponse};
use super::{FragmentStream, UpstreamClient};
use crate::config::{ApiKey, UpstreamConfig};
use crate::error::{Error, Result};

/// Client for one OpenAI-compatible provider.
#[derive(Clone)]
pub struct HttpUpstream {
    http: Client,
    base_url: String,
    api_key: Option<ApiKey>,
    timeout: Duration,
}

impl HttpUpstream {
    /// Build from configuration, creating a pooled HTTP client.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::new(http, config))
    }

    /// Build around an existing HTTP client.
    pub fn new(http: Client, config: &UpstreamConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Prepare the POST. Fails before any I/O when no key is configured.
    fn post(&self, request: &CompletionRequest) -> Result<RequestBuilder> {
        let api_key = self.api_key.as_ref().ok_or(Error::MissingApiKey)?;

        Ok(self
            .http
            .post(self.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", api_key.expose_secret()),
            )
            .json(request))
    }
}

/// Turn a non-success upstream status into [`Error::UpstreamHttp`].
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "Upstream returned error");
    Err(Error::UpstreamHttp {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn generate(&self, mut request: CompletionRequest) -> Result<String> {
        request.stream = false;
        let builder = self.post(&request)?;

        tracing::debug!(model = %request.model, turns = request.messages.len(), "Calling upstream");
        let response = builder.timeout(self.timeout).send().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to reach upstream");
            Error::Upstream(e)
        })?;
        let response = ensure_success(response).await?;

        let body: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                Error::UpstreamProtocol(format!("response body is not a chat completion: {}", e))
            } else {
                Error::Upstream(e)
            }
        })?;

        body.into_text().ok_or_else(|| {
            tracing::error!("Upstream response has no choices");
            Error::UpstreamProtocol("response contains no choices with message content".to_string())
        })
    }

    async fn generate_stream(&self, mut request: CompletionRequest) -> Result<FragmentStream> {
        request.stream = true;
        let builder = self
            .post(&request)?
            .header(header::ACCEPT, "text/event-stream");

        tracing::debug!(model = %request.model, turns = request.messages.len(), "Opening upstream stream");
        // Bounds the response head and any error body; a successful body may
        // stream for as long as it needs.
        let opened = tokio::time::timeout(self.timeout, async {
            let response = builder.send().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to reach upstream");
                Error::Upstream(e)
            })?;
            ensure_success(response).await
        })
        .await;
        let response = opened.map_err(|_| {
            tracing::error!(timeout = ?self.timeout, "Upstream stream did not open in time");
            Error::Timeout(self.timeout)
        })??;

        Ok(fragment_stream(response.bytes_stream()))
    }

    fn api_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
