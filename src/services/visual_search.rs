use crate::models::SearchRequest;
use crate::services::staging::StagedFile;
use async_trait::async_trait;
use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::io;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use url::Url;

/// Header carrying the upstream subscription key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),

    #[error("upstream answered with status {status}")]
    Rejected { status: u16 },

    #[error("upstream returned malformed JSON: {0}")]
    MalformedUpstreamResponse(#[from] serde_json::Error),

    #[error("could not read staged file: {0}")]
    Io(#[from] io::Error),
}

/// Raw JSON returned by the upstream service, relayed untouched.
#[derive(Debug, Clone)]
pub struct UpstreamResult {
    pub body: Bytes,
}

impl IntoResponse for UpstreamResult {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

/// Trait for visual search backends
#[async_trait]
pub trait VisualSearchClient: Send + Sync {
    /// Send the staged image with the validated parameters. Called exactly once per
    /// request; never retried.
    async fn search(
        &self,
        staged: &StagedFile,
        request: &SearchRequest,
    ) -> Result<UpstreamResult, ProxyError>;
}

/// Client for the Bing Visual Search REST endpoint.
pub struct BingVisualSearchClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl BingVisualSearchClient {
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Base endpoint with `mkt` and `safesearch` appended.
    pub fn endpoint(&self, request: &SearchRequest) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("mkt", request.market.as_str())
            .append_pair("safesearch", request.safe_search.as_str());
        url
    }
}

#[async_trait]
impl VisualSearchClient for BingVisualSearchClient {
    async fn search(
        &self,
        staged: &StagedFile,
        request: &SearchRequest,
    ) -> Result<UpstreamResult, ProxyError> {
        let file = tokio::fs::File::open(staged.path()).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, staged.size_bytes)
            .file_name(staged.original_name.clone())
            .mime_str(&staged.mime_type)?;
        let form = Form::new().part("image", part);

        let url = self.endpoint(request);
        info!(
            "🔎 Forwarding {} ({} bytes) upstream [mkt={}, safesearch={}]",
            staged.original_name, staged.size_bytes, request.market, request.safe_search
        );

        let resp = self
            .http
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            warn!(
                "Upstream rejected request with {}: {}",
                status,
                String::from_utf8_lossy(&body)
            );
            return Err(ProxyError::Rejected {
                status: status.as_u16(),
            });
        }

        // Validate only; the original bytes are what the client receives
        serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;

        Ok(UpstreamResult { body })
    }
}
