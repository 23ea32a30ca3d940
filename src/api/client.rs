//! The API client: URL construction, request execution and status
//! classification.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, instrument};

use super::envelope::Envelope;
use super::query::QueryMap;
use super::transport::{ApiRequest, BodyStream, Method, ReqwestTransport, Transport, TransportResponse};
use crate::config::{ApiToken, ResolvedConfig};
use crate::error::{ProviderError, Result};

/// Path prefix of every API call.
pub const API_BASE_URI: &str = "/web/api/v2.1";

/// User-Agent sent with every request.
pub const USER_AGENT: &str = "SentinelOne-Singularity-Hemmer-Provider";

/// Tuning knobs for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum number of pages a single drain may fetch. `None` is unbounded.
    pub max_pages: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            max_pages: None,
        }
    }
}

/// Authenticated client for the Singularity REST API.
///
/// Cloning is cheap; clones share the underlying transport.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for `endpoint` using the production HTTP transport.
    pub fn new(endpoint: &str, token: ApiToken, options: ClientOptions) -> Result<Self> {
        let transport = ReqwestTransport::new(token, &options)?;
        Ok(Self::with_transport(
            base_url_for(endpoint),
            Arc::new(transport),
            options,
        ))
    }

    /// Create a client from resolved provider configuration.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        Self::new(
            &config.api_endpoint,
            config.api_token.clone(),
            config.options.clone(),
        )
    }

    /// Create a client over an arbitrary transport.
    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            options,
        }
    }

    /// Base URL including the API path prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client options.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Fully qualified URL for `uri`.
    pub fn url(&self, uri: &str) -> String {
        format!("{}/{}", self.base_url, uri.trim_start_matches('/'))
    }

    /// `GET` a JSON endpoint.
    pub async fn get(&self, uri: &str, query: &QueryMap) -> Result<Envelope> {
        let request = ApiRequest::new(Method::Get, self.url(uri)).with_query(query.clone());
        self.execute_json(request).await
    }

    /// `POST` a JSON body.
    pub async fn post(&self, uri: &str, body: serde_json::Value) -> Result<Envelope> {
        let request = ApiRequest::new(Method::Post, self.url(uri)).with_body(body);
        self.execute_json(request).await
    }

    /// `PUT` a JSON body.
    pub async fn put(&self, uri: &str, body: serde_json::Value) -> Result<Envelope> {
        let request = ApiRequest::new(Method::Put, self.url(uri)).with_body(body);
        self.execute_json(request).await
    }

    /// `PATCH` a JSON body.
    pub async fn patch(&self, uri: &str, body: serde_json::Value) -> Result<Envelope> {
        let request = ApiRequest::new(Method::Patch, self.url(uri)).with_body(body);
        self.execute_json(request).await
    }

    /// `DELETE` with an optional JSON body.
    pub async fn delete(&self, uri: &str, body: Option<serde_json::Value>) -> Result<Envelope> {
        let mut request = ApiRequest::new(Method::Delete, self.url(uri));
        request.body = body;
        self.execute_json(request).await
    }

    /// `GET` an endpoint whose successful body is raw bytes.
    pub async fn get_stream(&self, uri: &str, query: &QueryMap) -> Result<DownloadStream> {
        let request = ApiRequest::new(Method::Get, self.url(uri)).with_query(query.clone());
        let url = request.url.clone();
        let response = self.execute(request).await?;
        Ok(DownloadStream {
            url,
            body: response.body,
        })
    }

    async fn execute_json(&self, request: ApiRequest) -> Result<Envelope> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.execute(request).await?;
        let status = response.status;

        let body = response
            .into_bytes()
            .await
            .map_err(|e| transport_error(method, &url, format!("reading response body: {e}")))?;

        Envelope::decode(&body)
            .map_err(|e| ProviderError::decode(format!("{method} {url} (HTTP {status})"), e))
    }

    /// Send `request`, turning transport failures and error statuses into
    /// [`ProviderError`]s.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: ApiRequest) -> Result<TransportResponse> {
        let method = request.method;
        let url = request.url.clone();

        debug!(query = ?request.query, "executing API request");
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| transport_error(method, &url, e.to_string()))?;
        debug!(status = response.status, "received API response");

        if !response.is_error() {
            return Ok(response);
        }

        let status = response.status;
        let body = response
            .into_bytes()
            .await
            .map_err(|e| transport_error(method, &url, format!("reading error body: {e}")))?;
        Err(classify_failure(method, &url, status, &body))
    }
}

/// Build the base URL for an endpoint hostname.
pub fn base_url_for(endpoint: &str) -> String {
    let host = endpoint.strip_prefix("https://").unwrap_or(endpoint);
    format!("https://{}{}", host.trim_end_matches('/'), API_BASE_URI)
}

fn transport_error(method: Method, url: &str, message: String) -> ProviderError {
    ProviderError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        message,
    }
}

fn classify_failure(method: Method, url: &str, status: u16, body: &[u8]) -> ProviderError {
    match Envelope::decode(body) {
        Ok(envelope) if !envelope.errors.is_empty() => {
            for e in &envelope.errors {
                error!(
                    status,
                    api_code = e.code,
                    summary = %e.title,
                    details = %e.detail,
                    "API returned an error"
                );
            }
            ProviderError::Api {
                method: method.to_string(),
                url: url.to_string(),
                status,
                errors: envelope.errors,
            }
        }
        _ => {
            error!(status, "API returned an error without an error envelope");
            ProviderError::Http {
                method: method.to_string(),
                url: url.to_string(),
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            }
        }
    }
}

/// Body of a successful binary response, not yet consumed.
pub struct DownloadStream {
    url: String,
    body: BodyStream,
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl DownloadStream {
    /// Copy the body into `writer` chunk by chunk, returning the number of
    /// bytes written. `dest` names the writer in error messages.
    pub async fn write_to<W>(self, writer: &mut W, dest: &Path) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut body = self.body;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                transport_error(Method::Get, &self.url, format!("reading download body: {e}"))
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| ProviderError::filesystem("write", dest, e))?;
            written += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| ProviderError::filesystem("flush", dest, e))?;
        Ok(written)
    }
}
