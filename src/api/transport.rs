//! HTTP transport seam.
//!
//! A [`Transport`] sends exactly one request and hands back the raw status,
//! headers and body stream. It does not interpret status codes; that is the
//! job of [`ApiClient`](super::ApiClient), so every transport (including test
//! fakes) gets the same classification.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use thiserror::Error;

use super::client::{ClientOptions, USER_AGENT};
use crate::config::ApiToken;
use crate::error::{ProviderError, Result};

/// `Accept` header value; downloads share the transport with JSON calls.
pub const ACCEPT_VALUE: &str = "application/json, application/octet-stream";

/// A boxed stream of response body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// HTTP methods used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully qualified URL without query string.
    pub url: String,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// JSON body. `None` means no body is sent at all.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request with no query parameters and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    /// Attach query parameters.
    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response returned by a [`Transport`].
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: Vec<(String, String)>,
    /// Unconsumed response body.
    pub body: BodyStream,
}

impl TransportResponse {
    /// Create a response from a status code and body stream.
    pub fn new(status: u16, body: BodyStream) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Create a response whose body is delivered as the given chunks.
    pub fn from_chunks(status: u16, chunks: Vec<Bytes>) -> Self {
        let stream = futures_util::stream::iter(chunks.into_iter().map(Ok));
        Self::new(status, Box::pin(stream))
    }

    /// Whether the status signals failure.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        let mut body = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The request could not be sent or no response was received.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends one authenticated request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request` and return the unclassified response.
    async fn send(&self, request: ApiRequest) -> std::result::Result<TransportResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    token: ApiToken,
}

impl ReqwestTransport {
    /// Build a transport that authenticates with `token`.
    pub fn new(token: ApiToken, options: &ClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, token })
    }

    fn request_builder(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(AUTHORIZATION, format!("ApiToken {}", self.token.expose()))
            .header(ACCEPT, ACCEPT_VALUE);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        // `json` also sets Content-Type; without a body neither is sent.
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> std::result::Result<TransportResponse, TransportError> {
        let response = self
            .request_builder(&request)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(TransportResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Masked;
    use reqwest::header::CONTENT_TYPE;

    #[test]
    fn test_method_names() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Patch.as_str(), "PATCH");
    }

    #[test]
    fn test_request_builder_defaults_to_no_body() {
        let req = ApiRequest::new(Method::Get, "https://example.test/web/api/v2.1/groups");
        assert!(req.body.is_none());
        assert!(req.query.is_empty());

        let req = ApiRequest::new(Method::Post, "https://example.test")
            .with_body(serde_json::json!({"name": "x"}));
        assert!(req.body.is_some());
    }

    #[tokio::test]
    async fn test_response_into_bytes_concatenates_chunks() {
        let resp = TransportResponse::from_chunks(
            200,
            vec![Bytes::from_static(b"hello "), Bytes::from_static(b"world")],
        );
        assert!(!resp.is_error());
        assert_eq!(resp.into_bytes().await.unwrap(), b"hello world");
    }

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(Masked::new("tok-123".to_string()), &ClientOptions::default()).unwrap()
    }

    #[test]
    fn test_get_is_sent_without_body_or_content_type() {
        let request = ApiRequest::new(Method::Get, "https://example.test/web/api/v2.1/sites")
            .with_query(BTreeMap::from([("siteIds".to_string(), "s-1".to_string())]));
        let built = transport().request_builder(&request).build().unwrap();

        assert_eq!(*built.method(), reqwest::Method::GET);
        assert_eq!(built.url().query(), Some("siteIds=s-1"));
        assert!(built.body().is_none());
        assert!(built.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(built.headers()[AUTHORIZATION], "ApiToken tok-123");
        assert_eq!(built.headers()[ACCEPT], ACCEPT_VALUE);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = ApiRequest::new(Method::Post, "https://example.test/web/api/v2.1/groups")
            .with_body(serde_json::json!({"name": "Servers"}));
        let built = transport().request_builder(&request).build().unwrap();

        assert_eq!(*built.method(), reqwest::Method::POST);
        assert_eq!(built.url().query(), None);
        assert_eq!(built.headers()[CONTENT_TYPE], "application/json");
        let body = built.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"name":"Servers"}"#);
    }

    #[test]
    fn test_reqwest_transport_debug_hides_token() {
        let transport =
            ReqwestTransport::new(Masked::new("tok-123".to_string()), &ClientOptions::default())
                .unwrap();
        assert!(!format!("{:?}", transport).contains("tok-123"));
    }
}
