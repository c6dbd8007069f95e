use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, header::HeaderMap};
use thiserror::Error;

use super::render::{RenderError, Renderer};
use super::types::exception;

/// A single HTTP request issued by a check
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: String,
    pub timeout: Duration,
    /// Whether the body is needed for the verdict
    pub read_body: bool,
}

impl ProbeRequest {
    pub fn head(url: &str, timeout: Duration) -> Self {
        Self { method: Method::HEAD, url: url.to_string(), timeout, read_body: false }
    }

    pub fn get(url: &str, timeout: Duration) -> Self {
        Self { method: Method::GET, url: url.to_string(), timeout, read_body: false }
    }

    pub fn with_body(mut self) -> Self {
        self.read_body = true;
        self
    }
}

/// What a check gets to judge
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    /// Canonical reason phrase for `status`, if any
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Transport-level failures, before any verdict could be made
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Rendering failed: {0}")]
    Render(String),
}

impl ProbeError {
    /// Exception kind recorded on the failed result
    pub fn exception_type(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => exception::TIMEOUT,
            ProbeError::Connection(_) => exception::CONNECTION,
            ProbeError::Request(_) => exception::REQUEST,
            ProbeError::Body(_) => exception::BODY,
            ProbeError::Render(_) => exception::RENDER,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        let detail = describe(&error);
        if error.is_timeout() {
            ProbeError::Timeout(detail)
        } else if error.is_connect() {
            ProbeError::Connection(detail)
        } else if error.is_body() || error.is_decode() {
            ProbeError::Body(detail)
        } else {
            ProbeError::Request(detail)
        }
    }
}

impl From<RenderError> for ProbeError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::Timeout(_) => ProbeError::Timeout(error.to_string()),
            other => ProbeError::Render(other.to_string()),
        }
    }
}

/// Flatten an error and its sources into one line
fn describe(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        let inner_message = inner.to_string();
        if !message.contains(&inner_message) {
            message = format!("{message}: {inner_message}");
        }
        source = inner.source();
    }
    message
}

/// Network access used by checks
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Issue one HTTP request
    async fn fetch(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError>;

    /// Load `url` in a browser and return the rendered DOM
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    renderer: Arc<dyn Renderer>,
}

impl HttpChecker {
    pub fn new(user_agent: &str, renderer: Arc<dyn Renderer>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(Self { client, renderer })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn fetch(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let response = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(ProbeError::from_reqwest)?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = if request.read_body {
            Some(response.text().await.map_err(ProbeError::from_reqwest)?)
        } else {
            None
        };

        Ok(ProbeResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }

    async fn render(&self, url: &str, timeout: Duration) -> Result<String, ProbeError> {
        Ok(self.renderer.render(url, timeout).await?)
    }
}
