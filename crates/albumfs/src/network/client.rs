//! Single HTTP exchanges.
//!
//! A [`Backend`] performs exactly one request and reports whatever status the
//! server answered with. Authentication, origin checks and retries live one
//! layer up in [`HttpTransport`](super::HttpTransport).
//!
//! # Limits
//!
//! - Response bodies are capped at `max_response_bytes` (64 MiB default),
//!   checked against Content-Length and again while streaming
//! - Connect timeout 10s, overall timeout from `ServiceConfig::timeout`
//! - Redirects are not followed, so credentials never leave the origin
//!   through a `Location` header
//! - Automatic decompression is disabled

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{Error, Result};

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(Method::Post, url).body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// First header value with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Check if the response was successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request, one response.
///
/// Connection-level failures (refused, reset, timed out) are reported as
/// [`Error::TransportFailure`] and may be retried; any other error is final.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn exchange(&self, request: &Request) -> Result<Response>;
}

/// [`Backend`] over a reqwest client.
pub struct ReqwestBackend {
    client: Client,
    /// Maximum response body size in bytes
    max_response_bytes: usize,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Result<Self> {
        // reqwest is built with `rustls-no-provider`; install ring once per process.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("albumfs/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| Error::TransportFailure(format!("failed to create client: {}", e)))?;
        Ok(Self {
            client,
            max_response_bytes,
        })
    }

    /// Read response body with size limit enforcement.
    async fn read_body_with_limit(&self, response: reqwest::Response) -> Result<Vec<u8>> {
        use futures_util::StreamExt;

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                Error::TransportFailure(format!("failed to read response chunk: {}", e))
            })?;

            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(Error::protocol(format!(
                    "response too large: exceeded {} bytes limit",
                    self.max_response_bytes
                )));
            }

            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl Backend for ReqwestBackend {
    async fn exchange(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.as_reqwest(), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::TransportFailure("operation timed out".to_string())
            } else {
                Error::TransportFailure(format!("request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();

        // Fail fast on a declared oversize body
        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_response_bytes {
                return Err(Error::protocol(format!(
                    "response too large: {} bytes (max: {} bytes)",
                    content_length, self.max_response_bytes
                )));
            }
        }

        let body = self.read_body_with_limit(response).await?;

        Ok(Response::new(status, body))
    }
}
