//! Authenticated transport with bounded retries.
//!
//! ```text
//! ResourceClient ──► Transport::send ──► HttpTransport
//!                                          │ Authorization (allowlisted origins only)
//!                                          │ retry: connection errors, 429, 5xx
//!                                          │ 401: refresh token once
//!                                          ▼
//!                                        Backend::exchange (reqwest / MemoryService)
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::allowlist::OriginAllowlist;
use super::client::{Backend, ReqwestBackend, Request, Response};
use super::token::TokenProvider;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::logging_impl::LogConfig;

/// Request/response seam used by the resource layer.
///
/// Implementations return only successful (2xx) responses; everything else
/// becomes an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// [`Transport`] that signs requests and retries transient failures.
pub struct HttpTransport {
    backend: Arc<dyn Backend>,
    token: Arc<dyn TokenProvider>,
    allowlist: OriginAllowlist,
    auth_scheme: String,
    max_retries: u32,
    retry_delay: Duration,
    log: LogConfig,
}

impl HttpTransport {
    /// Transport over reqwest for the service described by `config`.
    pub fn new(config: &ServiceConfig, token: Arc<dyn TokenProvider>) -> Result<Self> {
        let backend = ReqwestBackend::new(config.timeout, config.max_response_bytes)?;
        Ok(Self::with_backend(Arc::new(backend), config, token))
    }

    /// Transport over an arbitrary backend, e.g. [`MemoryService`](super::MemoryService).
    pub fn with_backend(
        backend: Arc<dyn Backend>,
        config: &ServiceConfig,
        token: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            backend,
            token,
            allowlist: OriginAllowlist::for_service(&config.service_url),
            auth_scheme: config.auth_scheme.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            log: LogConfig::default(),
        }
    }

    fn authorize(&self, request: &Request, token: Option<&str>) -> Request {
        let mut outgoing = request.clone();
        if let Some(token) = token {
            outgoing
                .headers
                .push(("Authorization".to_string(), format!("{} {}", self.auth_scheme, token)));
        }
        outgoing
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = self.log.redact_url(&request.url).into_owned();
        let mut token = if self.allowlist.is_allowed(&request.url) {
            Some(self.token.token().await?)
        } else {
            tracing::debug!(url = %url, "foreign origin, sending without credentials");
            None
        };
        let mut refreshed = false;
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!(method = request.method.as_str(), url = %url, attempt, "request");
            let outgoing = self.authorize(&request, token.as_deref());

            let failure = match self.backend.exchange(&outgoing).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 401 && token.is_some() && !refreshed => {
                    tracing::warn!(url = %url, "unauthorized, refreshing token");
                    refreshed = true;
                    token = Some(self.token.refresh().await?);
                    continue;
                }
                Ok(response) if is_retryable_status(response.status) => {
                    format!("HTTP {}", response.status)
                }
                Ok(response) => {
                    return Err(Error::TransportFailure(format!(
                        "{} {}: HTTP {}",
                        request.method.as_str(),
                        url,
                        response.status
                    )));
                }
                Err(Error::TransportFailure(reason)) => reason,
                Err(e) => return Err(e),
            };

            if attempt >= self.max_retries {
                tracing::error!(url = %url, attempts = attempt + 1, "giving up: {}", failure);
                return Err(Error::TransportFailure(format!(
                    "{} {}: {} (after {} attempts)",
                    request.method.as_str(),
                    url,
                    failure,
                    attempt + 1
                )));
            }
            attempt += 1;
            tracing::warn!(
                url = %url,
                "{} - retrying in {:?} (attempt {}/{})",
                failure,
                self.retry_delay,
                attempt,
                self.max_retries
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
