//! reqwest-backed HTTP client

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use wakehub_core::traits::{HttpClient, HttpResponse};
use wakehub_core::{Error, Result};

/// Redirects followed before giving up
pub const MAX_REDIRECTS: usize = 5;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("wakehub/", env!("CARGO_PKG_VERSION"));

/// Map a reqwest error onto the core taxonomy
pub(crate) fn map_reqwest_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("GET {}", url))
    } else {
        Error::http(format!("GET {}: {}", url, err))
    }
}

/// Shared client used for metadata lookups, echo endpoints and the DNS API
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build the client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Underlying reqwest client
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        debug!("GET {} -> {} ({} bytes)", redact_query(url), status, body.len());
        Ok(HttpResponse::new(status, body))
    }
}

/// Strip the query string, which may carry signatures
pub(crate) fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
