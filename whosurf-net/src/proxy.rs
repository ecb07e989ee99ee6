//! Proxy-routed HTTP client
//!
//! Creates HTTP clients that send every request through a local overlay proxy.

use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use whosurf_core::ProxyEndpoint;

/// Errors from a single fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build proxy client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

/// Something that can GET a URL and hand back the body as text.
///
/// Any error is treated as transient by the fetcher.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: HttpFetch + ?Sized> HttpFetch for Arc<T> {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        (**self).get_text(url).await
    }
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// HTTP client bound to one local proxy endpoint
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    endpoint: ProxyEndpoint,
}

impl ProxyClient {
    /// Build a client routing HTTP and HTTPS through `endpoint`
    pub fn new(endpoint: ProxyEndpoint, timeout: Duration) -> Result<Self, FetchError> {
        let proxy = Proxy::all(endpoint.proxy_url())
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .user_agent(random_user_agent())
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl HttpFetch for ProxyClient {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {} via {}", url, self.endpoint.proxy_url());

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
