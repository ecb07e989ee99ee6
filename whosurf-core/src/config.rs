//! Per-network configuration
//!
//! Immutable per invocation; built from CLI arguments or `Default`.

use std::time::Duration;

use crate::{
    ConfigError, ControlEndpoint, Network, ProxyEndpoint, RetryPolicy, DEFAULT_I2P_HTTP_PORT,
    DEFAULT_I2P_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_TOR_CONTROL_PORT, DEFAULT_TOR_SOCKS_PORT,
    DEFAULT_TOR_URL,
};

/// Tor fetch + renewal configuration
#[derive(Debug, Clone)]
pub struct TorConfig {
    /// SOCKS port (default: 9050)
    pub socks_port: u16,
    /// Control port (default: 9051)
    pub control_port: u16,
    /// Password for the control port, if it uses HASHEDPASSWORD
    pub control_password: Option<String>,
    /// URL to fetch
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry policy for the fetch
    pub retry: RetryPolicy,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_port: DEFAULT_TOR_SOCKS_PORT,
            control_port: DEFAULT_TOR_CONTROL_PORT,
            control_password: None,
            url: DEFAULT_TOR_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl TorConfig {
    pub fn proxy_endpoint(&self) -> Result<ProxyEndpoint, ConfigError> {
        ProxyEndpoint::new(self.socks_port, Network::Tor.proxy_scheme())
    }

    pub fn control_endpoint(&self) -> Result<ControlEndpoint, ConfigError> {
        let endpoint = ControlEndpoint::new(self.control_port)?.with_timeout(self.timeout());
        match &self.control_password {
            Some(password) => endpoint.with_password(password.clone()),
            None => Ok(endpoint),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// I2P fetch configuration
#[derive(Debug, Clone)]
pub struct I2pConfig {
    /// HTTP proxy port (default: 4444)
    pub http_port: u16,
    /// URL to fetch
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry policy for the fetch
    pub retry: RetryPolicy,
}

impl Default for I2pConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_I2P_HTTP_PORT,
            url: DEFAULT_I2P_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl I2pConfig {
    pub fn proxy_endpoint(&self) -> Result<ProxyEndpoint, ConfigError> {
        ProxyEndpoint::new(self.http_port, Network::I2p.proxy_scheme())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
