//! Loopback proxy and control endpoints

use std::fmt;
use std::time::Duration;

use crate::{ConfigError, DEFAULT_TIMEOUT_SECS, LOOPBACK_HOST};

/// Proxy protocol exposed by the local overlay daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    /// SOCKS5 with hostname resolution on the proxy side (Tor)
    Socks5,
    /// Plain HTTP forward proxy (I2P)
    Http,
}

impl ProxyScheme {
    /// URL scheme handed to the HTTP client.
    ///
    /// SOCKS5 renders as `socks5h` so names, `.onion` included, never
    /// resolve locally.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            ProxyScheme::Socks5 => "socks5h",
            ProxyScheme::Http => "http",
        }
    }
}

/// Anonymizing overlay a fetch is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tor,
    I2p,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Tor => "Tor",
            Network::I2p => "I2P",
        }
    }

    pub fn proxy_scheme(&self) -> ProxyScheme {
        match self {
            Network::Tor => ProxyScheme::Socks5,
            Network::I2p => ProxyScheme::Http,
        }
    }

    /// Only Tor exposes a control channel for circuit renewal
    pub fn supports_renewal(&self) -> bool {
        matches!(self, Network::Tor)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_port(port: u16) -> Result<u16, ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort(port));
    }
    Ok(port)
}

/// Local proxy address a client routes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyEndpoint {
    port: u16,
    scheme: ProxyScheme,
}

impl ProxyEndpoint {
    pub fn new(port: u16, scheme: ProxyScheme) -> Result<Self, ConfigError> {
        Ok(Self {
            port: check_port(port)?,
            scheme,
        })
    }

    pub fn host(&self) -> &'static str {
        LOOPBACK_HOST
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Proxy URL, e.g. `socks5h://127.0.0.1:9050`
    pub fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.url_scheme(), LOOPBACK_HOST, self.port)
    }
}

/// Tor control listener on loopback
#[derive(Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    port: u16,
    password: Option<String>,
    timeout: Duration,
}

impl ControlEndpoint {
    pub fn new(port: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            port: check_port(port)?,
            password: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Password for HASHEDPASSWORD authentication.
    ///
    /// Line breaks would end the AUTHENTICATE command early, so they are rejected.
    pub fn with_password(mut self, password: impl Into<String>) -> Result<Self, ConfigError> {
        let password = password.into();
        if password.contains(|c| c == '\r' || c == '\n') {
            return Err(ConfigError::InvalidPassword);
        }
        self.password = Some(password);
        Ok(self)
    }

    /// Limit for connecting and for each command round-trip
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// `host:port` socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", LOOPBACK_HOST, self.port)
    }
}

// Keep the password out of logs.
impl fmt::Debug for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlEndpoint")
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}
