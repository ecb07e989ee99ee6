//! whosurf Core - Domain model for fetching over anonymizing overlays
//!
//! This crate provides the foundational types:
//! - Proxy and control endpoints on loopback
//! - Retry policy for proxy-routed fetches
//! - Fetch outcomes surfaced to the caller
//! - Per-network configuration with documented defaults

pub mod config;
pub mod endpoint;
pub mod error;
pub mod outcome;
pub mod retry;

pub use config::*;
pub use endpoint::*;
pub use error::*;
pub use outcome::*;
pub use retry::*;

/// Loopback host every proxy and control endpoint binds to
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Default Tor SOCKS port
pub const DEFAULT_TOR_SOCKS_PORT: u16 = 9050;

/// Default Tor control port
pub const DEFAULT_TOR_CONTROL_PORT: u16 = 9051;

/// Default I2P HTTP proxy port
pub const DEFAULT_I2P_HTTP_PORT: u16 = 4444;

/// Default URL fetched over Tor
pub const DEFAULT_TOR_URL: &str = "http://check.torproject.org";

/// Default URL fetched over I2P
pub const DEFAULT_I2P_URL: &str = "http://i2p-projekt.i2p";

/// Default number of fetch attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between fetch attempts in seconds
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
