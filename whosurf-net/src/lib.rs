//! whosurf Net Layer
//!
//! Networking over local overlay proxies:
//! - Proxy-routed HTTP client (SOCKS5h for Tor, HTTP for I2P)
//! - Fetching with bounded retry
//! - Tor control-port client and circuit renewal

pub mod control;
pub mod fetcher;
pub mod proxy;
pub mod renewer;

pub use control::*;
pub use fetcher::*;
pub use proxy::*;
pub use renewer::*;
