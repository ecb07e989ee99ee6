//! Configuration errors

use thiserror::Error;

/// Precondition violations, rejected before any network activity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("URL must not be empty")]
    EmptyUrl,

    #[error("Control password must not contain line breaks")]
    InvalidPassword,
}
