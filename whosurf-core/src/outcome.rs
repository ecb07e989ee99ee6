//! Terminal result of a fetch

use std::fmt;

/// What a fetch produced: the response body, or the last error once
/// attempts ran out. Network failures end up here, never as a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    Failure(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// Response body, if the fetch succeeded
    pub fn body(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success(body) => Some(body),
            FetchOutcome::Failure(_) => None,
        }
    }

    /// Failure message, if the fetch failed
    pub fn message(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure(message) => Some(message),
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success(body) => f.write_str(body),
            FetchOutcome::Failure(message) => f.write_str(message),
        }
    }
}
