//! Tor circuit renewal
//!
//! One attempt only: open a control session, authenticate, send NEWNYM,
//! close. The session is closed on every path once it has been opened.

use thiserror::Error;
use tracing::{info, warn};

use whosurf_core::ControlEndpoint;

use crate::{CircuitController, ControlError, Signal, TorController};

/// Which renewal step failed
#[derive(Debug, Error)]
pub enum RenewError {
    #[error("Could not reach control port: {0}")]
    Connect(#[source] ControlError),

    #[error("Control port authentication failed: {0}")]
    Authenticate(#[source] ControlError),

    #[error("NEWNYM signal failed: {0}")]
    Signal(#[source] ControlError),
}

/// Ask the Tor daemon behind `endpoint` for a new identity.
///
/// Whether the daemon actually switched circuits is not checked.
pub async fn renew_identity(endpoint: &ControlEndpoint) -> Result<(), RenewError> {
    let mut controller = TorController::connect(endpoint)
        .await
        .map_err(RenewError::Connect)?;

    renew_session(&mut controller).await
}

/// Authenticate and signal NEWNYM on an open session, then close it
pub async fn renew_session<C>(session: &mut C) -> Result<(), RenewError>
where
    C: CircuitController + ?Sized,
{
    let result = async {
        session
            .authenticate()
            .await
            .map_err(RenewError::Authenticate)?;
        session
            .signal(Signal::NewNym)
            .await
            .map_err(RenewError::Signal)
    }
    .await;

    if let Err(e) = session.close().await {
        warn!("Failed to close control session: {}", e);
    }

    if result.is_ok() {
        info!("New Tor identity requested");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::{fake_control_port, silent_control_port};
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeController {
        fail_auth: bool,
        fail_signal: bool,
        fail_close: bool,
        calls: Vec<&'static str>,
    }

    impl FakeController {
        fn closes(&self) -> usize {
            self.calls.iter().filter(|c| **c == "close").count()
        }
    }

    fn rejected(message: &str) -> ControlError {
        ControlError::Rejected {
            code: 515,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl CircuitController for FakeController {
        async fn authenticate(&mut self) -> Result<(), ControlError> {
            self.calls.push("authenticate");
            if self.fail_auth {
                return Err(rejected("Authentication failed"));
            }
            Ok(())
        }

        async fn signal(&mut self, signal: Signal) -> Result<(), ControlError> {
            assert_eq!(signal, Signal::NewNym);
            self.calls.push("signal");
            if self.fail_signal {
                return Err(rejected("Unrecognized signal"));
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ControlError> {
            self.calls.push("close");
            if self.fail_close {
                return Err(ControlError::Closed);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_closes_session() {
        let mut session = FakeController::default();

        renew_session(&mut session).await.unwrap();

        assert_eq!(session.calls, vec!["authenticate", "signal", "close"]);
    }

    #[tokio::test]
    async fn test_auth_failure_still_closes() {
        let mut session = FakeController {
            fail_auth: true,
            ..Default::default()
        };

        let err = renew_session(&mut session).await.unwrap_err();

        assert!(matches!(err, RenewError::Authenticate(_)));
        assert_eq!(session.calls, vec!["authenticate", "close"]);
    }

    #[tokio::test]
    async fn test_signal_failure_still_closes() {
        let mut session = FakeController {
            fail_signal: true,
            ..Default::default()
        };

        let err = renew_session(&mut session).await.unwrap_err();

        assert!(matches!(err, RenewError::Signal(_)));
        assert_eq!(session.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_success() {
        let mut session = FakeController {
            fail_close: true,
            ..Default::default()
        };

        assert!(renew_session(&mut session).await.is_ok());
        assert_eq!(session.closes(), 1);
    }

    #[tokio::test]
    async fn test_rejected_authentication_over_control_port() {
        let (endpoint, received) = fake_control_port(|cmd| match cmd {
            "PROTOCOLINFO 1" => {
                "250-PROTOCOLINFO 1\r\n250-AUTH METHODS=NULL\r\n250 OK\r\n".to_string()
            }
            _ => "515 Authentication failed\r\n".to_string(),
        })
        .await;

        let err = renew_identity(&endpoint).await.unwrap_err();

        assert!(matches!(err, RenewError::Authenticate(_)));
        let received = received.lock().unwrap().clone();
        assert!(!received.iter().any(|c| c.starts_with("SIGNAL")));
        assert_eq!(received.last().map(String::as_str), Some("QUIT"));
    }

    #[tokio::test]
    async fn test_unreachable_control_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = ControlEndpoint::new(port).unwrap();
        let err = renew_identity(&endpoint).await.unwrap_err();
        assert!(matches!(err, RenewError::Connect(_)));
    }

    #[tokio::test]
    async fn test_silent_control_port_is_reported() {
        let endpoint = silent_control_port().await;

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(5), renew_identity(&endpoint)).await;

        let err = result
            .expect("renewal must give up on a silent control port")
            .unwrap_err();
        assert!(matches!(
            err,
            RenewError::Authenticate(ControlError::Timeout(_))
        ));
    }
}
