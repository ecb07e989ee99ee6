//! Fetching with bounded retry
//!
//! Every error from the client counts as transient, 404 included. After the
//! last attempt the error is returned as [`FetchOutcome::Failure`].

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use whosurf_core::{ConfigError, FetchOutcome, RetryPolicy};

use crate::HttpFetch;

/// GETs a URL through a proxy-routed client, retrying with a fixed delay
#[derive(Debug, Clone)]
pub struct RetryingFetcher<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C: HttpFetch> RetryingFetcher<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch `url`, sleeping `policy.delay` between failed attempts
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, ConfigError> {
        self.run(url, None).await
    }

    /// Like [`fetch`](Self::fetch), but a pending retry wait is abandoned
    /// once `token` is cancelled.
    pub async fn fetch_until_cancelled(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<FetchOutcome, ConfigError> {
        self.run(url, Some(token)).await
    }

    async fn run(
        &self,
        url: &str,
        token: Option<&CancellationToken>,
    ) -> Result<FetchOutcome, ConfigError> {
        if url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }

        let max_attempts = self.policy.max_attempts();
        let delay = self.policy.delay();
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            if token.is_some_and(|t| t.is_cancelled()) {
                return Ok(cancelled(attempt - 1, max_attempts, last_error));
            }

            debug!("{}: attempt {}/{}", url, attempt, max_attempts);

            let err = match self.client.get_text(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}", url, attempt);
                    }
                    return Ok(FetchOutcome::Success(body));
                }
                Err(e) => e,
            };

            if !self.policy.allows_retry_after(attempt) {
                return Ok(FetchOutcome::Failure(format!(
                    "[!] error: {}. maximum number of attempts ({}) reached",
                    err, max_attempts
                )));
            }

            warn!(
                "[!] error: {}. attempt {} of {}, waiting {:?} before the next one",
                err, attempt, max_attempts, delay
            );
            last_error = Some(err.to_string());

            match token {
                Some(token) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => {
                            return Ok(cancelled(attempt, max_attempts, last_error));
                        }
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        unreachable!("retry loop returns on the final attempt")
    }
}

fn cancelled(attempts: u32, max_attempts: u32, last_error: Option<String>) -> FetchOutcome {
    let mut message = format!(
        "[!] cancelled after {} of {} attempts",
        attempts, max_attempts
    );
    if let Some(err) = last_error {
        message.push_str(&format!(", last error: {}", err));
    }
    FetchOutcome::Failure(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted responses; repeats the last one when exhausted
    struct ScriptedClient {
        script: Mutex<VecDeque<Result<String, String>>>,
        last: Result<String, String>,
        attempts: AtomicU32,
        calls_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<&str, &str>>) -> Self {
            let script: VecDeque<_> = script
                .into_iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string))
                .collect();
            let last = script.back().cloned().expect("non-empty script");
            Self {
                script: Mutex::new(script),
                last,
                attempts: AtomicU32::new(0),
                calls_at: Mutex::new(Vec::new()),
            }
        }

        fn always_failing(error: &str) -> Self {
            Self::new(vec![Err(error)])
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpFetch for ScriptedClient {
        async fn get_text(&self, _url: &str) -> Result<String, FetchError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.calls_at.lock().unwrap().push(Instant::now());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.clone());
            next.map_err(FetchError::Other)
        }
    }

    fn policy(max_attempts: u32, delay: Duration) -> RetryPolicy {
        RetryPolicy::new(max_attempts, delay).unwrap()
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let client = ScriptedClient::new(vec![Err("refused"), Err("refused"), Ok("OK")]);
        let fetcher = RetryingFetcher::new(client, policy(3, Duration::ZERO));

        let outcome = fetcher.fetch("http://check.torproject.org").await.unwrap();

        assert_eq!(outcome, FetchOutcome::Success("OK".to_string()));
        assert_eq!(fetcher.client().attempts(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_exhausts_attempts() {
        let client = ScriptedClient::always_failing("timeout");
        let fetcher = RetryingFetcher::new(client, policy(2, Duration::ZERO));

        let outcome = fetcher.fetch("http://i2p-projekt.i2p").await.unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.message().unwrap().contains("timeout"));
        assert_eq!(fetcher.client().attempts(), 2);
    }

    #[tokio::test]
    async fn test_bounded_attempts_for_several_limits() {
        for n in 1..=5 {
            let client = ScriptedClient::always_failing("HTTP status 404");
            let fetcher = RetryingFetcher::new(client, policy(n, Duration::ZERO));

            let outcome = fetcher.fetch("http://example.com").await.unwrap();

            assert!(!outcome.is_success());
            assert_eq!(fetcher.client().attempts(), n);
        }
    }

    #[tokio::test]
    async fn test_early_success_stops_retrying() {
        let client = ScriptedClient::new(vec![Err("refused"), Ok("first body"), Ok("second body")]);
        let fetcher = RetryingFetcher::new(client, policy(5, Duration::ZERO));

        let outcome = fetcher.fetch("http://example.com").await.unwrap();

        assert_eq!(outcome.body(), Some("first body"));
        assert_eq!(fetcher.client().attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_never_sleeps() {
        let client = ScriptedClient::always_failing("refused");
        let fetcher = RetryingFetcher::new(client, policy(1, Duration::from_secs(60)));

        let start = Instant::now();
        let outcome = fetcher.fetch("http://example.com").await.unwrap();

        assert!(!outcome.is_success());
        assert_eq!(fetcher.client().attempts(), 1);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_delay_between_attempts_only() {
        let delay = Duration::from_secs(5);
        let client = ScriptedClient::always_failing("refused");
        let fetcher = RetryingFetcher::new(client, policy(3, delay));

        let start = Instant::now();
        fetcher.fetch("http://example.com").await.unwrap();

        let calls = fetcher.client().calls_at.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
        // Two waits, none after the final attempt.
        let elapsed = start.elapsed();
        assert!(elapsed >= delay * 2);
        assert!(elapsed < delay * 3);
    }

    #[tokio::test]
    async fn test_empty_url_rejected_before_any_attempt() {
        let client = ScriptedClient::new(vec![Ok("unused")]);
        let fetcher = RetryingFetcher::new(client, RetryPolicy::default());

        assert_eq!(fetcher.fetch("  ").await, Err(ConfigError::EmptyUrl));
        assert_eq!(fetcher.client().attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_stops_retrying() {
        let client = std::sync::Arc::new(ScriptedClient::always_failing("refused"));
        let fetcher = RetryingFetcher::new(client.clone(), policy(3, Duration::from_secs(60)));
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let start = Instant::now();
        let outcome = fetcher
            .fetch_until_cancelled("http://example.com", &token)
            .await
            .unwrap();
        canceller.await.unwrap();

        let message = outcome.message().unwrap();
        assert!(message.contains("cancelled after 1 of 3"));
        assert!(message.contains("refused"));
        assert_eq!(client.attempts(), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let client = ScriptedClient::new(vec![Ok("unused")]);
        let fetcher = RetryingFetcher::new(client, RetryPolicy::default());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = fetcher
            .fetch_until_cancelled("http://example.com", &token)
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(fetcher.client().attempts(), 0);
    }
}
