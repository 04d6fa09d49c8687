//! Stepped-backoff reconnection policy for the hub connection.
//!
//! The first attempt after a drop happens immediately, then the client
//! waits 2 s, 10 s and 30 s, and keeps retrying every 30 s until the
//! connection is restored or the [`CancellationToken`] is triggered.

use std::time::Duration;

use resumeai_core::auth::TokenProvider;
use tokio_util::sync::CancellationToken;

use crate::transport::{Connection, Transport, TransportError};

/// Tunable parameters for the backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before retry `n` is `delays[n]`; the last entry repeats.
    pub delays: Vec<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
        }
    }
}

/// Delay to wait before retry number `retry` (0-based).
///
/// Past the end of the schedule the last entry is reused. An empty
/// schedule retries without waiting.
pub fn delay_for_retry(retry: usize, config: &ReconnectConfig) -> Duration {
    config
        .delays
        .get(retry)
        .or_else(|| config.delays.last())
        .copied()
        .unwrap_or(Duration::ZERO)
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `true` if the full delay elapsed.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Fetch a fresh bearer token and open one connection.
///
/// Token failures are reported as [`TransportError::Auth`] so the
/// caller can treat them like any other failed attempt.
pub async fn open_connection(
    transport: &dyn Transport,
    tokens: &dyn TokenProvider,
) -> Result<Connection, TransportError> {
    let token = tokens
        .bearer_token()
        .await
        .map_err(|e| TransportError::Auth(e.to_string()))?;
    transport.connect(&token).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_immediate() {
        let config = ReconnectConfig::default();
        assert_eq!(delay_for_retry(0, &config), Duration::ZERO);
    }

    #[test]
    fn full_backoff_sequence() {
        let config = ReconnectConfig::default();
        let expected = [0, 2, 10, 30, 30, 30, 30];

        for (retry, &expected_secs) in expected.iter().enumerate() {
            assert_eq!(delay_for_retry(retry, &config).as_secs(), expected_secs);
        }
    }

    #[test]
    fn custom_schedule_repeats_last_entry() {
        let config = ReconnectConfig {
            delays: vec![Duration::from_millis(5), Duration::from_millis(50)],
        };
        assert_eq!(delay_for_retry(1, &config), Duration::from_millis(50));
        assert_eq!(delay_for_retry(9, &config), Duration::from_millis(50));
    }

    #[test]
    fn empty_schedule_never_waits() {
        let config = ReconnectConfig { delays: Vec::new() };
        assert_eq!(delay_for_retry(3, &config), Duration::ZERO);
    }

    #[tokio::test]
    async fn cancellation_token_interrupts_sleep() {
        let cancel = CancellationToken::new();
        // Cancel immediately; a 30 s wait must return at once.
        cancel.cancel();

        let slept = tokio::time::timeout(
            Duration::from_secs(1),
            sleep_or_cancel(Duration::from_secs(30), &cancel),
        )
        .await
        .expect("sleep_or_cancel should not block when cancelled");
        assert!(!slept);
    }

    #[tokio::test]
    async fn zero_delay_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::ZERO, &cancel).await);
    }

    #[tokio::test]
    async fn missing_token_is_auth_error() {
        struct NeverConnects;

        #[async_trait::async_trait]
        impl Transport for NeverConnects {
            async fn connect(&self, _token: &str) -> Result<Connection, TransportError> {
                panic!("connect must not be called without a token");
            }
        }

        let tokens = resumeai_core::auth::StaticToken::new("");
        let err = open_connection(&NeverConnects, &tokens).await.err().unwrap();
        assert!(matches!(err, TransportError::Auth(_)));
    }
}
