pub mod stdout;
pub mod telegram;

use std::time::Duration;

use metrics::counter;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Worth retrying: timeouts, connection resets, 429 and 5xx.
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying will not help: bad token, unknown chat, malformed request.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u8,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, … capped.
    pub fn delay_after(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Send with bounded retries on transient failures. Fatal errors return immediately.
///
/// A transient error can hide a delivery that actually happened, so a retry may
/// duplicate the message on the channel.
pub async fn send_with_retry(
    notifier: &dyn Notifier,
    text: &str,
    policy: RetryPolicy,
) -> Result<u8, NotifyError> {
    let max = policy.max_attempts.max(1);
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        counter!("digest_notify_attempts_total").increment(1);
        match notifier.send(text).await {
            Ok(()) => {
                tracing::info!(target: "notify", channel = notifier.name(), attempt, "digest delivered");
                return Ok(attempt);
            }
            Err(e) if e.is_transient() && attempt < max => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    target: "notify",
                    channel = notifier.name(),
                    attempt,
                    max_attempts = max,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "send failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(target: "notify", channel = notifier.name(), attempt, error = %e, "send failed; giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        fail_first: usize,
        fatal: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Notifier for Flaky {
        async fn send(&self, _text: &str) -> Result<(), NotifyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                if self.fatal {
                    return Err(NotifyError::Fatal("nope".into()));
                }
                return Err(NotifyError::Transient("timeout".into()));
            }
            Ok(())
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn flaky(fail_first: usize, fatal: bool) -> Flaky {
        Flaky {
            fail_first,
            fatal,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
        assert_eq!(p.delay_after(4), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let n = flaky(2, false);
        let attempts = send_with_retry(&n, "hi", RetryPolicy::default()).await.unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_last_error() {
        let n = flaky(5, false);
        let err = send_with_retry(&n, "hi", RetryPolicy::default()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(n.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_is_not_retried() {
        let n = flaky(5, true);
        assert!(send_with_retry(&n, "hi", RetryPolicy::default()).await.is_err());
        assert_eq!(n.calls.load(Ordering::SeqCst), 1);
    }
}
