use crate::config::SyncConfig;
use crate::sync::error::DeliveryError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base_ms^n * factor`, capped at `max`.
    Exponential { base_ms: u64, factor: u64, max: Duration },
}

/// How many times a delivery is attempted and which failures are worth another try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: fn(&DeliveryError) -> bool,
}

/// Every failure is retried.
pub fn always(_: &DeliveryError) -> bool {
    true
}

/// Transport failures, 408, 429 and 5xx are retried; other client errors are final.
pub fn transient_only(e: &DeliveryError) -> bool {
    match e.status() {
        None => true,
        Some(s) => s == 408 || s == 429 || s >= 500,
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, backoff: Backoff::Fixed(delay), retryable: always }
    }

    pub fn from_config(cfg: &SyncConfig) -> Self {
        let backoff = if cfg.exponential_backoff {
            Backoff::Exponential { base_ms: 2, factor: cfg.retry_delay_ms.max(1), max: MAX_BACKOFF }
        } else {
            Backoff::Fixed(Duration::from_millis(cfg.retry_delay_ms))
        };
        Self {
            max_attempts: cfg.max_attempts,
            backoff,
            retryable: if cfg.retry_client_errors { always } else { transient_only },
        }
    }

    /// Sleeps between attempts: one fewer than `max_attempts`.
    pub fn delays(&self) -> Vec<Duration> {
        let retries = self.max_attempts.max(1) as usize - 1;
        match self.backoff {
            Backoff::Fixed(d) => FixedInterval::new(d).take(retries).collect(),
            Backoff::Exponential { base_ms, factor, max } => ExponentialBackoff::from_millis(base_ms)
                .factor(factor)
                .max_delay(max)
                .take(retries)
                .collect(),
        }
    }

    /// Run `op` until it succeeds, a failure is not retryable, or attempts run
    /// out. `op` receives the 1-based attempt number. Returns the final result
    /// and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (Result<T, DeliveryError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let attempts = AtomicU32::new(0);
        let retryable = self.retryable;
        let result = RetryIf::start(
            self.delays(),
            || op(attempts.fetch_add(1, Ordering::SeqCst) + 1),
            |e: &DeliveryError| retryable(e),
        )
        .await;
        (result, attempts.load(Ordering::SeqCst))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn rejected(status: u16) -> DeliveryError {
        DeliveryError::Rejected { status, reasons: vec![] }
    }

    #[test]
    fn test_delay_schedule() {
        let p = RetryPolicy::fixed(3, Duration::from_millis(5));
        assert_eq!(p.delays(), vec![Duration::from_millis(5); 2]);
        assert!(RetryPolicy::fixed(1, Duration::ZERO).delays().is_empty());
        assert!(RetryPolicy::fixed(0, Duration::ZERO).delays().is_empty());

        let cfg = SyncConfig { max_attempts: 4, retry_delay_ms: 100, exponential_backoff: true, ..SyncConfig::default() };
        assert_eq!(
            RetryPolicy::from_config(&cfg).delays(),
            vec![Duration::from_millis(200), Duration::from_millis(400), Duration::from_millis(800)]
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let script = Mutex::new(vec![Err(rejected(500)), Err(rejected(502)), Ok(201u16)]);
        let p = RetryPolicy::fixed(3, Duration::ZERO);
        let (result, attempts) = p
            .run(|_| {
                let next = script.lock().unwrap().remove(0);
                async move { next }
            })
            .await;
        assert_eq!(result, Ok(201));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let p = RetryPolicy::fixed(2, Duration::ZERO);
        let (result, attempts) = p.run(|n| async move { Err::<(), _>(rejected(500 + n as u16)) }).await;
        assert_eq!(result, Err(rejected(502)));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let p = RetryPolicy { retryable: transient_only, ..RetryPolicy::fixed(3, Duration::ZERO) };
        let (result, attempts) = p.run(|_| async { Err::<(), _>(rejected(422)) }).await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert!(transient_only(&rejected(429)));
        assert!(transient_only(&DeliveryError::Transport { kind: "timeout", message: String::new() }));
    }
}
