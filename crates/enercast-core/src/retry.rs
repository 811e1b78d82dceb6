//! Caller-side retry with backoff for retryable engine errors.
//!
//! The engine never retries on its own; layers above it (the CLI, a transport
//! handler) opt in through [`retry_async`].

use std::future::Future;
use std::time::Duration;

use crate::EngineError;

/// Delay policy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt.min(i32::MAX as u32) as i32);
                let capped = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(capped);
                if !jitter {
                    return delay;
                }

                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let offset = fastrand::u64(0..=(jitter_ms * 2));
                let total = delay.as_millis() as i64 + offset as i64 - jitter_ms as i64;
                Duration::from_millis(total.max(0) as u64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Runs `operation`, retrying while the error reports itself retryable.
pub async fn retry_async<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    code = err.code(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_half_of_the_delay() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(200),
            factor: 1.0,
            max: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..20 {
            let delay_ms = backoff.delay(3).as_millis();
            assert!((100..=300).contains(&delay_ms), "delay_ms={delay_ms}");
        }
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_async(RetryConfig::fixed(Duration::from_millis(1), 3), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::accessor("warehouse busy"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.expect("eventually succeeds"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), EngineError> =
            retry_async(RetryConfig::fixed(Duration::from_millis(1), 3), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::HorizonExceeded { requested: 30, max: 14 })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), EngineError> =
            retry_async(RetryConfig::fixed(Duration::from_millis(1), 2), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::accessor("down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
