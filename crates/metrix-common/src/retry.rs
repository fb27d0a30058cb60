//! Bounded retry with an explicit delay table.
//!
//! A [`RetryPolicy`] is an attempt ceiling plus the waits between attempts.
//! The last entry of the table repeats once the table runs out. Both the
//! delivery path (async, cancellable) and the database snapshot path
//! (blocking pool) drive their retries through it.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt ceiling used for metric delivery.
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
}

/// Why a retried operation ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The operation failed with an error the classifier refused to retry.
    #[error("{0}")]
    Permanent(E),

    /// Cancellation fired before the next attempt could start.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// Ten attempts, doubling from 100ms and holding at 3.2s.
    pub fn delivery() -> Self {
        Self::new(DEFAULT_DELIVERY_ATTEMPTS, Self::delivery_delays())
    }

    /// The delay table of [`RetryPolicy::delivery`].
    pub fn delivery_delays() -> Vec<Duration> {
        (0..6).map(|i| Duration::from_millis(100 << i)).collect()
    }

    /// Three attempts separated by 1s, 3s and 5s.
    pub fn persistence() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
        )
    }

    /// Same ceiling, no waiting. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Vec::new())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the `failed`-th failed attempt (1-based).
    pub fn delay_after(&self, failed: u32) -> Duration {
        if self.delays.is_empty() {
            return Duration::ZERO;
        }
        let idx = (failed.saturating_sub(1) as usize).min(self.delays.len() - 1);
        self.delays[idx]
    }

    /// Drive `op` on the current thread, sleeping between attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run_blocking<T, E, F, R>(&self, mut op: F, retryable: R) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if !retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e })
                }
                Err(e) => {
                    let wait = self.delay_after(attempt);
                    tracing::warn!(attempt, max = self.max_attempts, error = %e, ?wait, "Attempt failed, retrying");
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Async driver. A pending wait is abandoned as soon as `cancel` fires;
    /// an attempt already in flight is allowed to finish.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        retryable: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if !retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e })
                }
                Err(e) => {
                    let wait = self.delay_after(attempt);
                    tracing::warn!(attempt, max = self.max_attempts, error = %e, ?wait, "Attempt failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(RetryError::Cancelled { attempts: attempt });
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}
