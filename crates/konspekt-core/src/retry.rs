use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

use crate::error::{KonspektError, Result};

/// Exponential-backoff policy for transient completion failures.
/// Decoupled from any particular call: the caller supplies the
/// operation and the predicate that decides which errors are worth
/// retrying.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `min(max(base * 2^attempt, retry_after_hint), max_delay)`.
    /// The hint defaults to one second when the error carried none.
    pub fn backoff_delay(&self, attempt: u32, retry_after_hint: Option<u64>) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let hint = Duration::from_secs(retry_after_hint.unwrap_or(1));
        exponential.max(hint).min(self.max_delay)
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        let jitter = rand::rng().random_range(0.0..=0.1);
        delay.mul_f64(1.0 + jitter)
    }

    /// Drive `op` until it succeeds, a non-retryable error occurs, or
    /// the attempt budget is exhausted. The final error is re-raised
    /// unchanged.
    pub async fn run<T, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&KonspektError) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) && attempt + 1 < self.max_attempts => {
                    let delay =
                        self.with_jitter(self.backoff_delay(attempt, err.retry_after_hint()));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
