// Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;

use super::LedgerError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: u32 },
    Exhausted { attempts: u32, last: LedgerError },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Re-raises the final failure as [`LedgerError::RetriesExhausted`].
    pub fn into_result(self, operation: &str) -> Result<T, LedgerError> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { attempts, last } => Err(LedgerError::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                last: Box::new(last),
            }),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached, sleeping
    /// `delay` between attempts (not after the last one).
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= max => {
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last: e,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        operation,
                        attempt,
                        "ledger call failed; retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
