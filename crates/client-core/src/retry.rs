//! Retry with exponential backoff for signaling writes
//!
//! Signaling writes ride on a remote store and fail transiently; important
//! writes (offer, answer, status updates on the critical path) go through
//! [`retry_with_backoff`] so a single dropped request does not kill a call.
//! Only errors whose [`ClientError::is_transient`] returns true are retried.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{ClientError, ClientResult};

/// Parameters for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Aggressive retries for writes on the call-setup critical path.
    ///
    /// A ringing peer gives up after tens of seconds, so setup writes get
    /// more attempts with short delays.
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Patient retries for background writes (cleanup, history).
    pub fn slow() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 3.0,
            use_jitter: false,
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Non-transient errors return immediately; transient errors retry up to
/// `config.max_attempts` total attempts.
///
/// # Examples
///
/// ```rust
/// # use peercall_client_core::retry::{retry_with_backoff, RetryConfig};
/// # use peercall_client_core::error::{ClientError, ClientResult};
/// # use std::sync::atomic::{AtomicU32, Ordering};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let attempts = AtomicU32::new(0);
/// let result = retry_with_backoff("offer_write", RetryConfig::quick(), || async {
///     if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
///         Err(ClientError::SignalingFailed { reason: "timeout".into() })
///     } else {
///         Ok(())
///     }
/// })
/// .await?;
/// assert_eq!(attempts.load(Ordering::SeqCst), 3);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt, "write went through after retrying"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                error!(
                    operation = operation_name,
                    error = %e,
                    category = e.category(),
                    "permanent failure, not retrying"
                );
                return Err(e);
            }
            Err(e) if attempt == config.max_attempts => {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "giving up after exhausting retries"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis(),
                    "transient failure, backing off"
                );
                sleep(jittered(delay, config.use_jitter)).await;
                let grown = delay.as_millis() as f64 * config.backoff_multiplier;
                delay = Duration::from_millis(grown as u64).min(config.max_delay);
            }
        }
    }

    // max_attempts is validated non-zero, so the loop always returns.
    Err(ClientError::InternalError {
        message: format!("retry loop for {operation_name} ran zero attempts"),
    })
}

/// Spreads a delay by up to +/- 10% so clients sharing a store do not
/// hammer it in lockstep.
fn jittered(delay: Duration, enabled: bool) -> Duration {
    if !enabled {
        return delay;
    }
    let factor = 1.0 + (rand::random::<f64>() - 0.5) * 0.2;
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = retry_with_backoff("test_op", RetryConfig::quick(), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClientError::SignalingFailed {
                    reason: "temporary".into(),
                })
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let result: ClientResult<()> =
            retry_with_backoff("test_op", RetryConfig::default(), || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::NoActiveCall)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        let result: ClientResult<()> = retry_with_backoff("test_op", config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::SignalingFailed {
                reason: "still down".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
