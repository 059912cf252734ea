use std::fmt::Display;
use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::RetryPolicy;
use crate::error::TransferError;

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool { TransferError::is_retryable(self) }
}

/// Why [`with_retry`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("attempt {attempts} failed permanently: {error}")]
    Fatal { attempts: u32, error: E },

    #[error("cancelled")]
    Cancelled,
}

/// Drive `op` under `policy`.
///
/// `op` receives the 0-based attempt number. After a retryable failure that
/// is not the last attempt, `on_retry` runs and the driver sleeps for
/// [`RetryPolicy::delay`], waking early if `cancel` fires. No sleep follows
/// the final attempt.
pub async fn with_retry<T, E, Op, Fut, Hook>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: Op,
    mut on_retry: Hook,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
    Hook: FnMut(u32, &E),
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(_) if cancel.is_cancelled() => return Err(RetryError::Cancelled),
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(RetryError::Fatal {
                attempts: attempt + 1,
                error,
            });
        }
        if !policy.allows_retry(attempt) {
            return Err(RetryError::Exhausted {
                attempts: attempt + 1,
                last: error,
            });
        }

        let delay = policy.delay(attempt);
        warn!(
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            ?delay,
            %error,
            "attempt failed, retrying"
        );
        on_retry(attempt, &error);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
