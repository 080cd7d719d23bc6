//! Shared retry combinator.
//!
//! Every attempt loop in the crate goes through [`retry`]: the load
//! engine retries a single source with exponential backoff, and the
//! gateway client walks its configured gateways with no delay. The
//! zero-based attempt index is handed to the operation so callers can
//! vary the target per attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay schedule applied between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Re-attempt immediately.
    None,
    /// `base * 2^attempt`, capped at `cap`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Delay to sleep after the given zero-based attempt fails.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { base, cap } => {
                base.saturating_mul(2u32.saturating_pow(attempt)).min(*cap)
            }
        }
    }
}

/// Attempt budget plus delay schedule. A policy always makes at least
/// one attempt regardless of `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed number of attempts with no delay between them.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
        }
    }

    /// Attempts separated by capped exponential backoff.
    pub fn with_backoff(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, cap },
        }
    }
}

/// Why a [`retry`] run stopped without a success.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the final attempt's error.
    Exhausted(E),
    /// The cancellation token fired between attempts or mid-backoff.
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Drives `op` until it succeeds, the attempt budget runs out, or the
/// token fires. Cancellation is observed before each attempt and during
/// backoff sleeps; aborting an in-flight future is the caller's job
/// (wrap the operation in `tokio::select!` if it must die mid-await).
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let budget = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= budget {
                    return Err(RetryError::Exhausted(err));
                }
                let delay = policy.backoff.delay(attempt - 1);
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
