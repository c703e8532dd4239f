//! Retries of a single mutating remote call while the backend reports a known-transient
//! precondition failure (an object still initializing, a dependency that has not propagated,
//! a conflicting concurrent modification).
//!
//! This is strictly about failures before the backend accepts a call. Progress after acceptance
//! is the job of the [`poller`](crate::poller).

use log::{trace, warn};
use reconcile_model::constants::MIN_POLL_INTERVAL_MILLIS;
use reconcile_model::RetrySettings;
use std::time::Duration;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Marker for a retry loop that was interrupted by its cancellation token. Error types used with
/// [`retry_when`] must be able to represent it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Cancelled;

/// Invoke `call`, retrying with backoff for as long as `is_retryable` accepts the error and
/// `settings.timeout` has not elapsed. When an error is not retryable, or the budget is used
/// up, that error is returned exactly as the call produced it.
///
/// The backoff sleep is the only suspension point and is abandoned as soon as `cancel` fires.
pub async fn retry_when<F, Fut, T, E, P>(
    settings: &RetrySettings,
    cancel: &CancellationToken,
    operation_name: &str,
    mut call: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + From<Cancelled>,
    P: Fn(&E) -> bool,
{
    let start = Instant::now();
    let deadline = start + settings.timeout;
    let mut delay = settings.backoff.initial_interval;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        trace!("{}: attempt {}", operation_name, attempt);
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(error);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                "{}: giving up after {} attempts in {:?}: {}",
                operation_name,
                attempt,
                now - start,
                error
            );
            return Err(error);
        }

        let wait = delay
            .max(Duration::from_millis(MIN_POLL_INTERVAL_MILLIS))
            .min(deadline - now);
        warn!(
            "{}: attempt {} failed with a retryable error, retrying in {:?}: {}",
            operation_name, attempt, wait, error
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("{}: cancelled while waiting to retry", operation_name);
                return Err(Cancelled.into());
            }
            _ = sleep(wait) => {}
        }
        delay = settings.backoff.next(delay);
    }
}
