//! The waiter that drives a remote object, or an asynchronous operation, from a pending status to
//! a target status.
//!
//! A wait repeatedly calls a probe, sleeping between calls on the schedule described by
//! [`PollSettings`]. Each result is classified against a [`StatusSets`]:
//!
//! - a probe error other than not-found ends the wait immediately,
//! - not-found is tolerated up to `not_found_checks` consecutive times (read-after-write lag),
//!   unless the wait is for absence, in which case it is a target observation,
//! - a pending status keeps waiting,
//! - a target status must be seen `continuous_target_occurrence` times in a row,
//! - anything else ends the wait with the object that reported it.
//!
//! Probes after the first are never closer together than `MIN_POLL_INTERVAL_MILLIS`, whatever the
//! backoff says. Every sleep is clipped to the remaining budget and a probe that outlives the deadline is
//! abandoned, so a wait never meaningfully exceeds its timeout.

use crate::remote::{RemoteError, RemoteResult};
use log::{debug, trace};
use reconcile_model::constants::{
    DEFAULT_CONTINUOUS_TARGET_OCCURRENCE, DEFAULT_NOT_FOUND_CHECKS, MIN_POLL_INTERVAL_MILLIS,
};
use reconcile_model::{PollSettings, StatusClass, StatusSets};
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// The status sets and tolerances for one wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusWait {
    pub statuses: StatusSets,
    pub not_found_checks: u32,
    pub continuous_target_occurrence: u32,
}

impl StatusWait {
    pub fn new(statuses: StatusSets) -> Self {
        Self {
            statuses,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: DEFAULT_CONTINUOUS_TARGET_OCCURRENCE,
        }
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrence: u32) -> Self {
        self.continuous_target_occurrence = occurrence;
        self
    }

    fn describe_target(&self) -> String {
        if self.statuses.waits_for_absence() {
            "absent".to_string()
        } else {
            self.statuses
                .target()
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// One probe result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Probe<T> {
    Found { object: T, status: String },
    NotFound,
}

impl<T> Probe<T> {
    pub fn found<S: Into<String>>(object: T, status: S) -> Self {
        Probe::Found {
            object,
            status: status.into(),
        }
    }
}

/// Why a wait ended without reaching its target. Every variant carries the last object the
/// probe returned, if any.
#[derive(Debug)]
pub enum WaitError<T> {
    /// The object was not found on `checks` consecutive probes.
    NotFound { checks: u32, last: Option<T> },

    /// A status outside of the pending and target sets was observed.
    UnexpectedStatus {
        status: String,
        class: StatusClass,
        target: String,
        object: T,
    },

    /// The budget ran out before a terminal result.
    Timeout {
        elapsed: Duration,
        target: String,
        last: Option<T>,
        last_status: Option<String>,
    },

    /// The probe itself failed.
    Probe { source: RemoteError, last: Option<T> },

    Cancelled { last: Option<T> },
}

impl<T> WaitError<T> {
    /// The last object observed before the wait ended.
    pub fn into_last(self) -> Option<T> {
        match self {
            WaitError::NotFound { last, .. }
            | WaitError::Timeout { last, .. }
            | WaitError::Probe { last, .. }
            | WaitError::Cancelled { last } => last,
            WaitError::UnexpectedStatus { object, .. } => Some(object),
        }
    }

    pub fn last(&self) -> Option<&T> {
        match self {
            WaitError::NotFound { last, .. }
            | WaitError::Timeout { last, .. }
            | WaitError::Probe { last, .. }
            | WaitError::Cancelled { last } => last.as_ref(),
            WaitError::UnexpectedStatus { object, .. } => Some(object),
        }
    }
}

impl<T> Display for WaitError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitError::NotFound { checks, .. } => {
                write!(f, "couldn't find resource ({} retries)", checks)
            }
            WaitError::UnexpectedStatus {
                status, target, ..
            } => write!(
                f,
                "unexpected state '{}', wanted target '{}'",
                status, target
            ),
            WaitError::Timeout {
                elapsed,
                target,
                last_status,
                ..
            } => write!(
                f,
                "timeout while waiting for state to become '{}' (last state: '{}', elapsed: {:?})",
                target,
                last_status.as_deref().unwrap_or_default(),
                elapsed
            ),
            WaitError::Probe { source, .. } => write!(f, "status probe failed: {}", source),
            WaitError::Cancelled { .. } => write!(f, "wait was cancelled"),
        }
    }
}

impl<T: Debug> std::error::Error for WaitError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WaitError::Probe { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Call `probe` until it reports a status in the target set, the object disappears (for
/// absence waits), a terminal condition is reached, `timeout` elapses, or `cancel` fires.
///
/// Returns the object that satisfied the wait, or `None` for an absence wait.
pub async fn wait_for_state<T, F, Fut>(
    wait: &StatusWait,
    poll: &PollSettings,
    timeout: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<Option<T>, WaitError<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<Probe<T>>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let target = wait.describe_target();
    let required_targets = wait.continuous_target_occurrence.max(1);
    let allowed_not_found = wait.not_found_checks.max(1);

    let mut next_sleep = poll.delay;
    let mut interval = poll.backoff.initial_interval;
    let mut not_found = 0u32;
    let mut targets = 0u32;
    let mut last: Option<T> = None;
    let mut last_status: Option<String> = None;
    let mut attempt = 0u32;

    macro_rules! timed_out {
        () => {
            WaitError::Timeout {
                elapsed: Instant::now() - start,
                target: target.clone(),
                last,
                last_status,
            }
        };
    }

    loop {
        if !next_sleep.is_zero() {
            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out!());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(WaitError::Cancelled { last }),
                _ = sleep(next_sleep.min(deadline - now)) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled { last });
        }
        if Instant::now() >= deadline {
            return Err(timed_out!());
        }

        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled { last }),
            result = timeout_at(deadline, probe()) => match result {
                Ok(result) => result,
                Err(_) => {
                    debug!("Probe {} did not return before the deadline", attempt);
                    return Err(timed_out!());
                }
            },
        };

        // Clients that report absence as an error are treated like `Probe::NotFound`.
        let result = match result {
            Err(e) if e.is_not_found() => Ok(Probe::NotFound),
            other => other,
        };

        match result {
            Ok(Probe::NotFound) => {
                if wait.statuses.waits_for_absence() {
                    targets += 1;
                    trace!(
                        "Probe {}: not found ({}/{} for absence)",
                        attempt,
                        targets,
                        required_targets
                    );
                    if targets >= required_targets {
                        return Ok(None);
                    }
                } else {
                    targets = 0;
                    not_found += 1;
                    trace!(
                        "Probe {}: not found ({}/{})",
                        attempt,
                        not_found,
                        allowed_not_found
                    );
                    if not_found >= allowed_not_found {
                        return Err(WaitError::NotFound {
                            checks: not_found,
                            last,
                        });
                    }
                }
            }
            Ok(Probe::Found { object, status }) => {
                not_found = 0;
                let class = wait.statuses.classify(&status);
                trace!("Probe {}: status '{}' is {}", attempt, status, class);
                match class {
                    StatusClass::Target => {
                        targets += 1;
                        if targets >= required_targets {
                            return Ok(Some(object));
                        }
                    }
                    StatusClass::Pending => targets = 0,
                    StatusClass::Failure | StatusClass::Unexpected => {
                        return Err(WaitError::UnexpectedStatus {
                            status,
                            class,
                            target,
                            object,
                        });
                    }
                }
                last = Some(object);
                last_status = Some(status);
            }
            Err(source) => return Err(WaitError::Probe { source, last }),
        }

        next_sleep = interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MILLIS));
        interval = poll.backoff.next(interval);
    }
}
