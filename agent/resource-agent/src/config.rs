use crate::poller::StatusWait;
use crate::remote::RemoteError;
use reconcile_model::{IdentityShape, PollSettings, RetrySettings, Timeouts};

/// Decides whether an error returned by a mutating call is a transient precondition failure.
pub type RetryPredicate = fn(&RemoteError) -> bool;

/// Never retry.
pub fn never_retry(_: &RemoteError) -> bool {
    false
}

/// The per-type record that parameterizes a [`Reconciler`]: how identities look, which statuses
/// each wait uses, which errors are transient, and how long everything may take.
///
/// A `None` wait means the operation completes synchronously. A create without a wait still
/// confirms that the new object can be read.
///
/// [`Reconciler`]: crate::Reconciler
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub identity: IdentityShape,
    pub timeouts: Timeouts,
    pub poll: PollSettings,
    pub retry: RetrySettings,
    pub create_wait: Option<StatusWait>,
    /// Waits on the object itself after a synchronous update.
    pub update_wait: Option<StatusWait>,
    /// Waits on the asynchronous operation returned by an update.
    pub operation_wait: Option<StatusWait>,
    pub delete_wait: Option<StatusWait>,
    pub retry_create: RetryPredicate,
    pub retry_update: RetryPredicate,
    pub retry_delete: RetryPredicate,
    /// Appended to the error when the create wait fails.
    pub create_failure_hint: Option<&'static str>,
}

impl ResourceConfig {
    pub fn new(identity: IdentityShape) -> Self {
        Self {
            identity,
            timeouts: Timeouts::default(),
            poll: PollSettings::default(),
            retry: RetrySettings::default(),
            create_wait: None,
            update_wait: None,
            operation_wait: None,
            delete_wait: None,
            retry_create: never_retry,
            retry_update: never_retry,
            retry_delete: never_retry,
            create_failure_hint: None,
        }
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn create_wait(mut self, wait: StatusWait) -> Self {
        self.create_wait = Some(wait);
        self
    }

    pub fn update_wait(mut self, wait: StatusWait) -> Self {
        self.update_wait = Some(wait);
        self
    }

    pub fn operation_wait(mut self, wait: StatusWait) -> Self {
        self.operation_wait = Some(wait);
        self
    }

    pub fn delete_wait(mut self, wait: StatusWait) -> Self {
        self.delete_wait = Some(wait);
        self
    }

    pub fn retry_create(mut self, predicate: RetryPredicate) -> Self {
        self.retry_create = predicate;
        self
    }

    pub fn retry_update(mut self, predicate: RetryPredicate) -> Self {
        self.retry_update = predicate;
        self
    }

    pub fn retry_delete(mut self, predicate: RetryPredicate) -> Self {
        self.retry_delete = predicate;
        self
    }

    pub fn create_failure_hint(mut self, hint: &'static str) -> Self {
        self.create_failure_hint = Some(hint);
        self
    }

    /// True if `status` is one of the create wait's failure statuses, i.e. the object is left
    /// over from a create that never succeeded.
    pub fn is_create_failure(&self, status: &str) -> bool {
        self.create_wait
            .as_ref()
            .map(|wait| wait.statuses.failure().contains(status))
            .unwrap_or(false)
    }
}
