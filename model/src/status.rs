use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeSet;

/// The partition of a resource type's status strings used while waiting on one operation.
///
/// - `pending`: keep waiting.
/// - `target`: the wait succeeds. An empty target set means the wait is for the object to
///   disappear.
/// - `failure`: known terminal failures whose details should be surfaced.
///
/// Anything else is an unexpected status and, like a failure, ends the wait.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSets {
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
    #[serde(default)]
    failure: BTreeSet<String>,
}

/// Where an observed status falls within a [`StatusSets`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusClass {
    Pending,
    Target,
    Failure,
    Unexpected,
}

derive_display_from_serialize!(StatusClass);
derive_fromstr_from_deserialize!(StatusClass);

impl StatusClass {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, StatusClass::Failure | StatusClass::Unexpected)
    }
}

fn to_set<I, S>(statuses: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    statuses.into_iter().map(Into::into).collect()
}

impl StatusSets {
    pub fn new<P, T, S>(pending: P, target: T) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: to_set(pending),
            target: to_set(target),
            failure: BTreeSet::new(),
        }
    }

    /// Status sets for a wait that succeeds once the object no longer exists.
    pub fn absence<P, S>(pending: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: to_set(pending),
            target: BTreeSet::new(),
            failure: BTreeSet::new(),
        }
    }

    pub fn with_failure<F, S>(mut self, failure: F) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = to_set(failure);
        self
    }

    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    pub fn target(&self) -> &BTreeSet<String> {
        &self.target
    }

    pub fn failure(&self) -> &BTreeSet<String> {
        &self.failure
    }

    pub fn waits_for_absence(&self) -> bool {
        self.target.is_empty()
    }

    pub fn classify(&self, status: &str) -> StatusClass {
        if self.target.contains(status) {
            StatusClass::Target
        } else if self.pending.contains(status) {
            StatusClass::Pending
        } else if self.failure.contains(status) {
            StatusClass::Failure
        } else {
            StatusClass::Unexpected
        }
    }
}
