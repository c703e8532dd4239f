/*!

The `resource-agent` library drives remote cloud objects from their current state to a declared
desired state. For each resource type you implement a [`RemoteClient`] (the backend calls) and a
[`StateMapper`] (pure conversions between the declared spec and the remote object), describe the
type's statuses and timeouts in a [`ResourceConfig`], and hand all three to a [`Reconciler`].

The `Reconciler` combines the retry classifier in [`retry`], which absorbs known-transient
failures of a single call, with the waiter in [`poller`], which follows the object (or a separate
update operation) until it reaches a terminal status.

[`RemoteClient`]: provider::RemoteClient
[`StateMapper`]: provider::StateMapper

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

mod config;
pub mod diff;
pub mod error;
pub mod poller;
pub mod provider;
mod reconciler;
mod registry;
mod remote;
pub mod retry;

pub use config::{never_retry, ResourceConfig, RetryPredicate};
pub use poller::{Probe, StatusWait, WaitError};
pub use reconcile_model::{Configuration, IdentityKey, IdentityShape, LifecycleState};
pub use reconciler::{ReconcileError, ReconcileResult, Reconciled, Reconciler};
pub use registry::{DriverError, DriverOutput, Registry, ResourceDriver};
pub use remote::{RemoteError, RemoteResult};
pub use tokio_util::sync::CancellationToken;

use serde::Serialize;

/// Print a value using `serde_json` `to_string_pretty` for types that implement Serialize.
pub fn json_display<T: Serialize>(object: T) -> String {
    serde_json::to_string_pretty(&object).unwrap_or_else(|e| format!("Serialization failed: {}", e))
}
