/*!

This library provides the plain data shared by the reconciliation engine and the resource
providers: identity keys, status sets, lifecycle states and the timeout/polling settings that
parameterize a resource type.

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

pub use configuration::Configuration;
pub use error::{Error, Result};
pub use identity::{IdentityKey, IdentityShape};
pub use lifecycle::LifecycleState;
pub use settings::{Backoff, PollSettings, RetrySettings, Timeouts};
pub use status::{StatusClass, StatusSets};

mod configuration;
pub mod constants;
mod error;
mod identity;
mod lifecycle;
mod settings;
mod status;
