/*!

`resource-providers` is a collection of resource types built on the `resource-agent` engine. Each
module describes one kind of cloud object: its spec and remote object records, its identity
shape, the statuses its waits use, which errors are transient, and the pure mapping between the
declared spec and what the backend returns.

Backend calls are supplied by the caller as [`RemoteClient`] implementations, so the same
resource types run against an SDK in production and against in-memory fakes in tests.

[`RemoteClient`]: resource_agent::provider::RemoteClient

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

pub mod appsync_type;
pub mod constants;
pub mod db_instance;
pub mod eks_addon;
mod error;
pub mod notification_channel;
pub mod rest_api;

pub use error::{Error, Result};

use crate::appsync_type::AppSyncType;
use crate::db_instance::DbInstance;
use crate::eks_addon::EksAddon;
use crate::notification_channel::NotificationChannel;
use crate::rest_api::RestApi;
use constants::{DEFAULT_AGENT_LEVEL_FILTER, WORKSPACE_CRATES};
use env_logger::Builder;
use log::LevelFilter;
use reconcile_model::constants::ENV_LOG_LEVEL;
use reconcile_model::Timeouts;
use resource_agent::provider::RemoteClient;
use resource_agent::Registry;
use snafu::ResultExt;
use std::env;
use std::str::FromStr;

/// Extract the value of `RUST_LOG` if it exists, otherwise log this application at `log_level`,
/// then `RECONCILE_LOG_LEVEL`, then `DEFAULT_AGENT_LEVEL_FILTER`.
pub fn init_agent_logger(bin_crate: &str, log_level: Option<LevelFilter>) {
    match env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            let log_level = log_level
                .or_else(|| {
                    env::var(ENV_LOG_LEVEL)
                        .ok()
                        .and_then(|level| LevelFilter::from_str(level.trim()).ok())
                })
                .unwrap_or(DEFAULT_AGENT_LEVEL_FILTER);
            agent_logger(bin_crate, log_level).init();
        }
    }
}

/// Log `bin_crate` and the workspace crates at `log_level`, everything else at Error.
fn agent_logger(bin_crate: &str, log_level: LevelFilter) -> Builder {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Error)
        .filter(Some(bin_crate), log_level);
    for name in WORKSPACE_CRATES {
        builder.filter(Some(name), log_level);
    }
    builder
}

/// The default timeouts of `resource_type` with any environment overrides applied.
pub(crate) fn timeouts(resource_type: &'static str, defaults: Timeouts) -> Result<Timeouts> {
    defaults
        .with_env_overrides(resource_type)
        .context(error::TimeoutOverrideSnafu { resource_type })
}

/// The backend clients for every resource type in [`default_registry`].
pub struct ProviderClients {
    pub eks_addon: Box<dyn RemoteClient<EksAddon>>,
    pub rest_api: Box<dyn RemoteClient<RestApi>>,
    pub db_instance: Box<dyn RemoteClient<DbInstance>>,
    pub notification_channel: Box<dyn RemoteClient<NotificationChannel>>,
    pub appsync_type: Box<dyn RemoteClient<AppSyncType>>,
}

/// The table of every resource type this crate provides.
pub fn default_registry(clients: ProviderClients) -> Result<Registry> {
    let ProviderClients {
        eks_addon,
        rest_api,
        db_instance,
        notification_channel,
        appsync_type,
    } = clients;

    let mut registry = Registry::new();
    registry
        .register(crate::eks_addon::reconciler(eks_addon)?)
        .context(error::RegisterSnafu)?
        .register(crate::rest_api::reconciler(rest_api)?)
        .context(error::RegisterSnafu)?
        .register(crate::db_instance::reconciler(db_instance)?)
        .context(error::RegisterSnafu)?
        .register(crate::notification_channel::reconciler(notification_channel)?)
        .context(error::RegisterSnafu)?
        .register(crate::appsync_type::reconciler(appsync_type)?)
        .context(error::RegisterSnafu)?;
    Ok(registry)
}
