use log::LevelFilter;
use std::time::Duration;

pub const DEFAULT_AGENT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// The crates whose logs are shown at the requested level. Everything else logs errors only.
pub(crate) const WORKSPACE_CRATES: &[&str] =
    &["reconcile_model", "resource_agent", "resource_providers"];

pub(crate) const MINUTE: Duration = Duration::from_secs(60);
