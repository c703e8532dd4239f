use crate::constants::{
    timeout_env_var, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_POLL_DELAY_MILLIS,
    DEFAULT_POLL_INITIAL_INTERVAL_MILLIS, DEFAULT_POLL_MAX_INTERVAL_MILLIS,
    DEFAULT_RETRY_TIMEOUT_MILLIS, DEFAULT_TIMEOUT_SECS, ENV_CREATE_TIMEOUT_SUFFIX,
    ENV_DELETE_TIMEOUT_SUFFIX, ENV_UPDATE_TIMEOUT_SUFFIX,
};
use crate::error::{self, Result};
use crate::Configuration;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;

/// The interval between successive attempts. Starts at `initial_interval` and is multiplied by
/// `multiplier` after each attempt, never exceeding `max_interval`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    #[serde(rename = "initialIntervalMillis", with = "millis")]
    pub initial_interval: Duration,
    #[serde(rename = "maxIntervalMillis", with = "millis")]
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(
            Duration::from_millis(DEFAULT_POLL_INITIAL_INTERVAL_MILLIS),
            Duration::from_millis(DEFAULT_POLL_MAX_INTERVAL_MILLIS),
        )
    }
}

impl Backoff {
    /// The same interval between every attempt.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
        }
    }

    pub fn exponential(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// The interval that follows `current`.
    pub fn next(&self, current: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let next = current.as_secs_f64() * multiplier;
        if next >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(next)
        }
    }
}

/// How a waiter paces its probes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSettings {
    /// Wait this long before the first probe.
    #[serde(rename = "delayMillis", with = "millis", default = "default_poll_delay")]
    pub delay: Duration,
    #[serde(flatten)]
    pub backoff: Backoff,
}

fn default_poll_delay() -> Duration {
    Duration::from_millis(DEFAULT_POLL_DELAY_MILLIS)
}

impl Configuration for PollSettings {}

impl PollSettings {
    pub fn new(delay: Duration, backoff: Backoff) -> Self {
        Self { delay, backoff }
    }
}

/// How long transient failures of a single remote call are retried, and how those retries are
/// paced.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(rename = "timeoutMillis", with = "millis")]
    pub timeout: Duration,
    #[serde(flatten)]
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_RETRY_TIMEOUT_MILLIS),
            backoff: Backoff::default(),
        }
    }
}

impl Configuration for RetrySettings {}

impl RetrySettings {
    pub fn new(timeout: Duration, backoff: Backoff) -> Self {
        Self { timeout, backoff }
    }
}

/// The budgets for each long-running operation of a resource type. Each budget covers the whole
/// operation, including any retries of the initial call and the wait that follows it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    #[serde(rename = "createSecs", with = "seconds")]
    pub create: Duration,
    #[serde(rename = "updateSecs", with = "seconds")]
    pub update: Duration,
    #[serde(rename = "deleteSecs", with = "seconds")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl Configuration for Timeouts {}

impl Timeouts {
    pub fn new(create: Duration, update: Duration, delete: Duration) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    pub fn uniform(timeout: Duration) -> Self {
        Self::new(timeout, timeout, timeout)
    }

    /// Replace any timeout for which `lookup` returns a value, keyed by the variable names from
    /// [`timeout_env_var`].
    pub fn with_overrides_from<F>(mut self, resource_type: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (suffix, timeout) in [
            (ENV_CREATE_TIMEOUT_SUFFIX, &mut self.create),
            (ENV_UPDATE_TIMEOUT_SUFFIX, &mut self.update),
            (ENV_DELETE_TIMEOUT_SUFFIX, &mut self.delete),
        ] {
            let key = timeout_env_var(resource_type, suffix);
            if let Some(value) = lookup(&key) {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .context(error::EnvParseSnafu {
                        key: &key,
                        value: &value,
                    })?;
                debug!("Using {}={}", key, secs);
                *timeout = Duration::from_secs(secs);
            }
        }
        Ok(self)
    }

    /// Apply overrides from the process environment, e.g. `RECONCILE_EKS_ADDON_CREATE_TIMEOUT_SECS`.
    pub fn with_env_overrides(self, resource_type: &str) -> Result<Self> {
        self.with_overrides_from(resource_type, |key| std::env::var(key).ok())
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::convert::TryFrom;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
