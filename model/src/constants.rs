/// Helper macro to avoid retyping the prefix shared by our environment variables. When given no
/// parameters, this returns the prefix. When given a string literal parameter it adds
/// `_parameter` to the end.
macro_rules! reconcile_env {
    () => {
        "RECONCILE"
    };
    ($s:literal) => {
        concat!(reconcile_env!(), "_", $s)
    };
}

// Environment variables
pub const ENV_PREFIX: &str = reconcile_env!();
pub const ENV_LOG_LEVEL: &str = reconcile_env!("LOG_LEVEL");
pub const ENV_CREATE_TIMEOUT_SUFFIX: &str = "CREATE_TIMEOUT_SECS";
pub const ENV_UPDATE_TIMEOUT_SUFFIX: &str = "UPDATE_TIMEOUT_SECS";
pub const ENV_DELETE_TIMEOUT_SUFFIX: &str = "DELETE_TIMEOUT_SECS";

// Identity keys
pub const DEFAULT_IDENTITY_SEPARATOR: &str = ":";
pub const SINGLE_IDENTITY_PART: &str = "id";

// Timeouts
pub const DEFAULT_TIMEOUT_SECS: u64 = 20 * 60;

// Waiter
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;
pub const DEFAULT_CONTINUOUS_TARGET_OCCURRENCE: u32 = 1;
pub const DEFAULT_POLL_DELAY_MILLIS: u64 = 0;
pub const DEFAULT_POLL_INITIAL_INTERVAL_MILLIS: u64 = 100;
pub const DEFAULT_POLL_MAX_INTERVAL_MILLIS: u64 = 10_000;
pub const MIN_POLL_INTERVAL_MILLIS: u64 = 100;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

// Retry classifier
pub const DEFAULT_RETRY_TIMEOUT_MILLIS: u64 = 2 * 60 * 1000;

/// The environment variable that overrides one of a resource type's timeouts, e.g.
/// `RECONCILE_EKS_ADDON_CREATE_TIMEOUT_SECS`.
pub fn timeout_env_var(resource_type: &str, suffix: &str) -> String {
    format!(
        "{}_{}_{}",
        ENV_PREFIX,
        resource_type.to_uppercase().replace(['-', '.'], "_"),
        suffix
    )
}

#[test]
fn reconcile_env_macro_test() {
    assert_eq!("RECONCILE", reconcile_env!());
    assert_eq!("RECONCILE_LOG_LEVEL", ENV_LOG_LEVEL);
    assert_eq!(
        "RECONCILE_EKS_ADDON_CREATE_TIMEOUT_SECS",
        timeout_env_var("eks_addon", ENV_CREATE_TIMEOUT_SUFFIX)
    );
    assert_eq!(
        "RECONCILE_APPSYNC_TYPE_DELETE_TIMEOUT_SECS",
        timeout_env_var("appsync-type", ENV_DELETE_TIMEOUT_SUFFIX)
    );
}
