pub const APP_NAME: &str = "buildstack";

/// Sandbox root (`BASE`).
pub const ENV_BASE: &str = "BUILDSTACK_BASE";
/// Build-artifact root (`BUILD_BASE`), defaults to the sandbox root.
pub const ENV_BUILD_BASE: &str = "BUILDSTACK_BUILD_BASE";
/// Group for the shared permission profile.
pub const ENV_ADMIN_GROUP: &str = "BUILDSTACK_ADMIN_GROUP";

pub const CONFIG_FILENAME: &str = "buildstack.toml";

/// Prefix of generated build scripts under `BASE/scripts`.
pub const BUILD_SCRIPT_PREFIX: &str = "build";
/// Prefix of generated verification scripts under `BASE/scripts`.
pub const TEST_SCRIPT_PREFIX: &str = "test";

/// `tracing` target carrying relayed subprocess output.
pub const BUILD_LOG_TARGET: &str = "buildstack::build";
