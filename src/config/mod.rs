//! Harness configuration.
//!
//! Configuration is resolved exactly once per process, in this order:
//! YAML layers ([`loader`]), `MCPCHECK_*` variables ([`env_overrides`]),
//! command-line flags, then [`validator::validate`]. The resulting
//! [`HarnessConfig`] is passed down by reference; nothing below the CLI reads
//! the environment for settings.

pub mod env_overrides;
pub mod loader;
pub mod schema;
pub mod validator;

pub use env_overrides::{apply_env_overrides, apply_env_overrides_with, split_list};
pub use loader::{deep_merge, load_config, parse_config, ConfigPaths, CONFIG_DIR};
pub use schema::{
    Delays, HarnessConfig, HealthSettings, MethodSettings, ReportSettings, RetryPolicy,
    StoreKind, StoreSettings, Thresholds, Timeouts,
};
pub use validator::validate;
