//! `MCPCHECK_*` environment overrides.
//!
//! Applied once, after the file layers are merged and before validation.
//! The lookup function is injectable so tests never touch the real
//! process environment.

use crate::config::schema::{HarnessConfig, StoreKind};
use crate::error::{McpCheckError, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Apply overrides from the real process environment.
pub fn apply_env_overrides(config: &mut HarnessConfig) -> Result<()> {
    apply_env_overrides_with(config, |key: &str| std::env::var(key))
}

/// Apply overrides using a custom lookup.
pub fn apply_env_overrides_with<F>(config: &mut HarnessConfig, env_fn: F) -> Result<()>
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    if let Some(v) = parsed::<u32, _>(&env_fn, "MCPCHECK_MAX_ATTEMPTS")? {
        config.retry.max_attempts = v;
    }
    if let Some(v) = parsed::<u64, _>(&env_fn, "MCPCHECK_SETTLE_DELAY_MS")? {
        config.delays.settle_ms = v;
    }
    if let Some(v) = parsed::<u64, _>(&env_fn, "MCPCHECK_INTER_ITEM_DELAY_MS")? {
        config.delays.inter_item_ms = v;
    }
    if let Some(v) = parsed::<u64, _>(&env_fn, "MCPCHECK_HEALTH_TIMEOUT_MS")? {
        config.timeouts.health_ms = v;
    }
    if let Some(v) = parsed::<u64, _>(&env_fn, "MCPCHECK_INSTALL_TIMEOUT_MS")? {
        config.timeouts.install_ms = v;
    }
    if let Ok(list) = env_fn("MCPCHECK_ALLOWED_METHODS") {
        config.methods.allowed = split_list(&list);
    }
    if let Ok(url) = env_fn("MCPCHECK_STORE_URL") {
        if !url.trim().is_empty() {
            config.store.url = Some(url.trim().to_string());
        }
    }
    if let Some(kind) = parsed::<StoreKind, _>(&env_fn, "MCPCHECK_STORE_KIND")? {
        config.store.kind = kind;
    }
    if let Ok(dir) = env_fn("MCPCHECK_REPORT_DIR") {
        if !dir.trim().is_empty() {
            config.report.dir = PathBuf::from(dir.trim());
        }
    }
    Ok(())
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parsed<T, F>(env_fn: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    match env_fn(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| McpCheckError::ConfigValidationError {
                message: format!("{}={:?} is not valid: {}", key, raw, e),
            }),
        Err(_) => Ok(None),
    }
}
