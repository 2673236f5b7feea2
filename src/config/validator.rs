//! Configuration validation.
//!
//! Runs once at startup. Any violation is a session-level error: nothing
//! is tested with a configuration that cannot produce a meaningful verdict.

use crate::config::schema::{HarnessConfig, StoreKind};
use crate::error::{McpCheckError, Result};

/// Validate a fully merged configuration.
///
/// All problems are collected and reported together.
pub fn validate(config: &HarnessConfig) -> Result<()> {
    let problems = collect_problems(config);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(McpCheckError::ConfigValidationError {
            message: problems.join("; "),
        })
    }
}

/// List every rule the configuration breaks.
pub fn collect_problems(config: &HarnessConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.retry.max_attempts == 0 {
        problems.push("retry.max_attempts must be at least 1".to_string());
    }
    if config.retry.backoff_cap_ms < config.retry.backoff_base_ms {
        problems.push("retry.backoff_cap_ms must not be below retry.backoff_base_ms".to_string());
    }

    if config.timeouts.health_ms >= config.timeouts.install_ms {
        problems.push(format!(
            "timeouts.health_ms ({}) must be shorter than timeouts.install_ms ({})",
            config.timeouts.health_ms, config.timeouts.install_ms
        ));
    }
    for (name, value) in [
        ("timeouts.install_ms", config.timeouts.install_ms),
        ("timeouts.registry_ms", config.timeouts.registry_ms),
        ("timeouts.dry_run_ms", config.timeouts.dry_run_ms),
        ("timeouts.health_ms", config.timeouts.health_ms),
        ("timeouts.cleanup_ms", config.timeouts.cleanup_ms),
        ("timeouts.detect_ms", config.timeouts.detect_ms),
    ] {
        if value == 0 {
            problems.push(format!("{} must be greater than 0", name));
        }
    }

    if config.delays.verify_max_polls == 0 {
        problems.push("delays.verify_max_polls must be at least 1".to_string());
    }

    let t = &config.thresholds;
    for (name, value) in [
        ("thresholds.ready_success_rate", t.ready_success_rate),
        ("thresholds.caution_success_rate", t.caution_success_rate),
        (
            "thresholds.default_environment_compat",
            t.default_environment_compat,
        ),
    ] {
        if !(0.0..=1.0).contains(&value) {
            problems.push(format!("{} must be between 0 and 1", name));
        }
    }
    for (os, value) in &t.environment_compat {
        if !(0.0..=1.0).contains(value) {
            problems.push(format!(
                "thresholds.environment_compat.{} must be between 0 and 1",
                os
            ));
        }
    }
    if t.caution_success_rate > t.ready_success_rate {
        problems.push(
            "thresholds.caution_success_rate must not exceed thresholds.ready_success_rate"
                .to_string(),
        );
    }

    if config.methods.allowed.is_empty() {
        problems.push("methods.allowed must list at least one method".to_string());
    }
    for entry in &config.methods.allowed {
        if entry.trim().is_empty()
            || entry.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            problems.push(format!(
                "methods.allowed entry {:?} must be a method kind or a bare program name",
                entry
            ));
        }
    }

    if config.store.kind == StoreKind::Rest {
        match &config.store.url {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
            Some(url) => problems.push(format!("store.url {:?} must be an http(s) URL", url)),
            None => problems.push("store.url is required when store.kind is rest".to_string()),
        }
    }
    if config.store.attempts_table.trim().is_empty() {
        problems.push("store.attempts_table must not be empty".to_string());
    }

    if config.report.top_errors == 0 {
        problems.push("report.top_errors must be at least 1".to_string());
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&HarnessConfig::default()).is_ok());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = HarnessConfig::default();
        config.retry.max_attempts = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn health_timeout_must_be_shorter_than_install() {
        let mut config = HarnessConfig::default();
        config.timeouts.health_ms = config.timeouts.install_ms;
        let problems = collect_problems(&config);
        assert!(problems.iter().any(|p| p.contains("health_ms")));
    }

    #[test]
    fn thresholds_must_be_ordered_fractions() {
        let mut config = HarnessConfig::default();
        config.thresholds.ready_success_rate = 0.6;
        config.thresholds.caution_success_rate = 0.7;
        config
            .thresholds
            .environment_compat
            .insert("linux".into(), 1.5);
        let problems = collect_problems(&config);
        assert!(problems.iter().any(|p| p.contains("must not exceed")));
        assert!(problems.iter().any(|p| p.contains("environment_compat.linux")));
    }

    #[test]
    fn rest_store_needs_url() {
        let mut config = HarnessConfig::default();
        config.store.kind = StoreKind::Rest;
        assert!(collect_problems(&config)
            .iter()
            .any(|p| p.contains("store.url is required")));

        config.store.url = Some("db.example.com".into());
        assert!(collect_problems(&config)
            .iter()
            .any(|p| p.contains("http(s) URL")));

        config.store.url = Some("https://db.example.com".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn allow_list_entries_are_checked() {
        let mut config = HarnessConfig::default();
        config.methods.allowed = vec![];
        assert!(validate(&config).is_err());

        config.methods.allowed = vec!["npx".into(), "/usr/bin/node".into()];
        let problems = collect_problems(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("/usr/bin/node"));

        config.methods.allowed = vec!["npx".into(), "deno".into()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn problems_are_joined() {
        let mut config = HarnessConfig::default();
        config.retry.max_attempts = 0;
        config.report.top_errors = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("max_attempts"));
        assert!(err.contains("top_errors"));
    }
}
