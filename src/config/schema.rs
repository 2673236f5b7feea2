//! Configuration schema definitions for mcpcheck.
//!
//! This module contains the struct definitions that map to the YAML
//! configuration file format. Every section is optional; missing fields
//! take the documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for `.mcpcheck/config.yml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Per-operation deadlines.
    pub timeouts: Timeouts,
    /// Whole-sequence retry policy.
    pub retry: RetryPolicy,
    /// Settle and pacing delays.
    pub delays: Delays,
    /// Which install methods may be tested.
    pub methods: MethodSettings,
    /// Health probe tuning.
    pub health: HealthSettings,
    /// Readiness cutoffs.
    pub thresholds: Thresholds,
    /// Attempt store connection.
    pub store: StoreSettings,
    /// Report output.
    pub report: ReportSettings,
}

/// Deadlines, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Whole install phase.
    pub install_ms: u64,
    /// One registry (HTTP index) query.
    pub registry_ms: u64,
    /// One package-manager dry run.
    pub dry_run_ms: u64,
    /// Health probe; must be shorter than `install_ms`.
    pub health_ms: u64,
    /// Pause between launching a server and sending the handshake.
    pub health_warmup_ms: u64,
    /// One artifact-removal command.
    pub cleanup_ms: u64,
    /// One prerequisite `--version` probe.
    pub detect_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            install_ms: 60_000,
            registry_ms: 5_000,
            dry_run_ms: 30_000,
            health_ms: 10_000,
            health_warmup_ms: 1_000,
            cleanup_ms: 30_000,
            detect_ms: 5_000,
        }
    }
}

impl Timeouts {
    pub fn install(&self) -> Duration {
        Duration::from_millis(self.install_ms)
    }

    pub fn registry(&self) -> Duration {
        Duration::from_millis(self.registry_ms)
    }

    pub fn dry_run(&self) -> Duration {
        Duration::from_millis(self.dry_run_ms)
    }

    pub fn health(&self) -> Duration {
        Duration::from_millis(self.health_ms)
    }

    pub fn health_warmup(&self) -> Duration {
        Duration::from_millis(self.health_warmup_ms)
    }

    pub fn cleanup(&self) -> Duration {
        Duration::from_millis(self.cleanup_ms)
    }

    pub fn detect(&self) -> Duration {
        Duration::from_millis(self.detect_ms)
    }
}

/// How often a failing item is re-run from the install phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts per item, including the first.
    pub max_attempts: u32,
    /// Backoff grows by this much per attempt.
    pub backoff_base_ms: u64,
    /// Backoff never exceeds this.
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 5_000,
        }
    }
}

/// Fixed waits, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    /// Wait between install and the first verification poll.
    pub settle_ms: u64,
    /// Wait after each item before the next one starts.
    pub inter_item_ms: u64,
    /// Wait between verification polls.
    pub verify_poll_interval_ms: u64,
    /// Verification polls before giving up on a record becoming visible.
    pub verify_max_polls: u32,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            settle_ms: 2_000,
            inter_item_ms: 3_000,
            verify_poll_interval_ms: 1_000,
            verify_max_polls: 3,
        }
    }
}

impl Delays {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn inter_item(&self) -> Duration {
        Duration::from_millis(self.inter_item_ms)
    }

    pub fn verify_poll_interval(&self) -> Duration {
        Duration::from_millis(self.verify_poll_interval_ms)
    }
}

/// Install method allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSettings {
    /// Method kinds (`npx`, `python`, `pip`, `uvx`, `zero-install`) or raw
    /// program names for custom commands.
    pub allowed: Vec<String>,
}

impl Default for MethodSettings {
    fn default() -> Self {
        Self {
            allowed: ["npx", "python", "pip", "uvx", "zero-install"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Health probe tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Case-insensitive keywords that mark a server as ready.
    pub ready_patterns: Vec<String>,
    /// Protocol version sent in the initialize handshake.
    pub protocol_version: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            ready_patterns: [
                "ready",
                "listening",
                "started",
                "running on",
                "server running",
                "initialized",
                "connected",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            protocol_version: "2024-11-05".to_string(),
        }
    }
}

/// Readiness cutoffs, as fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum item success rate for READY.
    pub ready_success_rate: f64,
    /// Minimum item success rate for CAUTION.
    pub caution_success_rate: f64,
    /// Per-OS minimum environment compatibility rate for READY.
    pub environment_compat: BTreeMap<String, f64>,
    /// Used when the OS has no entry in `environment_compat`.
    pub default_environment_compat: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        let mut environment_compat = BTreeMap::new();
        environment_compat.insert("linux".to_string(), 0.80);
        environment_compat.insert("macos".to_string(), 0.80);
        environment_compat.insert("windows".to_string(), 0.60);
        Self {
            ready_success_rate: 0.85,
            caution_success_rate: 0.70,
            environment_compat,
            default_environment_compat: 0.80,
        }
    }
}

impl Thresholds {
    /// Environment compatibility cutoff for an OS name.
    pub fn environment_compat_for(&self, os: &str) -> f64 {
        self.environment_compat
            .get(os)
            .copied()
            .unwrap_or(self.default_environment_compat)
    }
}

/// Which attempt store backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process store; records live for the session only.
    #[default]
    Memory,
    /// PostgREST-style HTTP store.
    Rest,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rest" => Ok(Self::Rest),
            _ => Err(format!("unknown store kind: {}", s)),
        }
    }
}

/// Attempt store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Base URL for the REST store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Table holding install attempts.
    pub attempts_table: String,
    /// Table holding the subject catalog.
    pub subjects_table: String,
    /// Per-request deadline.
    pub request_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            url: None,
            api_key_env: "MCPCHECK_STORE_KEY".to_string(),
            attempts_table: "install_attempts".to_string(),
            subjects_table: "mcp_servers".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Report output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Directory for session JSON, summaries and run logs.
    pub dir: PathBuf,
    /// Rows in the error frequency table.
    pub top_errors: usize,
    /// Run log entries buffered between flushes.
    pub log_flush_every: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("mcpcheck-reports"),
            top_errors: 5,
            log_flush_every: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config: HarnessConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.delays.settle_ms, 2_000);
        assert_eq!(config.delays.inter_item_ms, 3_000);
        assert_eq!(config.timeouts.health_ms, 10_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
retry:
  max_attempts: 5
delays:
  settle_ms: 10
store:
  kind: rest
  url: https://store.example.com
"#;
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_cap_ms, 5_000);
        assert_eq!(config.delays.settle_ms, 10);
        assert_eq!(config.delays.inter_item_ms, 3_000);
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert_eq!(config.store.attempts_table, "install_attempts");
    }

    #[test]
    fn environment_compat_falls_back_to_default() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.environment_compat_for("windows"), 0.60);
        assert_eq!(thresholds.environment_compat_for("freebsd"), 0.80);
    }

    #[test]
    fn store_kind_parses_case_insensitively() {
        assert_eq!("REST".parse::<StoreKind>().unwrap(), StoreKind::Rest);
        assert!("sqlite".parse::<StoreKind>().is_err());
    }

    #[test]
    fn default_allow_list_covers_builtin_methods() {
        let methods = MethodSettings::default();
        for kind in ["npx", "python", "pip", "uvx", "zero-install"] {
            assert!(methods.allowed.iter().any(|m| m == kind));
        }
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = HarnessConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: HarnessConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }
}
