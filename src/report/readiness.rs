//! Readiness verdict from session metrics and configured thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::summary::SessionSummary;
use crate::config::Thresholds;
use crate::runner::{ExclusionReason, QueuePlan};
use crate::verify::{critical_failures, StoreCheckResult};

/// Overall judgement of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ready,
    Caution,
    NotReady,
}

impl Verdict {
    /// Process exit code for the verdict.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ready => 0,
            Self::Caution => 1,
            Self::NotReady => 2,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::Caution => "CAUTION",
            Self::NotReady => "NOT_READY",
        };
        f.pad(s)
    }
}

/// Inputs to the verdict, kept with the session for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub tested_items: usize,
    pub success_rate: f64,
    pub environment_compat_rate: f64,
    /// Cutoff that applied to this platform.
    pub environment_threshold: f64,
    pub critical_store_failures: usize,
    pub verdict: Verdict,
}

/// Compatible items over items that were compatible or lacked a tool.
///
/// Allow-list exclusions are a configuration choice, not an environment
/// problem, and are not counted.
pub fn environment_compat_rate(plan: &QueuePlan) -> f64 {
    let compatible = plan.items.len();
    let missing = plan.missing_prerequisites().count();
    let denominator = compatible + missing;
    if denominator == 0 {
        1.0
    } else {
        compatible as f64 / denominator as f64
    }
}

/// Compute the metrics and the verdict they imply.
pub fn assess(
    summary: &SessionSummary,
    plan: &QueuePlan,
    store_checks: &[StoreCheckResult],
    thresholds: &Thresholds,
    os: &str,
) -> QualityMetrics {
    let mut metrics = QualityMetrics {
        tested_items: summary.total_items,
        success_rate: summary.success_rate,
        environment_compat_rate: environment_compat_rate(plan),
        environment_threshold: thresholds.environment_compat_for(os),
        critical_store_failures: critical_failures(store_checks).len(),
        verdict: Verdict::NotReady,
    };
    metrics.verdict = classify(&metrics, thresholds);
    metrics
}

/// Apply the threshold rules. No tested items is never ready.
pub fn classify(metrics: &QualityMetrics, thresholds: &Thresholds) -> Verdict {
    if metrics.tested_items == 0 {
        return Verdict::NotReady;
    }
    if metrics.success_rate >= thresholds.ready_success_rate
        && metrics.environment_compat_rate >= metrics.environment_threshold
        && metrics.critical_store_failures == 0
    {
        Verdict::Ready
    } else if metrics.success_rate >= thresholds.caution_success_rate {
        Verdict::Caution
    } else {
        Verdict::NotReady
    }
}

/// Advice for the human-readable report.
pub fn recommendations(
    summary: &SessionSummary,
    plan: &QueuePlan,
    store_checks: &[StoreCheckResult],
    metrics: &QualityMetrics,
    thresholds: &Thresholds,
) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.tested_items == 0 {
        out.push("No items were tested; check the catalog, allow-list and prerequisites.".into());
    }

    for (method, stats) in &summary.by_method {
        if stats.items > 0 && stats.success_rate < thresholds.caution_success_rate {
            out.push(format!(
                "{} installs pass {:.0}% of the time ({}/{}); investigate this method.",
                method,
                stats.success_rate * 100.0,
                stats.passed,
                stats.items
            ));
        }
    }

    let timeouts: usize = summary
        .top_errors
        .iter()
        .filter(|e| e.error.contains("timeout"))
        .map(|e| e.count)
        .sum();
    if timeouts > 0 && timeouts * 2 >= summary.failed_attempts.max(1) {
        out.push(format!(
            "{} failure(s) were timeouts; consider raising the install or health timeouts.",
            timeouts
        ));
    }

    let mut missing: Vec<String> = plan
        .exclusions
        .iter()
        .filter_map(|e| match &e.reason {
            ExclusionReason::MissingPrerequisite { tool } => Some(tool.to_string()),
            _ => None,
        })
        .collect();
    missing.sort();
    missing.dedup();
    if !missing.is_empty() {
        out.push(format!(
            "Install missing tools to widen coverage: {}.",
            missing.join(", ")
        ));
    }

    for check in store_checks.iter().filter(|c| !c.passed) {
        if check.critical {
            out.push(format!("Critical store check '{}' failed: {}", check.name, check.detail));
        } else {
            out.push(format!("Store check '{}' failed: {}", check.name, check.detail));
        }
    }

    if !summary.exhausted.is_empty() {
        out.push(format!(
            "{} item(s) failed every attempt; see the exhausted list for root causes.",
            summary.exhausted.len()
        ));
    }

    out
}
