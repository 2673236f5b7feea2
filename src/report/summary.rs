//! Aggregate statistics over a finished queue.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::runner::{ItemRun, PhaseResult};

/// Counts for one method kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub items: usize,
    pub passed: usize,
    pub attempts: usize,
    pub success_rate: f64,
}

/// Duration spread for one phase, over the attempts where it ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub count: usize,
    pub min_ms: u64,
    pub avg_ms: u64,
    pub max_ms: u64,
}

impl TimingStats {
    fn from_durations(durations: &[u64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let total: u64 = durations.iter().sum();
        Self {
            count: durations.len(),
            min_ms: durations.iter().copied().min().unwrap_or(0),
            avg_ms: total / durations.len() as u64,
            max_ms: durations.iter().copied().max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub install: TimingStats,
    pub verify: TimingStats,
    pub cleanup: TimingStats,
}

/// One row of the error frequency table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error: String,
    pub count: usize,
}

/// An item that failed on every allowed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustedItem {
    pub subject_id: String,
    pub method: String,
    pub attempts: usize,
    /// Root causes of the final attempt.
    pub last_errors: Vec<String>,
}

/// Session-wide numbers. Rates are fractions in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Items with at least one attempt.
    pub total_items: usize,
    pub passed_items: usize,
    pub failed_items: usize,
    /// Passed items over tested items.
    pub success_rate: f64,
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub failed_attempts: usize,
    pub attempt_success_rate: f64,
    /// Items stopped before finishing.
    pub aborted_items: usize,
    pub by_method: BTreeMap<String, MethodStats>,
    pub timings: PhaseTimings,
    pub top_errors: Vec<ErrorCount>,
    pub exhausted: Vec<ExhaustedItem>,
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn durations<'a>(phases: impl Iterator<Item = &'a PhaseResult>) -> Vec<u64> {
    phases.filter(|p| p.ran).map(|p| p.duration_ms).collect()
}

/// Summarise every item run; `top_errors` bounds the error table.
pub fn summarize(runs: &[ItemRun], top_errors: usize) -> SessionSummary {
    let mut summary = SessionSummary::default();
    let mut errors: HashMap<String, usize> = HashMap::new();

    for run in runs {
        if run.aborted {
            summary.aborted_items += 1;
        }
        if run.outcomes.is_empty() {
            continue;
        }
        summary.total_items += 1;
        if run.passed {
            summary.passed_items += 1;
        } else {
            summary.failed_items += 1;
        }

        let stats = summary
            .by_method
            .entry(run.item.method_kind().to_string())
            .or_default();
        stats.items += 1;
        stats.attempts += run.outcomes.len();
        if run.passed {
            stats.passed += 1;
        }

        for outcome in &run.outcomes {
            summary.total_attempts += 1;
            if outcome.success {
                summary.successful_attempts += 1;
            } else {
                summary.failed_attempts += 1;
            }
            for cause in outcome.root_causes() {
                *errors.entry(cause).or_default() += 1;
            }
        }

        if run.exhausted {
            summary.exhausted.push(ExhaustedItem {
                subject_id: run.item.subject_id.clone(),
                method: run.item.method_label(),
                attempts: run.outcomes.len(),
                last_errors: run.last_root_causes(),
            });
        }
    }

    for stats in summary.by_method.values_mut() {
        stats.success_rate = rate(stats.passed, stats.items);
    }
    summary.success_rate = rate(summary.passed_items, summary.total_items);
    summary.attempt_success_rate = rate(summary.successful_attempts, summary.total_attempts);

    let outcomes = || runs.iter().flat_map(|r| r.outcomes.iter());
    summary.timings = PhaseTimings {
        install: TimingStats::from_durations(&durations(outcomes().map(|o| &o.install))),
        verify: TimingStats::from_durations(&durations(outcomes().map(|o| &o.verify))),
        cleanup: TimingStats::from_durations(&durations(outcomes().map(|o| &o.cleanup))),
    };

    let mut table: Vec<ErrorCount> = errors
        .into_iter()
        .map(|(error, count)| ErrorCount { error, count })
        .collect();
    table.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));
    table.truncate(top_errors);
    summary.top_errors = table;

    summary
}
