//! The complete record of one run, as a single serializable graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;
use crate::config::HarnessConfig;
use crate::detection::Prerequisites;
use crate::report::{assess, recommendations, summarize, QualityMetrics, SessionSummary, Verdict};
use crate::runner::{ItemRun, QueuePlan, ScheduleResult, TestOutcome};
use crate::shell::PlatformInfo;
use crate::verify::StoreCheckResult;

/// Everything one orchestration run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub platform: PlatformInfo,
    pub config: HarnessConfig,
    /// Catalog file the subjects came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    /// Store backend description.
    pub store: String,
    pub prerequisites: Prerequisites,
    pub store_checks: Vec<StoreCheckResult>,
    pub plan: QueuePlan,
    /// Item runs in queue order, each with every attempt.
    pub runs: Vec<ItemRun>,
    /// Stopped before the queue finished.
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub summary: SessionSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl TestSession {
    pub fn new(id: SessionId, config: HarnessConfig, platform: PlatformInfo) -> Self {
        Self {
            started_at: id.timestamp(),
            id,
            finished_at: None,
            platform,
            config,
            catalog: None,
            store: String::new(),
            prerequisites: Prerequisites::default(),
            store_checks: Vec::new(),
            plan: QueuePlan::default(),
            runs: Vec::new(),
            aborted: false,
            summary: SessionSummary::default(),
            metrics: None,
            recommendations: Vec::new(),
        }
    }

    /// Take the scheduler's results.
    pub fn record(&mut self, result: ScheduleResult) {
        self.runs = result.runs;
        self.aborted = result.aborted;
    }

    /// Compute the summary, metrics and recommendations; stamp the end time.
    pub fn finalize(&mut self) {
        self.summary = summarize(&self.runs, self.config.report.top_errors);
        let metrics = assess(
            &self.summary,
            &self.plan,
            &self.store_checks,
            &self.config.thresholds,
            &self.platform.os,
        );
        self.recommendations = recommendations(
            &self.summary,
            &self.plan,
            &self.store_checks,
            &metrics,
            &self.config.thresholds,
        );
        if self.aborted {
            self.recommendations
                .push("Session was stopped early; results cover only the items that ran.".into());
        }
        self.metrics = Some(metrics);
        self.finished_at = Some(Utc::now());
    }

    /// Verdict, or NOT_READY for a session that was never finalized.
    pub fn verdict(&self) -> Verdict {
        self.metrics
            .as_ref()
            .map(|m| m.verdict)
            .unwrap_or(Verdict::NotReady)
    }

    /// Every attempt in queue order.
    pub fn outcomes(&self) -> impl Iterator<Item = &TestOutcome> {
        self.runs.iter().flat_map(|r| r.outcomes.iter())
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }
}
