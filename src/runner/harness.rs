//! Session driver: detection, store checks, queue, execution, report data.
//!
//! Only session-level problems come back as `Err`: the store being
//! unreachable at start-up, or a stop before anything could run. Every
//! per-item failure is inside the returned [`TestSession`].

use std::collections::BTreeSet;
use tracing::info;

use super::orchestrator::PhaseOrchestrator;
use super::scheduler::{build_queue, ProgressEvent, QueuePlan, SequentialScheduler};
use crate::catalog::{MethodKind, Subject};
use crate::cleanup::CleanupExecutor;
use crate::config::HarnessConfig;
use crate::detection::{detect, Prerequisites};
use crate::error::{McpCheckError, Result};
use crate::install::{HealthProbe, InstallationExecutor, PackageIndex};
use crate::logging::RunLog;
use crate::session::{SessionId, TestSession};
use crate::shell::{PlatformInfo, ProcessRunner, StopSignal};
use crate::store::AttemptStore;
use crate::verify::{default_suite, run_suite, unreachable};

const COMPONENT: &str = "session";

/// Options for one session.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only test these subject ids; empty means all.
    pub only_subjects: Vec<String>,
    /// Catalog path, recorded with the session.
    pub catalog: Option<String>,
}

/// Collaborators for a session.
pub struct Harness<'a> {
    config: &'a HarnessConfig,
    runner: &'a dyn ProcessRunner,
    index: &'a dyn PackageIndex,
    probe: &'a dyn HealthProbe,
    store: &'a dyn AttemptStore,
    stop: StopSignal,
    platform: PlatformInfo,
}

impl<'a> Harness<'a> {
    pub fn new(
        config: &'a HarnessConfig,
        runner: &'a dyn ProcessRunner,
        index: &'a dyn PackageIndex,
        probe: &'a dyn HealthProbe,
        store: &'a dyn AttemptStore,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            runner,
            index,
            probe,
            store,
            stop,
            platform: PlatformInfo::current(),
        }
    }

    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    /// Probe the tools the catalog needs.
    pub fn detect_prerequisites(&self, subjects: &[Subject]) -> Prerequisites {
        detect(
            self.runner,
            &required_tools(subjects),
            self.config.timeouts.detect(),
        )
    }

    /// Build the queue without running anything.
    pub fn plan(&self, subjects: &[Subject], options: &RunOptions) -> (Prerequisites, QueuePlan) {
        let prerequisites = self.detect_prerequisites(subjects);
        let plan = build_queue(subjects, self.config, &prerequisites, &options.only_subjects);
        (prerequisites, plan)
    }

    /// Run a full session without progress reporting.
    pub fn run(
        &self,
        id: SessionId,
        subjects: &[Subject],
        options: &RunOptions,
        log: &RunLog,
    ) -> Result<TestSession> {
        self.run_with_progress(id, subjects, options, log, |_| {})
    }

    /// Run a full session, reporting item progress.
    pub fn run_with_progress(
        &self,
        id: SessionId,
        subjects: &[Subject],
        options: &RunOptions,
        log: &RunLog,
        on_progress: impl FnMut(ProgressEvent<'_>),
    ) -> Result<TestSession> {
        let mut session = TestSession::new(id, self.config.clone(), self.platform.clone());
        session.catalog = options.catalog.clone();
        session.store = self.store.describe();
        log.info(
            COMPONENT,
            format!(
                "session {} on {} with {} subject(s), store {}",
                session.id,
                self.platform.label(),
                subjects.len(),
                session.store
            ),
        );

        session.store_checks = run_suite(self.store, &default_suite(&self.config.store));
        for check in &session.store_checks {
            if !check.passed {
                log.warn(
                    COMPONENT,
                    format!("store check '{}' failed: {}", check.name, check.detail),
                );
            }
        }
        if let Some(down) = unreachable(&session.store_checks) {
            log.error(COMPONENT, format!("store unreachable: {}", down.detail));
            return Err(McpCheckError::StoreUnreachable {
                message: down.detail.clone(),
            });
        }

        let (prerequisites, plan) = self.plan(subjects, options);
        for kind in prerequisites.missing() {
            log.warn(COMPONENT, format!("{} not available; its methods are excluded", kind));
        }
        log.info(
            COMPONENT,
            format!(
                "queue: {} item(s), {} exclusion(s), {} skipped subject(s)",
                plan.items.len(),
                plan.exclusions.len(),
                plan.skipped.len()
            ),
        );
        session.prerequisites = prerequisites;
        session.plan = plan;

        if self.stop.is_stopped() {
            return Err(McpCheckError::Aborted);
        }

        let installer = InstallationExecutor::new(
            self.runner,
            self.index,
            self.probe,
            self.config,
            &session.prerequisites,
        );
        let cleaner =
            CleanupExecutor::new(self.runner, self.store, self.config, &session.prerequisites);
        let orchestrator =
            PhaseOrchestrator::new(&installer, &cleaner, self.store, self.config, self.stop.clone())
                .with_platform(self.platform.clone())
                .with_session_id(session.id.to_string());
        let scheduler = SequentialScheduler::new(&orchestrator, self.config, self.stop.clone());
        let result = scheduler.run_with_progress(&session.plan.items, log, on_progress);

        session.record(result);
        session.finalize();
        info!(
            "Session {} finished: {} ({}/{} items passed)",
            session.id,
            session.verdict(),
            session.summary.passed_items,
            session.summary.total_items
        );
        log.info(COMPONENT, format!("verdict {}", session.verdict()));
        Ok(session)
    }
}

/// Every package-manager tool any subject's methods would need.
pub fn required_tools(subjects: &[Subject]) -> Vec<MethodKind> {
    let tools: BTreeSet<MethodKind> = subjects
        .iter()
        .flat_map(|s| s.install_methods.iter())
        .filter_map(|raw| raw.resolve().ok())
        .flat_map(|m| m.required_tools())
        .collect();
    tools.into_iter().collect()
}
