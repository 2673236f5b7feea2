//! Drives one item through install, verify and cleanup, with retries.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::backoff::backoff_delay;
use super::outcome::{FailureKind, Phase, PhaseResult, PhaseTimer, TestItem, TestOutcome};
use crate::cleanup::CleanupPhase;
use crate::config::HarnessConfig;
use crate::install::InstallPhase;
use crate::logging::RunLog;
use crate::shell::{PlatformInfo, StopSignal};
use crate::store::{AttemptStatus, AttemptStore, NewAttempt};
use crate::verify::VerificationClient;

const COMPONENT: &str = "orchestrator";

/// Every attempt made for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRun {
    pub item: TestItem,
    pub outcomes: Vec<TestOutcome>,
    /// Some attempt succeeded.
    pub passed: bool,
    /// Failed on every allowed attempt.
    pub exhausted: bool,
    /// Cut short by a stop request.
    pub aborted: bool,
}

impl ItemRun {
    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    /// Root causes of the last attempt, for reports.
    pub fn last_root_causes(&self) -> Vec<String> {
        self.outcomes
            .last()
            .map(TestOutcome::root_causes)
            .unwrap_or_default()
    }
}

/// Runs attempts for one item at a time.
pub struct PhaseOrchestrator<'a> {
    install: &'a dyn InstallPhase,
    cleanup: &'a dyn CleanupPhase,
    store: &'a dyn AttemptStore,
    config: &'a HarnessConfig,
    stop: StopSignal,
    platform: PlatformInfo,
    session_id: String,
}

impl<'a> PhaseOrchestrator<'a> {
    pub fn new(
        install: &'a dyn InstallPhase,
        cleanup: &'a dyn CleanupPhase,
        store: &'a dyn AttemptStore,
        config: &'a HarnessConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            install,
            cleanup,
            store,
            config,
            stop,
            platform: PlatformInfo::current(),
            session_id: String::new(),
        }
    }

    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Run the whole three-phase sequence until it passes or attempts run out.
    pub fn run_item(&self, item: &TestItem, log: &RunLog) -> ItemRun {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut outcomes = Vec::new();
        let mut passed = false;
        let mut aborted = false;

        for attempt in 1..=max_attempts {
            if self.stop.is_stopped() {
                aborted = true;
                break;
            }

            let outcome = self.run_attempt(item, attempt, log);
            let succeeded = outcome.success;
            let was_aborted = outcome.was_aborted();
            if !succeeded {
                log.warn(
                    COMPONENT,
                    format!(
                        "{}: attempt {}/{} failed: {}",
                        item.describe(),
                        attempt,
                        max_attempts,
                        outcome.root_causes().join("; ")
                    ),
                );
            }
            outcomes.push(outcome);

            if succeeded {
                passed = true;
                break;
            }
            if was_aborted {
                aborted = true;
                break;
            }
            if attempt < max_attempts {
                let delay = backoff_delay(&self.config.retry, attempt);
                log.info(
                    COMPONENT,
                    format!("{}: retrying in {}ms", item.describe(), delay.as_millis()),
                );
                if !self.stop.wait(delay) {
                    aborted = true;
                    break;
                }
            }
        }

        let exhausted = !passed && !aborted && outcomes.len() as u32 == max_attempts;
        if exhausted {
            log.error(
                COMPONENT,
                format!("{}: retries exhausted after {} attempts", item.describe(), max_attempts),
            );
        }
        ItemRun {
            item: item.clone(),
            outcomes,
            passed,
            exhausted,
            aborted,
        }
    }

    /// One attempt: record, install, verify, and always clean up.
    pub fn run_attempt(&self, item: &TestItem, attempt: u32, log: &RunLog) -> TestOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        log.info(
            COMPONENT,
            format!("{}: attempt {} starting", item.describe(), attempt),
        );

        let record = NewAttempt {
            subject_id: item.subject_id.clone(),
            method: item.method_label(),
            platform: self.platform.clone(),
            session_id: self.session_id.clone(),
        };
        let install = match self.store.insert_attempt(&record) {
            Ok(attempt_id) => {
                let result = self.install.install(item, log);
                self.record_install(&attempt_id, &result, log);
                result
            }
            Err(e) => PhaseTimer::start(Phase::Install).fail(
                FailureKind::StoreConnectivity,
                format!("could not record attempt: {}", e),
            ),
        };

        let verify = if install.success {
            self.verify(item, log)
        } else {
            PhaseResult::not_run(Phase::Verify, "skipped: install failed")
        };

        let cleanup = self.cleanup.cleanup(item, log);

        TestOutcome::new(
            item.clone(),
            attempt,
            install,
            verify,
            cleanup,
            started_at,
            clock.elapsed().as_millis() as u64,
        )
    }

    fn record_install(&self, attempt_id: &str, install: &PhaseResult, log: &RunLog) {
        let (status, error) = if install.success {
            (AttemptStatus::Success, None)
        } else {
            (AttemptStatus::Failed, install.error.as_deref())
        };
        if let Err(e) = self.store.update_attempt_status(attempt_id, status, error) {
            // Verification will surface the stale record.
            log.warn(
                COMPONENT,
                format!("could not update attempt {}: {}", attempt_id, e),
            );
        }
    }

    /// Settle, then poll until the record is visible or polls run out.
    fn verify(&self, item: &TestItem, log: &RunLog) -> PhaseResult {
        let settle = self.config.delays.settle();
        debug!("Settling {}ms before verification", settle.as_millis());
        if !self.stop.wait(settle) {
            return PhaseTimer::start(Phase::Verify)
                .fail(FailureKind::Aborted, "verification aborted");
        }

        let mut timer = PhaseTimer::start(Phase::Verify);
        let client = VerificationClient::new(self.store);
        let max_polls = self.config.delays.verify_max_polls.max(1);

        let mut last_pending = false;
        for poll in 1..=max_polls {
            match client.verify(&item.subject_id) {
                Err(e) => {
                    log.warn(COMPONENT, format!("{}: verification query failed: {}", item.describe(), e));
                    return timer.fail(
                        FailureKind::StoreConnectivity,
                        format!("store query failed: {}", e),
                    );
                }
                Ok(report) if report.is_pending() => {
                    timer.log(format!("poll {}/{}: latest status still 'pending'", poll, max_polls));
                    last_pending = true;
                }
                Ok(report) if report.found => {
                    let status = report.status.clone().unwrap_or_default();
                    timer.log(format!("poll {}/{}: latest status '{}'", poll, max_polls, status));
                    if report.is_success() {
                        return timer.succeed();
                    }
                    return timer.fail(
                        FailureKind::StoreInconsistency,
                        format!("latest attempt has status '{}', expected 'success'", status),
                    );
                }
                Ok(_) => {
                    last_pending = false;
                    timer.log(format!("poll {}/{}: no record visible yet", poll, max_polls));
                }
            }
            if poll < max_polls && !self.stop.wait(self.config.delays.verify_poll_interval()) {
                return timer.fail(FailureKind::Aborted, "verification aborted");
            }
        }

        let reason = if last_pending {
            format!("latest attempt still 'pending' after {} polls", max_polls)
        } else {
            format!("no attempt record visible after {} polls", max_polls)
        };
        timer.fail(FailureKind::StoreInconsistency, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RawInstallMethod;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` installs, then succeeds.
    struct FlakyInstall {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyInstall {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl InstallPhase for FlakyInstall {
        fn install(&self, _item: &TestItem, _log: &RunLog) -> PhaseResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let timer = PhaseTimer::start(Phase::Install);
            if n < self.failures {
                timer.fail(FailureKind::Timeout, "install timeout after 10ms")
            } else {
                timer.succeed()
            }
        }
    }

    struct StoreCleanup<'a>(&'a MemoryStore, AtomicU32);

    impl CleanupPhase for StoreCleanup<'_> {
        fn cleanup(&self, item: &TestItem, _log: &RunLog) -> PhaseResult {
            self.1.fetch_add(1, Ordering::SeqCst);
            let timer = PhaseTimer::start(Phase::Cleanup);
            match self.0.delete_attempts(&item.subject_id) {
                Ok(_) => timer.succeed(),
                Err(e) => timer.fail(FailureKind::StoreConnectivity, e.to_string()),
            }
        }
    }

    fn fast_config(max_attempts: u32) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.retry.max_attempts = max_attempts;
        config.retry.backoff_base_ms = 1;
        config.retry.backoff_cap_ms = 2;
        config.delays.settle_ms = 5;
        config.delays.verify_poll_interval_ms = 1;
        config
    }

    fn item() -> TestItem {
        TestItem {
            index: 0,
            subject_id: "srv".into(),
            subject_name: "Server".into(),
            method_index: 0,
            method: RawInstallMethod {
                command: Some("npx -y srv".into()),
                ..Default::default()
            }
            .resolve()
            .unwrap(),
        }
    }

    #[test]
    fn passing_attempt_stops_retries() {
        let store = MemoryStore::new();
        let install = FlakyInstall::new(1);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(3);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let run = orch.run_item(&item(), &RunLog::in_memory());
        assert!(run.passed);
        assert!(!run.exhausted);
        assert_eq!(run.attempts(), 2);
        assert!(!run.outcomes[0].success);
        assert_eq!(run.outcomes[1].retry_count, 1);
        assert_eq!(cleanup.1.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attempts_never_exceed_max() {
        let store = MemoryStore::new();
        let install = FlakyInstall::new(u32::MAX);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(3);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let run = orch.run_item(&item(), &RunLog::in_memory());
        assert_eq!(run.attempts(), 3);
        assert!(run.exhausted);
        for outcome in &run.outcomes {
            assert!(!outcome.verify.ran);
            assert!(outcome.cleanup.ran);
            assert_eq!(
                outcome.root_causes(),
                vec!["install: install timeout after 10ms".to_string()]
            );
        }
    }

    #[test]
    fn verify_starts_after_settle_delay() {
        let store = MemoryStore::new();
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert!(outcome.success, "{:?}", outcome);
        let gap = outcome.verify.started_at - outcome.install.finished_at;
        assert!(gap >= chrono::Duration::milliseconds(5));
        assert!(outcome.cleanup.started_at >= outcome.verify.finished_at);
    }

    #[test]
    fn lagging_store_is_polled() {
        let store = MemoryStore::new().with_visibility_lag(2);
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert!(outcome.verify.success);
        assert!(outcome.verify.logs[0].contains("no record visible yet"));
        assert!(outcome.verify.logs[2].contains("'success'"));
    }

    #[test]
    fn invisible_record_is_inconsistency() {
        let store = MemoryStore::new().with_visibility_lag(10);
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert_eq!(outcome.verify.failure, Some(FailureKind::StoreInconsistency));
        assert_eq!(
            outcome.verify.error.as_deref(),
            Some("no attempt record visible after 3 polls")
        );
        assert!(outcome.cleanup.success);
        assert!(!outcome.success);
    }

    /// Serves the stale `pending` row for the first `stale_reads` queries.
    struct StaleReads {
        inner: MemoryStore,
        stale_reads: u32,
        reads: AtomicU32,
    }

    impl StaleReads {
        fn new(stale_reads: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                stale_reads,
                reads: AtomicU32::new(0),
            }
        }
    }

    impl AttemptStore for StaleReads {
        fn describe(&self) -> String {
            "stale".into()
        }

        fn ping(&self) -> crate::Result<()> {
            self.inner.ping()
        }

        fn insert_attempt(&self, attempt: &NewAttempt) -> crate::Result<String> {
            self.inner.insert_attempt(attempt)
        }

        fn update_attempt_status(
            &self,
            attempt_id: &str,
            status: AttemptStatus,
            error: Option<&str>,
        ) -> crate::Result<()> {
            self.inner.update_attempt_status(attempt_id, status, error)
        }

        fn query_latest_attempt(
            &self,
            subject_id: &str,
        ) -> crate::Result<Option<crate::store::AttemptRecord>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            let record = self.inner.query_latest_attempt(subject_id)?;
            if n < self.stale_reads {
                return Ok(record.map(|r| crate::store::AttemptRecord {
                    status: AttemptStatus::Pending.as_str().to_string(),
                    ..r
                }));
            }
            Ok(record)
        }

        fn delete_attempts(&self, subject_id: &str) -> crate::Result<usize> {
            self.inner.delete_attempts(subject_id)
        }

        fn read(&self, query: &crate::store::StoreQuery) -> crate::Result<Vec<serde_json::Value>> {
            self.inner.read(query)
        }
    }

    struct NoCleanup;

    impl CleanupPhase for NoCleanup {
        fn cleanup(&self, _item: &TestItem, _log: &RunLog) -> PhaseResult {
            PhaseTimer::start(Phase::Cleanup).succeed()
        }
    }

    #[test]
    fn stale_pending_read_is_polled_again() {
        let store = StaleReads::new(1);
        let install = FlakyInstall::new(0);
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &NoCleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert!(outcome.verify.success, "{:?}", outcome.verify);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
        assert!(outcome.verify.logs[0].contains("still 'pending'"));
    }

    #[test]
    fn pending_until_polls_run_out_is_inconsistency() {
        let store = StaleReads::new(u32::MAX);
        let install = FlakyInstall::new(0);
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &NoCleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert_eq!(outcome.verify.failure, Some(FailureKind::StoreInconsistency));
        assert_eq!(
            outcome.verify.error.as_deref(),
            Some("latest attempt still 'pending' after 3 polls")
        );
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn wrong_status_is_inconsistency() {
        let store = MemoryStore::new();
        store.force_status(Some("archived"));
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert_eq!(outcome.verify.failure, Some(FailureKind::StoreInconsistency));
        assert!(outcome.verify.error.unwrap().contains("'archived'"));
    }

    #[test]
    fn unrecordable_attempt_fails_install() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(1);
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, StopSignal::new());

        let outcome = orch.run_attempt(&item(), 1, &RunLog::in_memory());
        assert_eq!(outcome.install.failure, Some(FailureKind::StoreConnectivity));
        assert_eq!(install.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.cleanup.ran);
    }

    #[test]
    fn stop_before_item_runs_nothing() {
        let store = MemoryStore::new();
        let install = FlakyInstall::new(0);
        let cleanup = StoreCleanup(&store, AtomicU32::new(0));
        let config = fast_config(3);
        let stop = StopSignal::new();
        stop.stop();
        let orch = PhaseOrchestrator::new(&install, &cleanup, &store, &config, stop);

        let run = orch.run_item(&item(), &RunLog::in_memory());
        assert!(run.aborted);
        assert!(run.outcomes.is_empty());
        assert!(!run.exhausted);
    }
}
