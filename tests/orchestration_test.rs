//! End-to-end sessions with scripted processes, a fake registry, a fake
//! health probe and the in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mcpcheck::catalog::{CommandSpec, Ecosystem, RawInstallMethod, Subject};
use mcpcheck::cleanup::{CleanupExecutor, CleanupPhase};
use mcpcheck::config::HarnessConfig;
use mcpcheck::detection::Prerequisites;
use mcpcheck::install::{HealthProbe, HealthReport, Lookup, PackageIndex};
use mcpcheck::logging::RunLog;
use mcpcheck::report::Verdict;
use mcpcheck::runner::{build_queue, FailureKind, Harness, RunOptions};
use mcpcheck::session::{SessionId, TestSession};
use mcpcheck::shell::{ScriptedRunner, StopSignal};
use mcpcheck::store::{AttemptStore, MemoryStore, NewAttempt};

/// Every package exists unless its name starts with `missing-`.
struct FakeRegistry;

impl PackageIndex for FakeRegistry {
    fn lookup(&self, _ecosystem: Ecosystem, name: &str) -> Lookup {
        if name.starts_with("missing-") {
            Lookup::NotFound
        } else {
            Lookup::Found {
                name: name.to_string(),
                version: Some("1.0.0".into()),
            }
        }
    }
}

#[derive(Default)]
struct CountingProbe {
    calls: AtomicUsize,
}

impl HealthProbe for CountingProbe {
    fn probe(&self, _: &CommandSpec, _: &HashMap<String, String>, _: Duration) -> HealthReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        HealthReport::healthy("ready marker 'ready'", vec!["server ready".into()])
    }
}

fn fast_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.delays.settle_ms = 0;
    config.delays.inter_item_ms = 0;
    config.delays.verify_poll_interval_ms = 0;
    config.retry.backoff_base_ms = 0;
    config.retry.backoff_cap_ms = 0;
    config
}

fn npx_subject(id: &str, package: &str) -> Subject {
    Subject::new(id).with_method(RawInstallMethod {
        command: Some(format!("npx -y {}", package)),
        ..Default::default()
    })
}

fn toolchain() -> ScriptedRunner {
    ScriptedRunner::new()
        .on("npx", ScriptedRunner::ok(&["10.8.1"]))
        .on("npm", ScriptedRunner::ok(&["removed 1 package"]))
}

fn run_session(
    config: &HarnessConfig,
    runner: &ScriptedRunner,
    store: &MemoryStore,
    subjects: &[Subject],
) -> TestSession {
    let probe = CountingProbe::default();
    Harness::new(config, runner, &FakeRegistry, &probe, store, StopSignal::new())
        .run(
            SessionId::new(),
            subjects,
            &RunOptions::default(),
            &RunLog::in_memory(),
        )
        .unwrap()
}

fn subjects(passing: usize, failing: usize) -> Vec<Subject> {
    let mut list: Vec<Subject> = (0..passing)
        .map(|i| npx_subject(&format!("ok-{}", i), &format!("server-{}", i)))
        .collect();
    list.extend((0..failing).map(|i| npx_subject(&format!("bad-{}", i), &format!("missing-{}", i))));
    list
}

#[test]
fn second_cleanup_after_success_still_succeeds() {
    let config = fast_config();
    let store = MemoryStore::new();
    let runner = ScriptedRunner::new().on(
        "npm",
        ScriptedRunner::fail(1, &["npm warn uninstall: not installed"]),
    );
    let prerequisites = Prerequisites::all_available();
    let plan = build_queue(&[npx_subject("fs", "server-fs")], &config, &prerequisites, &[]);
    let item = &plan.items[0];

    store
        .insert_attempt(&NewAttempt {
            subject_id: "fs".into(),
            method: "npx".into(),
            platform: mcpcheck::shell::PlatformInfo::current(),
            session_id: "s".into(),
        })
        .unwrap();

    let cleaner = CleanupExecutor::new(&runner, &store, &config, &prerequisites);
    let log = RunLog::in_memory();
    let first = cleaner.cleanup(item, &log);
    let second = cleaner.cleanup(item, &log);

    assert!(first.success, "{:?}", first.error);
    assert!(second.success, "{:?}", second.error);
    assert!(store.is_empty());
}

#[test]
fn attempts_never_exceed_the_bound_and_all_are_kept() {
    let mut config = fast_config();
    config.retry.max_attempts = 3;
    let runner = toolchain();
    let store = MemoryStore::new();

    let session = run_session(&config, &runner, &store, &subjects(1, 1));

    for run in &session.runs {
        assert!(run.outcomes.len() <= 3);
    }
    let failed = session.runs.iter().find(|r| !r.passed).unwrap();
    assert_eq!(failed.outcomes.len(), 3);
    assert!(failed.exhausted);
    let attempts: Vec<u32> = failed.outcomes.iter().map(|o| o.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(session.summary.total_attempts, 4);
    assert_eq!(session.outcomes().count(), 4);
}

#[test]
fn verify_waits_for_settle_and_cleanup_always_runs() {
    let mut config = fast_config();
    config.delays.settle_ms = 40;
    config.retry.max_attempts = 1;
    let runner = toolchain();
    let store = MemoryStore::new();
    store.force_status(Some("corrupted"));

    let session = run_session(&config, &runner, &store, &subjects(1, 0));
    let outcome = session.outcomes().next().unwrap();

    assert!(outcome.install.success);
    let gap = outcome.verify.started_at - outcome.install.finished_at;
    assert!(gap.num_milliseconds() >= 40, "gap was {}ms", gap.num_milliseconds());

    assert!(!outcome.verify.success);
    assert_eq!(outcome.verify.failure, Some(FailureKind::StoreInconsistency));
    assert!(outcome.cleanup.ran);
    assert!(outcome.cleanup.started_at >= outcome.verify.finished_at);
}

#[test]
fn outcome_success_is_conjunction_of_phases() {
    let mut config = fast_config();
    config.retry.max_attempts = 2;
    let runner = toolchain();
    let store = MemoryStore::new();

    let session = run_session(&config, &runner, &store, &subjects(3, 2));

    assert!(session.outcomes().count() >= 5);
    for outcome in session.outcomes() {
        assert_eq!(
            outcome.success,
            outcome.install.success && outcome.verify.success && outcome.cleanup.success
        );
    }
}

#[test]
fn nine_of_ten_is_ready() {
    let mut config = fast_config();
    config.retry.max_attempts = 1;
    let session = run_session(&config, &toolchain(), &MemoryStore::new(), &subjects(9, 1));

    assert_eq!(session.summary.total_items, 10);
    assert!((session.summary.success_rate - 0.9).abs() < 1e-9);
    assert_eq!(session.verdict(), Verdict::Ready);
    assert_eq!(session.verdict().exit_code(), 0);
}

#[test]
fn six_of_ten_is_not_ready() {
    let mut config = fast_config();
    config.retry.max_attempts = 1;
    let session = run_session(&config, &toolchain(), &MemoryStore::new(), &subjects(6, 4));

    assert!((session.summary.success_rate - 0.6).abs() < 1e-9);
    assert_eq!(session.verdict(), Verdict::NotReady);
    assert_eq!(session.verdict().exit_code(), 2);
}

#[test]
fn zero_install_never_touches_processes() {
    let config = fast_config();
    let runner = ScriptedRunner::new();
    let store = MemoryStore::new();
    let probe = CountingProbe::default();
    let subject = Subject::new("hosted").with_method(RawInstallMethod {
        zero_install: true,
        ..Default::default()
    });

    let session = Harness::new(&config, &runner, &FakeRegistry, &probe, &store, StopSignal::new())
        .run(
            SessionId::new(),
            &[subject],
            &RunOptions::default(),
            &RunLog::in_memory(),
        )
        .unwrap();

    let outcome = session.outcomes().next().unwrap();
    assert!(outcome.install.success);
    assert!(outcome.install.duration_ms < 50);
    assert_eq!(runner.call_count(), 0);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[test]
fn slow_command_is_a_timeout_not_an_exit() {
    use mcpcheck::runner::process_failure;
    use mcpcheck::shell::{CommandRequest, ProcessRunner, SystemRunner};

    let runner = SystemRunner::new(StopSignal::new());
    let request = CommandRequest::new("sleep", Duration::from_millis(200)).with_args(["5"]);
    let output = runner.run(&request);

    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
    let (kind, message) = process_failure(&output, &request, "install").unwrap();
    assert_eq!(kind, FailureKind::Timeout);
    assert!(message.contains("timeout"));
    assert!(!message.contains("exited with code"));
}

#[test]
fn items_run_strictly_one_after_another() {
    let mut config = fast_config();
    config.delays.inter_item_ms = 25;
    config.retry.max_attempts = 1;
    let session = run_session(&config, &toolchain(), &MemoryStore::new(), &subjects(3, 0));

    assert_eq!(session.runs.len(), 3);
    for pair in session.runs.windows(2) {
        let previous = pair[0].outcomes.last().unwrap();
        let next = pair[1].outcomes.first().unwrap();
        let gap = next.install.started_at - previous.cleanup.finished_at;
        assert!(gap.num_milliseconds() >= 25, "gap was {}ms", gap.num_milliseconds());
    }
}
