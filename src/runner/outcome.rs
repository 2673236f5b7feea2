//! Test items, phase results and attempt outcomes.
//!
//! Phase failures are data: every executor returns a [`PhaseResult`], and
//! nothing inside an attempt surfaces as an `Err`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::catalog::{InstallMethod, MethodKind};
use crate::shell::{CommandRequest, ProcessOutput, ProcessStatus};

/// One of the three phases of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Install,
    Verify,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Verify => "verify",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Why a phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Binary missing or not executable.
    Spawn,
    /// Deadline passed.
    Timeout,
    /// Process ran and failed.
    NonZeroExit,
    /// Package lookup found no exact match.
    NotResolvable,
    /// Server started but never became ready.
    HealthCheck,
    /// Store answered, but without the expected record.
    StoreInconsistency,
    /// Store did not answer.
    StoreConnectivity,
    /// Operator stopped the session.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawn => "spawn error",
            Self::Timeout => "timeout",
            Self::NonZeroExit => "non-zero exit",
            Self::NotResolvable => "not resolvable",
            Self::HealthCheck => "health check",
            Self::StoreInconsistency => "store inconsistency",
            Self::StoreConnectivity => "store connectivity",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Classify a finished process run as a failure, if it was one.
///
/// `what` names the operation in the error string, e.g. `npm view`.
pub fn process_failure(
    output: &ProcessOutput,
    request: &CommandRequest,
    what: &str,
) -> Option<(FailureKind, String)> {
    match output.status() {
        ProcessStatus::Success => None,
        ProcessStatus::SpawnFailed(err) => Some((FailureKind::Spawn, err)),
        ProcessStatus::TimedOut => Some((
            FailureKind::Timeout,
            format!("{} timeout after {}ms", what, request.timeout.as_millis()),
        )),
        ProcessStatus::Aborted => Some((FailureKind::Aborted, format!("{} aborted", what))),
        ProcessStatus::NonZeroExit(code) => Some((
            FailureKind::NonZeroExit,
            format!("{} exited with code {}", what, code),
        )),
        ProcessStatus::Signalled => Some((
            FailureKind::NonZeroExit,
            format!("{} terminated by signal", what),
        )),
    }
}

/// Result of one phase. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub success: bool,
    /// False when the phase was skipped because an earlier one failed.
    pub ran: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Root-cause string for a failed phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl PhaseResult {
    /// A phase that did not run.
    pub fn not_run(phase: Phase, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            phase,
            success: false,
            ran: false,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            failure: None,
            error: Some(reason.to_string()),
            logs: Vec::new(),
        }
    }

    /// Error prefixed with the phase, for reports.
    pub fn root_cause(&self) -> Option<String> {
        if self.success || !self.ran {
            return None;
        }
        self.error
            .as_ref()
            .map(|e| format!("{}: {}", self.phase, e))
    }
}

/// Measures one phase and produces its result.
#[derive(Debug)]
pub struct PhaseTimer {
    phase: Phase,
    started_at: DateTime<Utc>,
    clock: Instant,
    logs: Vec<String>,
}

impl PhaseTimer {
    pub fn start(phase: Phase) -> Self {
        Self {
            phase,
            started_at: Utc::now(),
            clock: Instant::now(),
            logs: Vec::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn extend_logs<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.logs.extend(lines);
    }

    pub fn succeed(self) -> PhaseResult {
        self.finish(true, None, None)
    }

    pub fn fail(self, failure: FailureKind, error: impl Into<String>) -> PhaseResult {
        self.finish(false, Some(failure), Some(error.into()))
    }

    fn finish(
        self,
        success: bool,
        failure: Option<FailureKind>,
        error: Option<String>,
    ) -> PhaseResult {
        let elapsed = self.clock.elapsed();
        let finished_at = self.started_at
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        PhaseResult {
            phase: self.phase,
            success,
            ran: true,
            started_at: self.started_at,
            finished_at,
            duration_ms: elapsed.as_millis() as u64,
            failure,
            error,
            logs: self.logs,
        }
    }
}

/// A (subject, method) pair queued for testing. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestItem {
    /// Position in the queue, from 0.
    pub index: usize,
    pub subject_id: String,
    pub subject_name: String,
    /// Position of the method within the subject's catalog entry.
    pub method_index: usize,
    pub method: InstallMethod,
}

impl TestItem {
    pub fn method_kind(&self) -> MethodKind {
        self.method.kind()
    }

    pub fn method_label(&self) -> String {
        self.method.label()
    }

    /// `subject (method)` for logs.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.subject_name, self.method_label())
    }
}

/// One full attempt (install, verify, cleanup) for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub item: TestItem,
    /// 1 for the first attempt.
    pub attempt: u32,
    /// Attempts before this one.
    pub retry_count: u32,
    pub install: PhaseResult,
    pub verify: PhaseResult,
    pub cleanup: PhaseResult,
    /// `install && verify && cleanup`, fixed at construction.
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u64,
}

impl TestOutcome {
    pub fn new(
        item: TestItem,
        attempt: u32,
        install: PhaseResult,
        verify: PhaseResult,
        cleanup: PhaseResult,
        started_at: DateTime<Utc>,
        total_duration_ms: u64,
    ) -> Self {
        let success = install.success && verify.success && cleanup.success;
        Self {
            item,
            attempt,
            retry_count: attempt.saturating_sub(1),
            install,
            verify,
            cleanup,
            success,
            started_at,
            total_duration_ms,
        }
    }

    pub fn phases(&self) -> [&PhaseResult; 3] {
        [&self.install, &self.verify, &self.cleanup]
    }

    /// Root causes of every failed phase that ran.
    pub fn root_causes(&self) -> Vec<String> {
        self.phases()
            .iter()
            .filter_map(|p| p.root_cause())
            .collect()
    }

    /// Whether any phase was cut short by an operator stop.
    pub fn was_aborted(&self) -> bool {
        self.phases()
            .iter()
            .any(|p| p.failure == Some(FailureKind::Aborted))
    }
}
