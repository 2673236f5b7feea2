//! Queue building and sequential execution.
//!
//! The queue is the cross-product of subjects and their compatible
//! methods. Items run one at a time, each through its full retry
//! sequence, with a fixed pause between items.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::orchestrator::{ItemRun, PhaseOrchestrator};
use super::outcome::{TestItem, TestOutcome};
use crate::catalog::{InstallMethod, MethodKind, Subject};
use crate::config::HarnessConfig;
use crate::detection::Prerequisites;
use crate::logging::RunLog;
use crate::shell::StopSignal;

const COMPONENT: &str = "scheduler";

/// Why a method was left out of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// A command is not on the allow-list.
    NotAllowed { command: String },
    /// A required tool was not detected.
    MissingPrerequisite { tool: MethodKind },
    /// The catalog record could not be resolved.
    InvalidMethod { message: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllowed { command } => write!(f, "'{}' is not an allowed method", command),
            Self::MissingPrerequisite { tool } => write!(f, "{} not available", tool),
            Self::InvalidMethod { message } => write!(f, "invalid method: {}", message),
        }
    }
}

/// A (subject, method) pair that will not be tested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub subject_id: String,
    pub subject_name: String,
    pub method_index: usize,
    pub reason: ExclusionReason,
}

/// A subject that produced no items at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSubject {
    pub subject_id: String,
    pub reason: String,
}

/// Queue plus everything that was left out and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuePlan {
    pub items: Vec<TestItem>,
    pub exclusions: Vec<Exclusion>,
    pub skipped: Vec<SkippedSubject>,
}

impl QueuePlan {
    /// Exclusions caused by a missing tool.
    pub fn missing_prerequisites(&self) -> impl Iterator<Item = &Exclusion> {
        self.exclusions
            .iter()
            .filter(|e| matches!(e.reason, ExclusionReason::MissingPrerequisite { .. }))
    }
}

/// Whether every command of a method is allow-listed.
///
/// Package-manager commands match by kind name; custom commands match by
/// bare program name.
pub fn allowed_method(method: &InstallMethod, allowed: &[String]) -> Result<(), String> {
    let permits = |name: &str| allowed.iter().any(|a| a.eq_ignore_ascii_case(name));
    if method.is_zero_install() {
        return if permits(MethodKind::ZeroInstall.as_str()) {
            Ok(())
        } else {
            Err(MethodKind::ZeroInstall.to_string())
        };
    }
    for command in method.commands() {
        let name = match command.kind() {
            MethodKind::Custom => command.program_name().to_string(),
            kind => kind.to_string(),
        };
        if !permits(&name) {
            return Err(name);
        }
    }
    Ok(())
}

/// Build the ordered queue.
///
/// `only` limits the run to those subject ids; empty means all.
pub fn build_queue(
    subjects: &[Subject],
    config: &HarnessConfig,
    prerequisites: &Prerequisites,
    only: &[String],
) -> QueuePlan {
    let mut plan = QueuePlan::default();

    for subject in subjects {
        if !only.is_empty() && !only.iter().any(|id| id == &subject.id) {
            plan.skipped.push(SkippedSubject {
                subject_id: subject.id.clone(),
                reason: "filtered out".to_string(),
            });
            continue;
        }
        if !subject.is_testable() {
            plan.skipped.push(SkippedSubject {
                subject_id: subject.id.clone(),
                reason: "no install methods or config options".to_string(),
            });
            continue;
        }

        let methods: Vec<Result<InstallMethod, String>> = if subject.install_methods.is_empty() {
            vec![Ok(InstallMethod::ZeroInstall { launch: None })]
        } else {
            subject.install_methods.iter().map(|m| m.resolve()).collect()
        };

        let before = plan.items.len();
        for (method_index, resolved) in methods.into_iter().enumerate() {
            let exclude = |reason| Exclusion {
                subject_id: subject.id.clone(),
                subject_name: subject.display_name().to_string(),
                method_index,
                reason,
            };
            let method = match resolved {
                Ok(method) => method,
                Err(message) => {
                    plan.exclusions
                        .push(exclude(ExclusionReason::InvalidMethod { message }));
                    continue;
                }
            };
            if let Err(command) = allowed_method(&method, &config.methods.allowed) {
                plan.exclusions
                    .push(exclude(ExclusionReason::NotAllowed { command }));
                continue;
            }
            if let Some(tool) = method
                .required_tools()
                .into_iter()
                .find(|t| !prerequisites.is_available(*t))
            {
                plan.exclusions
                    .push(exclude(ExclusionReason::MissingPrerequisite { tool }));
                continue;
            }
            plan.items.push(TestItem {
                index: plan.items.len(),
                subject_id: subject.id.clone(),
                subject_name: subject.display_name().to_string(),
                method_index,
                method,
            });
        }

        if plan.items.len() == before {
            plan.skipped.push(SkippedSubject {
                subject_id: subject.id.clone(),
                reason: "no compatible install method".to_string(),
            });
        }
    }

    plan
}

/// Progress events emitted while the queue runs.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// An item is about to start. `index` counts from 1.
    ItemStarting {
        index: usize,
        total: usize,
        subject_name: &'a str,
        method: String,
    },
    /// An item finished all its attempts.
    ItemFinished { index: usize, run: &'a ItemRun },
}

/// Result of running a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub runs: Vec<ItemRun>,
    /// Stopped before the queue was finished.
    pub aborted: bool,
}

impl ScheduleResult {
    /// Every attempt, in queue order.
    pub fn outcomes(&self) -> Vec<TestOutcome> {
        self.runs
            .iter()
            .flat_map(|r| r.outcomes.iter().cloned())
            .collect()
    }
}

/// Runs items strictly one after another.
pub struct SequentialScheduler<'a> {
    orchestrator: &'a PhaseOrchestrator<'a>,
    config: &'a HarnessConfig,
    stop: StopSignal,
}

impl<'a> SequentialScheduler<'a> {
    pub fn new(
        orchestrator: &'a PhaseOrchestrator<'a>,
        config: &'a HarnessConfig,
        stop: StopSignal,
    ) -> Self {
        Self {
            orchestrator,
            config,
            stop,
        }
    }

    /// Run the queue without progress reporting.
    pub fn run(&self, items: &[TestItem], log: &RunLog) -> ScheduleResult {
        self.run_with_progress(items, log, |_| {})
    }

    /// Run the queue, reporting progress as items start and finish.
    pub fn run_with_progress(
        &self,
        items: &[TestItem],
        log: &RunLog,
        mut on_progress: impl FnMut(ProgressEvent<'_>),
    ) -> ScheduleResult {
        let total = items.len();
        let mut result = ScheduleResult::default();

        for (position, item) in items.iter().enumerate() {
            if self.stop.is_stopped() {
                log.warn(
                    COMPONENT,
                    format!("stop requested; {} item(s) not run", total - position),
                );
                result.aborted = true;
                break;
            }

            on_progress(ProgressEvent::ItemStarting {
                index: position + 1,
                total,
                subject_name: &item.subject_name,
                method: item.method_label(),
            });
            let run = self.orchestrator.run_item(item, log);
            on_progress(ProgressEvent::ItemFinished {
                index: position + 1,
                run: &run,
            });
            let aborted = run.aborted;
            result.runs.push(run);
            if aborted {
                result.aborted = true;
                break;
            }

            if position + 1 < total && !self.stop.wait(self.config.delays.inter_item()) {
                result.aborted = true;
                break;
            }
        }

        result
    }
}
