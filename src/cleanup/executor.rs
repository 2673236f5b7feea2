//! Cleanup phase: remove artifacts and delete attempt records.
//!
//! Both side effects are always attempted and fail independently. The
//! phase succeeds when at least one concrete effect was achieved: the
//! store deletion went through, or the artifact was removed or already
//! absent. Running cleanup twice is therefore safe.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::catalog::{CommandSpec, MethodKind};
use crate::config::HarnessConfig;
use crate::detection::Prerequisites;
use crate::logging::RunLog;
use crate::runner::{process_failure, FailureKind, Phase, PhaseResult, PhaseTimer, TestItem};
use crate::shell::{CommandRequest, ProcessOutput, ProcessRunner};
use crate::store::AttemptStore;

const COMPONENT: &str = "cleanup";

/// Phrases package managers print when there is nothing to remove.
const ABSENT_MARKERS: &[&str] = &[
    "not installed",
    "skipping",
    "no packages found",
    "not found",
    "nothing to clean",
    "up to date",
];

/// What happened to the installed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Removed,
    /// The tool said it was not there.
    Absent,
    /// The method leaves no artifact this harness knows how to remove.
    NotApplicable,
    Failed(String),
}

impl ArtifactOutcome {
    /// Whether removal counts as an achieved effect.
    pub fn is_effective(&self) -> bool {
        matches!(self, Self::Removed | Self::Absent)
    }
}

/// Anything that can run the cleanup phase for an item.
pub trait CleanupPhase: Send + Sync {
    fn cleanup(&self, item: &TestItem, log: &RunLog) -> PhaseResult;
}

/// Removes artifacts with the installing tool's family and deletes records.
pub struct CleanupExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    store: &'a dyn AttemptStore,
    config: &'a HarnessConfig,
    prerequisites: &'a Prerequisites,
}

impl<'a> CleanupExecutor<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        store: &'a dyn AttemptStore,
        config: &'a HarnessConfig,
        prerequisites: &'a Prerequisites,
    ) -> Self {
        Self {
            runner,
            store,
            config,
            prerequisites,
        }
    }

    fn remove_artifacts(&self, item: &TestItem, timer: &mut PhaseTimer) -> ArtifactOutcome {
        let requests: Vec<CommandRequest> = item
            .method
            .install_steps()
            .into_iter()
            .filter_map(|step| {
                removal_request(step, self.prerequisites, self.config.timeouts.cleanup())
            })
            .collect();
        if requests.is_empty() {
            timer.log("no artifact to remove");
            return ArtifactOutcome::NotApplicable;
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in &requests {
            timer.log(format!("removing: {}", request.display()));
            let output = self.runner.run(request);
            timer.extend_logs(output.lines.iter().map(|l| l.text().to_string()));
            let outcome = classify_removal(&output, request);
            timer.log(format!("{}: {:?}", request.program, outcome));
            outcomes.push(outcome);
        }

        if let Some(failed) = outcomes
            .iter()
            .find(|o| matches!(o, ArtifactOutcome::Failed(_)))
        {
            return failed.clone();
        }
        if outcomes.contains(&ArtifactOutcome::Removed) {
            ArtifactOutcome::Removed
        } else {
            ArtifactOutcome::Absent
        }
    }
}

impl CleanupPhase for CleanupExecutor<'_> {
    fn cleanup(&self, item: &TestItem, log: &RunLog) -> PhaseResult {
        let mut timer = PhaseTimer::start(Phase::Cleanup);

        let artifact = self.remove_artifacts(item, &mut timer);
        let store = self.store.delete_attempts(&item.subject_id);
        match &store {
            Ok(count) => timer.log(format!("deleted {} attempt record(s)", count)),
            Err(e) => timer.log(format!("record deletion failed: {}", e)),
        }

        let success = store.is_ok() || artifact.is_effective();
        if success {
            log.info(
                COMPONENT,
                format!("{}: cleaned up ({:?})", item.describe(), artifact),
            );
            return timer.succeed();
        }

        let mut reasons = Vec::new();
        if let ArtifactOutcome::Failed(reason) = &artifact {
            reasons.push(format!("artifact removal failed: {}", reason));
        }
        let mut kind = FailureKind::NonZeroExit;
        if let Err(e) = &store {
            reasons.push(format!("record deletion failed: {}", e));
            kind = FailureKind::StoreConnectivity;
        }
        let error = reasons.join("; ");
        log.warn(COMPONENT, format!("{}: {}", item.describe(), error));
        timer.fail(kind, error)
    }
}

/// Uninstall command for one install step, if the tool family has one.
pub fn removal_request(
    step: &CommandSpec,
    prerequisites: &Prerequisites,
    timeout: Duration,
) -> Option<CommandRequest> {
    let package = step.package_name()?;
    match step.kind() {
        MethodKind::Npx => Some(
            CommandRequest::new("npm", timeout).with_args(["uninstall", "-g", package.as_str()]),
        ),
        MethodKind::Pip | MethodKind::Python => {
            let pip = prerequisites.program_for(MethodKind::Pip).unwrap_or("pip");
            Some(CommandRequest::new(pip, timeout).with_args(["uninstall", "-y", package.as_str()]))
        }
        MethodKind::Uvx => {
            Some(CommandRequest::new("uv", timeout).with_args(["cache", "clean", package.as_str()]))
        }
        MethodKind::ZeroInstall | MethodKind::Custom => None,
    }
}

/// Classify a removal run; "not installed" counts as absent, not failure.
pub fn classify_removal(output: &ProcessOutput, request: &CommandRequest) -> ArtifactOutcome {
    let text = output.combined().to_lowercase();
    let absent = ABSENT_MARKERS.iter().any(|m| text.contains(m));
    match process_failure(output, request, &request.program) {
        None if absent => ArtifactOutcome::Absent,
        None => ArtifactOutcome::Removed,
        Some((FailureKind::NonZeroExit, _)) if absent => ArtifactOutcome::Absent,
        Some((_, reason)) => ArtifactOutcome::Failed(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RawInstallMethod;
    use crate::shell::{PlatformInfo, ScriptedRunner};
    use crate::store::{MemoryStore, NewAttempt};

    fn item(command: &str, zero_install: bool) -> TestItem {
        TestItem {
            index: 0,
            subject_id: "srv".into(),
            subject_name: "Server".into(),
            method_index: 0,
            method: RawInstallMethod {
                command: Some(command.into()),
                zero_install,
                ..Default::default()
            }
            .resolve()
            .unwrap(),
        }
    }

    fn seed(store: &MemoryStore) {
        store
            .insert_attempt(&NewAttempt {
                subject_id: "srv".into(),
                method: "npx".into(),
                platform: PlatformInfo::current(),
                session_id: "s".into(),
            })
            .unwrap();
    }

    #[test]
    fn npx_removal_uses_npm() {
        let step = CommandSpec::new("npx", &["-y", "@scope/server@1.2.0"]);
        let req = removal_request(&step, &Prerequisites::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(req.display(), "npm uninstall -g @scope/server");
    }

    #[test]
    fn pip_removal_uses_detected_pip() {
        let step = CommandSpec::new("pip", &["install", "mcp-server-git"]);
        let req = removal_request(&step, &Prerequisites::all_available(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(req.display(), "pip3 uninstall -y mcp-server-git");
    }

    #[test]
    fn not_installed_is_absent() {
        let req = CommandRequest::new("pip3", Duration::from_secs(1));
        let out = ScriptedRunner::ok(&["WARNING: Skipping mcp-x as it is not installed."]);
        assert_eq!(classify_removal(&out, &req), ArtifactOutcome::Absent);
        let out = ScriptedRunner::fail(1, &["npm ERR! not installed"]);
        assert_eq!(classify_removal(&out, &req), ArtifactOutcome::Absent);
        let out = ScriptedRunner::fail(1, &["permission denied"]);
        assert!(matches!(classify_removal(&out, &req), ArtifactOutcome::Failed(_)));
    }

    #[test]
    fn removes_artifact_and_records() {
        let runner = ScriptedRunner::new().on("npm", ScriptedRunner::ok(&["removed 1 package"]));
        let store = MemoryStore::new();
        seed(&store);
        let config = HarnessConfig::default();
        let prereqs = Prerequisites::all_available();
        let exec = CleanupExecutor::new(&runner, &store, &config, &prereqs);

        let result = exec.cleanup(&item("npx -y mcp-x", false), &RunLog::in_memory());
        assert!(result.success);
        assert!(store.is_empty());
        assert_eq!(runner.calls_to("npm").len(), 1);
    }

    #[test]
    fn second_cleanup_still_succeeds() {
        let runner = ScriptedRunner::new()
            .on("npm", ScriptedRunner::fail(1, &["npm ERR! not installed"]));
        let store = MemoryStore::new();
        seed(&store);
        let config = HarnessConfig::default();
        let prereqs = Prerequisites::all_available();
        let exec = CleanupExecutor::new(&runner, &store, &config, &prereqs);
        let log = RunLog::in_memory();

        let target = item("npx -y mcp-x", false);
        assert!(exec.cleanup(&target, &log).success);
        assert!(exec.cleanup(&target, &log).success);
    }

    #[test]
    fn store_failure_alone_is_tolerated() {
        let runner = ScriptedRunner::new().on("npm", ScriptedRunner::ok(&[]));
        let store = MemoryStore::new();
        store.set_offline(true);
        let config = HarnessConfig::default();
        let prereqs = Prerequisites::all_available();
        let exec = CleanupExecutor::new(&runner, &store, &config, &prereqs);

        let result = exec.cleanup(&item("npx -y mcp-x", false), &RunLog::in_memory());
        assert!(result.success);
        assert!(result.logs.iter().any(|l| l.contains("record deletion failed")));
    }

    #[test]
    fn both_failing_is_failure_with_both_reasons() {
        let runner = ScriptedRunner::new().on("npm", ScriptedRunner::fail(243, &["EACCES"]));
        let store = MemoryStore::new();
        store.set_offline(true);
        let config = HarnessConfig::default();
        let prereqs = Prerequisites::all_available();
        let exec = CleanupExecutor::new(&runner, &store, &config, &prereqs);

        let result = exec.cleanup(&item("npx -y mcp-x", false), &RunLog::in_memory());
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("artifact removal failed: npm exited with code 243"));
        assert!(error.contains("record deletion failed"));
        assert_eq!(result.failure, Some(FailureKind::StoreConnectivity));
    }

    #[test]
    fn zero_install_depends_on_store_only() {
        let runner = ScriptedRunner::new();
        let store = MemoryStore::new();
        let config = HarnessConfig::default();
        let prereqs = Prerequisites::default();
        let exec = CleanupExecutor::new(&runner, &store, &config, &prereqs);
        let target = item("npx -y hosted", true);

        assert!(exec.cleanup(&target, &RunLog::in_memory()).success);
        assert_eq!(runner.call_count(), 0);

        store.set_offline(true);
        assert!(!exec.cleanup(&target, &RunLog::in_memory()).success);
    }
}
