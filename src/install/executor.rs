//! Install phase state machine.
//!
//! ```text
//! NotStarted -> ZeroInstallSkip
//! NotStarted -> Installing -> InstallFailed
//! NotStarted -> Installing -> Installed -> HealthChecking -> Healthy | HealthCheckFailed
//! ```
//!
//! A zero-install method never touches the process runner, the package
//! index or the health probe: its install phase is an immediate success.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::health::HealthProbe;
use super::package::{dry_run_confirms, dry_run_request, dry_run_says_missing, Lookup, PackageIndex};
use crate::catalog::{CommandSpec, Ecosystem, InstallMethod, MethodKind};
use crate::config::HarnessConfig;
use crate::detection::Prerequisites;
use crate::logging::RunLog;
use crate::runner::{process_failure, FailureKind, Phase, PhaseResult, PhaseTimer, TestItem};
use crate::shell::ProcessRunner;

const COMPONENT: &str = "install";

/// States an install attempt passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallState {
    NotStarted,
    ZeroInstallSkip,
    Installing,
    Installed,
    InstallFailed,
    HealthChecking,
    Healthy,
    HealthCheckFailed,
}

/// Phase result plus the states visited.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub result: PhaseResult,
    pub trail: Vec<InstallState>,
}

/// Anything that can run the install phase for an item.
pub trait InstallPhase: Send + Sync {
    fn install(&self, item: &TestItem, log: &RunLog) -> PhaseResult;
}

/// Resolves packages and probes the started server.
pub struct InstallationExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    index: &'a dyn PackageIndex,
    probe: &'a dyn HealthProbe,
    config: &'a HarnessConfig,
    prerequisites: &'a Prerequisites,
}

impl<'a> InstallationExecutor<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        index: &'a dyn PackageIndex,
        probe: &'a dyn HealthProbe,
        config: &'a HarnessConfig,
        prerequisites: &'a Prerequisites,
    ) -> Self {
        Self {
            runner,
            index,
            probe,
            config,
            prerequisites,
        }
    }

    /// Run the install phase and report every state visited.
    pub fn execute(&self, item: &TestItem, log: &RunLog) -> InstallReport {
        let mut trail = vec![InstallState::NotStarted];
        let mut timer = PhaseTimer::start(Phase::Install);

        if let InstallMethod::ZeroInstall { launch } = &item.method {
            trail.push(InstallState::ZeroInstallSkip);
            timer.log("zero-install: nothing to install");
            if let Some(launch) = launch {
                timer.log(format!("launch command not probed: {}", launch.display()));
            }
            log.info(COMPONENT, format!("{}: zero-install, skipped", item.describe()));
            return InstallReport {
                result: timer.succeed(),
                trail,
            };
        }

        trail.push(InstallState::Installing);
        let deadline = Instant::now() + self.config.timeouts.install();

        for step in item.method.install_steps() {
            if let Err((kind, error)) = self.resolve_step(step, deadline, &mut timer) {
                trail.push(InstallState::InstallFailed);
                log.warn(COMPONENT, format!("{}: {}", item.describe(), error));
                return InstallReport {
                    result: timer.fail(kind, error),
                    trail,
                };
            }
        }
        trail.push(InstallState::Installed);

        let Some(launch) = item.method.launch() else {
            trail.extend([InstallState::HealthChecking, InstallState::Healthy]);
            timer.log("no launch command; health check skipped");
            return InstallReport {
                result: timer.succeed(),
                trail,
            };
        };

        trail.push(InstallState::HealthChecking);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            trail.push(InstallState::HealthCheckFailed);
            let error = format!(
                "install timeout after {}ms before health check",
                self.config.timeouts.install_ms
            );
            log.warn(COMPONENT, format!("{}: {}", item.describe(), error));
            return InstallReport {
                result: timer.fail(FailureKind::Timeout, error),
                trail,
            };
        }

        let health_timeout = self.config.timeouts.health().min(remaining);
        timer.log(format!(
            "health check: {} ({}ms)",
            launch.display(),
            health_timeout.as_millis()
        ));
        let env = launch.env.resolve();
        let report = self.probe.probe(launch, &env, health_timeout);
        timer.extend_logs(report.logs.iter().map(|l| format!("[server] {}", l)));

        if report.healthy {
            trail.push(InstallState::Healthy);
            timer.log(format!("healthy: {}", report.detail));
            log.info(
                COMPONENT,
                format!("{}: healthy ({})", item.describe(), report.detail),
            );
            InstallReport {
                result: timer.succeed(),
                trail,
            }
        } else {
            trail.push(InstallState::HealthCheckFailed);
            log.warn(
                COMPONENT,
                format!("{}: health check failed: {}", item.describe(), report.detail),
            );
            InstallReport {
                result: timer.fail(
                    report.failure.unwrap_or(FailureKind::HealthCheck),
                    report.detail,
                ),
                trail,
            }
        }
    }

    /// Confirm one command's package can be installed.
    fn resolve_step(
        &self,
        step: &CommandSpec,
        deadline: Instant,
        timer: &mut PhaseTimer,
    ) -> Result<(), (FailureKind, String)> {
        let kind = step.kind();
        let Some(ecosystem) = kind.ecosystem() else {
            return Ok(());
        };
        let Some(name) = step.package_name() else {
            if kind == MethodKind::Python {
                timer.log(format!("no package to resolve for `{}`", step.display()));
                return Ok(());
            }
            return Err((
                FailureKind::NotResolvable,
                format!("cannot determine package name from `{}`", step.display()),
            ));
        };

        if Instant::now() >= deadline {
            return Err((
                FailureKind::Timeout,
                format!("install timeout after {}ms", self.config.timeouts.install_ms),
            ));
        }

        match self.index.lookup(ecosystem, &name) {
            Lookup::Found { name, version } => {
                timer.log(format!(
                    "resolved {}{} on {}",
                    name,
                    version.map(|v| format!("@{}", v)).unwrap_or_default(),
                    ecosystem
                ));
                Ok(())
            }
            Lookup::NotFound => Err((
                FailureKind::NotResolvable,
                format!("package '{}' not found on {}", name, ecosystem),
            )),
            Lookup::Unavailable(reason) => {
                timer.log(format!("{}; falling back to dry run", reason));
                self.dry_run(ecosystem, &name, deadline, timer)
            }
        }
    }

    fn dry_run(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        deadline: Instant,
        timer: &mut PhaseTimer,
    ) -> Result<(), (FailureKind, String)> {
        let pip = self
            .prerequisites
            .program_for(MethodKind::Pip)
            .unwrap_or("pip");
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = self.config.timeouts.dry_run().min(remaining).max(Duration::from_millis(1));
        let request = dry_run_request(ecosystem, name, pip, timeout);
        timer.log(format!("dry run: {}", request.display()));

        let output = self.runner.run(&request);
        timer.extend_logs(output.lines.iter().map(|l| l.text().to_string()));

        if dry_run_confirms(ecosystem, name, &output) {
            timer.log(format!("dry run confirmed {}", name));
            return Ok(());
        }
        if dry_run_says_missing(&output) {
            return Err((
                FailureKind::NotResolvable,
                format!("package '{}' not found on {}", name, ecosystem),
            ));
        }
        Err(process_failure(&output, &request, "dry run").unwrap_or_else(|| {
            (
                FailureKind::NotResolvable,
                format!("dry run did not confirm package '{}'", name),
            )
        }))
    }
}

impl InstallPhase for InstallationExecutor<'_> {
    fn install(&self, item: &TestItem, log: &RunLog) -> PhaseResult {
        self.execute(item, log).result
    }
}
