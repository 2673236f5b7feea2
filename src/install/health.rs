//! Post-install health probe.
//!
//! The server is started as a long-lived process. After a short warm-up
//! one newline-delimited JSON-RPC `initialize` message is written to its
//! stdin, and output is scanned for a readiness marker: a configured
//! keyword, or a stdout line that is a JSON object with a `method` or
//! `result` field. A clean exit (status 0) before the deadline also
//! counts as healthy. The process is always terminated afterwards.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::process::{ChildStdin, Stdio};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::catalog::CommandSpec;
use crate::config::{HealthSettings, Timeouts};
use crate::runner::FailureKind;
use crate::shell::runner::{
    build_command, describe_spawn_error, drain_output, spawn_output_readers, terminate_child,
};
use crate::shell::{CommandRequest, OutputLine, StopSignal};

const POLL: Duration = Duration::from_millis(25);
const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// What the probe observed.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub failure: Option<FailureKind>,
    /// Readiness evidence or the failure reason.
    pub detail: String,
    /// Raw output lines for diagnosis.
    pub logs: Vec<String>,
}

impl HealthReport {
    pub fn healthy(detail: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            healthy: true,
            failure: None,
            detail: detail.into(),
            logs,
        }
    }

    pub fn unhealthy(failure: FailureKind, detail: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            healthy: false,
            failure: Some(failure),
            detail: detail.into(),
            logs,
        }
    }
}

/// Starts a server and decides whether it came up.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, command: &CommandSpec, env: &HashMap<String, String>, timeout: Duration)
        -> HealthReport;
}

/// Probes real processes over stdio.
#[derive(Debug, Clone)]
pub struct StdioHealthProbe {
    stop: StopSignal,
    warmup: Duration,
    patterns: Vec<String>,
    protocol_version: String,
}

impl StdioHealthProbe {
    pub fn new(stop: StopSignal, timeouts: &Timeouts, health: &HealthSettings) -> Self {
        Self {
            stop,
            warmup: timeouts.health_warmup(),
            patterns: health
                .ready_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            protocol_version: health.protocol_version.clone(),
        }
    }

    fn initialize_message(&self) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": self.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": "mcpcheck",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            },
        })
        .to_string()
    }
}

impl HealthProbe for StdioHealthProbe {
    fn probe(
        &self,
        command: &CommandSpec,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> HealthReport {
        let request = CommandRequest::new(command.program.clone(), timeout)
            .with_args(command.args.iter().cloned())
            .with_env(env.clone());
        let mut cmd = build_command(&request);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return HealthReport::unhealthy(
                    FailureKind::Spawn,
                    describe_spawn_error(&request.program, &e),
                    Vec::new(),
                )
            }
        };
        debug!("Health probe started {} (pid {})", request.display(), child.id());

        let rx = spawn_output_readers(&mut child);
        // Held until the end: some servers exit as soon as stdin closes.
        let mut stdin: Option<ChildStdin> = child.stdin.take();
        let mut handshake_sent = false;
        let mut lines: Vec<OutputLine> = Vec::new();
        let start = Instant::now();

        let report = loop {
            match rx.recv_timeout(POLL) {
                Ok(line) => {
                    let marker = readiness_marker(&line, &self.patterns);
                    lines.push(line);
                    if let Some(marker) = marker {
                        break HealthReport::healthy(marker, Vec::new());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Both streams are closed; the server may still be running.
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop.wait(POLL);
                }
            }

            if !handshake_sent && start.elapsed() >= self.warmup {
                handshake_sent = true;
                if let Some(pipe) = stdin.as_mut() {
                    let message = format!("{}\n", self.initialize_message());
                    if let Err(e) = pipe.write_all(message.as_bytes()).and_then(|_| pipe.flush()) {
                        debug!("Handshake write failed: {}", e);
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    let before = lines.len();
                    drain_output(&rx, &mut lines, EXIT_DRAIN);
                    if let Some(marker) = lines[before..]
                        .iter()
                        .find_map(|l| readiness_marker(l, &self.patterns))
                    {
                        break HealthReport::healthy(marker, Vec::new());
                    }
                    break match status.code() {
                        Some(0) => HealthReport::healthy("exited cleanly (status 0)", Vec::new()),
                        Some(code) => HealthReport::unhealthy(
                            FailureKind::HealthCheck,
                            format!("server exited with code {} before becoming ready", code),
                            Vec::new(),
                        ),
                        None => HealthReport::unhealthy(
                            FailureKind::HealthCheck,
                            "server terminated by signal before becoming ready",
                            Vec::new(),
                        ),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    break HealthReport::unhealthy(
                        FailureKind::HealthCheck,
                        format!("failed to wait for server: {}", e),
                        Vec::new(),
                    )
                }
            }

            if self.stop.is_stopped() {
                break HealthReport::unhealthy(
                    FailureKind::Aborted,
                    "health check aborted",
                    Vec::new(),
                );
            }
            if start.elapsed() >= timeout {
                break HealthReport::unhealthy(
                    FailureKind::Timeout,
                    format!(
                        "health check timeout after {}ms with no readiness marker",
                        timeout.as_millis()
                    ),
                    Vec::new(),
                );
            }
        };

        drop(stdin.take());
        if let Ok(None) = child.try_wait() {
            terminate_child(&mut child);
        }

        HealthReport {
            logs: lines.iter().map(|l| l.text().to_string()).collect(),
            ..report
        }
    }
}

/// Readiness evidence carried by one output line, if any.
pub fn readiness_marker(line: &OutputLine, patterns: &[String]) -> Option<String> {
    if let OutputLine::Stdout(text) = line {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
            if map.contains_key("result") {
                return Some("JSON-RPC response".to_string());
            }
            if map.contains_key("method") {
                return Some("JSON-RPC message".to_string());
            }
        }
    }
    let lowered = line.text().to_lowercase();
    patterns
        .iter()
        .find(|p| !p.is_empty() && lowered.contains(p.as_str()))
        .map(|p| format!("ready marker '{}'", p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        HealthSettings::default().ready_patterns
    }

    #[test]
    fn json_rpc_result_is_ready() {
        let line = OutputLine::Stdout(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.into());
        assert_eq!(
            readiness_marker(&line, &patterns()).as_deref(),
            Some("JSON-RPC response")
        );
    }

    #[test]
    fn keyword_on_stderr_is_ready() {
        let line = OutputLine::Stderr("Secure MCP Filesystem Server running on stdio".into());
        assert_eq!(
            readiness_marker(&line, &patterns()).as_deref(),
            Some("ready marker 'running on'")
        );
    }

    #[test]
    fn json_on_stderr_needs_keyword() {
        let line = OutputLine::Stderr(r#"{"result": 1}"#.into());
        assert_eq!(readiness_marker(&line, &patterns()), None);
    }

    #[test]
    fn plain_noise_is_not_ready() {
        let line = OutputLine::Stdout("downloading packages...".into());
        assert_eq!(readiness_marker(&line, &patterns()), None);
    }

    fn probe() -> StdioHealthProbe {
        let timeouts = Timeouts {
            health_warmup_ms: 10,
            ..Default::default()
        };
        StdioHealthProbe::new(StopSignal::new(), &timeouts, &HealthSettings::default())
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let spec = CommandSpec::new("mcpcheck-no-such-server-binary", &[]);
        let report = probe().probe(&spec, &HashMap::new(), Duration::from_secs(2));
        assert!(!report.healthy);
        assert_eq!(report.failure, Some(FailureKind::Spawn));
        assert!(report.detail.contains("command not found"));
    }

    #[cfg(unix)]
    #[test]
    fn echoing_server_answers_handshake() {
        // `cat` echoes the initialize message back on stdout.
        let spec = CommandSpec::new("cat", &[]);
        let report = probe().probe(&spec, &HashMap::new(), Duration::from_secs(5));
        assert!(report.healthy, "{:?}", report);
        assert_eq!(report.detail, "JSON-RPC message");
    }

    #[cfg(unix)]
    #[test]
    fn detached_stdio_does_not_spin() {
        use crate::shell::runner::thread_cpu_time;

        let spec = CommandSpec::new("sh", &["-c", "exec >&- 2>&-; sleep 1"]);
        let cpu_before = thread_cpu_time();
        let start = Instant::now();
        let report = probe().probe(&spec, &HashMap::new(), Duration::from_secs(5));
        let wall = start.elapsed();
        let cpu = thread_cpu_time() - cpu_before;

        assert!(report.healthy, "{:?}", report);
        assert_eq!(report.detail, "exited cleanly (status 0)");
        assert!(cpu < wall / 4, "cpu {:?} over wall {:?}", cpu, wall);
    }

    #[cfg(unix)]
    #[test]
    fn silent_server_times_out() {
        let spec = CommandSpec::new("sleep", &["5"]);
        let report = probe().probe(&spec, &HashMap::new(), Duration::from_millis(300));
        assert_eq!(report.failure, Some(FailureKind::Timeout));
        assert!(report.detail.contains("timeout after 300ms"));
    }

    #[cfg(unix)]
    #[test]
    fn clean_exit_is_healthy_and_failing_exit_is_not() {
        let ok = probe().probe(
            &CommandSpec::new("true", &[]),
            &HashMap::new(),
            Duration::from_secs(2),
        );
        assert!(ok.healthy);
        let bad = probe().probe(
            &CommandSpec::new("false", &[]),
            &HashMap::new(),
            Duration::from_secs(2),
        );
        assert_eq!(bad.failure, Some(FailureKind::HealthCheck));
        assert!(bad.detail.contains("code 1"));
    }
}
