//! External process execution with deadlines.
//!
//! [`ProcessRunner`] is the seam every executor uses to touch the operating
//! system. [`SystemRunner`] spawns real processes; tests substitute scripted
//! runners so the orchestration code is exercised without a package manager.
//!
//! A run never returns an error: spawn failures, timeouts, operator aborts
//! and non-zero exits are all encoded in [`ProcessOutput`] so callers can
//! turn them into phase failures with distinct root causes.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::stop::StopSignal;

/// How often the wait loop re-checks the child, the deadline and the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to keep collecting output after the child is gone.
///
/// Grandchildren may inherit the pipes and keep them open; the readers are
/// detached after this grace period rather than joined.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Time between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// One line of output, tagged with the stream it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    /// The line text regardless of stream.
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(s) | OutputLine::Stderr(s) => s,
        }
    }
}

/// A command to run: program, arguments, extra environment, deadline.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Program name or path (resolved through PATH).
    pub program: String,
    /// Arguments passed verbatim, no shell involved.
    pub args: Vec<String>,
    /// Variables merged over the ambient environment.
    pub env: HashMap<String, String>,
    /// Working directory (inherits the current one when unset).
    pub cwd: Option<PathBuf>,
    /// Hard deadline for the whole run.
    pub timeout: Duration,
}

impl CommandRequest {
    /// Create a request with no arguments or extra environment.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout,
        }
    }

    /// Set the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the extra environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Render as a single command line for logs and reports.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Classified end state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exited with status 0.
    Success,
    /// Exited with a non-zero status.
    NonZeroExit(i32),
    /// Terminated by a signal without an exit code.
    Signalled,
    /// Killed because the deadline passed.
    TimedOut,
    /// Never started.
    SpawnFailed(String),
    /// Killed because a stop was requested.
    Aborted,
}

/// Everything observed about one run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process timed out, was aborted, was
    /// signalled or never started.
    pub exit_code: Option<i32>,
    /// Output lines in arrival order across both streams.
    pub lines: Vec<OutputLine>,
    /// Whether the deadline killed the process.
    pub timed_out: bool,
    /// Whether a stop request killed the process.
    pub aborted: bool,
    /// Why the process could not be started.
    pub spawn_error: Option<String>,
    /// Wall time from spawn attempt to completion.
    pub duration: Duration,
}

impl ProcessOutput {
    /// A run that never started.
    pub fn spawn_failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            spawn_error: Some(error.into()),
            duration,
            ..Default::default()
        }
    }

    /// A run that exited on its own.
    pub fn exited(exit_code: Option<i32>, lines: Vec<OutputLine>, duration: Duration) -> Self {
        Self {
            exit_code,
            lines,
            duration,
            ..Default::default()
        }
    }

    /// A run killed at its deadline.
    pub fn timed_out(lines: Vec<OutputLine>, duration: Duration) -> Self {
        Self {
            lines,
            timed_out: true,
            duration,
            ..Default::default()
        }
    }

    /// Standard output only.
    pub fn stdout(&self) -> String {
        self.collect(|l| matches!(l, OutputLine::Stdout(_)))
    }

    /// Standard error only.
    pub fn stderr(&self) -> String {
        self.collect(|l| matches!(l, OutputLine::Stderr(_)))
    }

    /// Both streams interleaved in arrival order.
    pub fn combined(&self) -> String {
        self.collect(|_| true)
    }

    fn collect(&self, keep: impl Fn(&OutputLine) -> bool) -> String {
        let mut out = String::new();
        for line in self.lines.iter().filter(|l| keep(l)) {
            out.push_str(line.text());
            out.push('\n');
        }
        out
    }

    /// Classify the run.
    pub fn status(&self) -> ProcessStatus {
        if let Some(err) = &self.spawn_error {
            return ProcessStatus::SpawnFailed(err.clone());
        }
        if self.aborted {
            return ProcessStatus::Aborted;
        }
        if self.timed_out {
            return ProcessStatus::TimedOut;
        }
        match self.exit_code {
            Some(0) => ProcessStatus::Success,
            Some(code) => ProcessStatus::NonZeroExit(code),
            None => ProcessStatus::Signalled,
        }
    }

    /// Whether the process ran and exited with status 0.
    pub fn success(&self) -> bool {
        self.status() == ProcessStatus::Success
    }
}

/// Runs external commands.
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion or until its deadline.
    fn run(&self, request: &CommandRequest) -> ProcessOutput;
}

/// Runs commands as real OS processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    stop: StopSignal,
}

impl SystemRunner {
    /// Create a runner that kills children when `stop` is triggered.
    pub fn new(stop: StopSignal) -> Self {
        Self { stop }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, request: &CommandRequest) -> ProcessOutput {
        let start = Instant::now();
        debug!("Running `{}` (timeout {:?})", request.display(), request.timeout);

        let mut command = build_command(request);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutput::spawn_failed(
                    describe_spawn_error(&request.program, &e),
                    start.elapsed(),
                )
            }
        };

        let rx = spawn_output_readers(&mut child);
        let deadline = start + request.timeout;
        let mut lines = Vec::new();

        let end = loop {
            match child.try_wait() {
                Ok(Some(status)) => break RunEnd::Exited(status.code()),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to poll `{}`: {}", request.program, e);
                    terminate_child(&mut child);
                    break RunEnd::Exited(None);
                }
            }
            if self.stop.is_stopped() {
                terminate_child(&mut child);
                break RunEnd::Aborted;
            }
            if Instant::now() >= deadline {
                terminate_child(&mut child);
                break RunEnd::TimedOut;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => lines.push(line),
                Err(RecvTimeoutError::Timeout) => {}
                // Both streams are closed but the child is still running.
                Err(RecvTimeoutError::Disconnected) => {
                    self.stop.wait(POLL_INTERVAL);
                }
            }
        };

        drain_output(&rx, &mut lines, DRAIN_GRACE);
        let duration = start.elapsed();

        match end {
            RunEnd::Exited(code) => ProcessOutput::exited(code, lines, duration),
            RunEnd::TimedOut => {
                debug!("`{}` timed out after {:?}", request.display(), duration);
                ProcessOutput::timed_out(lines, duration)
            }
            RunEnd::Aborted => ProcessOutput {
                lines,
                aborted: true,
                duration,
                ..Default::default()
            },
        }
    }
}

enum RunEnd {
    Exited(Option<i32>),
    TimedOut,
    Aborted,
}

/// Build the OS command for a request.
///
/// On Windows package-manager shims (`npx.cmd`, `pip.exe` wrappers) only
/// resolve through `cmd /C`.
pub(crate) fn build_command(request: &CommandRequest) -> Command {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&request.program);
        c
    } else {
        Command::new(&request.program)
    };
    command.args(&request.args);
    command.envs(&request.env);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    command
}

/// Turn a spawn error into a root-cause string.
pub(crate) fn describe_spawn_error(program: &str, err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => format!("command not found: {}", program),
        std::io::ErrorKind::PermissionDenied => format!("permission denied: {}", program),
        _ => format!("failed to spawn {}: {}", program, err),
    }
}

/// Start one reader thread per captured stream, feeding a shared channel.
pub(crate) fn spawn_output_readers(child: &mut Child) -> Receiver<OutputLine> {
    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone(), OutputLine::Stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx, OutputLine::Stderr);
    }
    rx
}

fn spawn_reader<R>(stream: R, tx: Sender<OutputLine>, wrap: fn(String) -> OutputLine)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(wrap(line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Collect remaining output until every reader hangs up or `grace` passes.
pub(crate) fn drain_output(rx: &Receiver<OutputLine>, lines: &mut Vec<OutputLine>, grace: Duration) {
    let deadline = Instant::now() + grace;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Ask the child to exit, then force it.
///
/// Reaping is attempted but not guaranteed: a child that ignores SIGKILL
/// handling or re-parented grandchildren may outlive this call.
pub(crate) fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: kill() only sends a signal to the pid we spawned.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            let start = Instant::now();
            while start.elapsed() < TERM_GRACE {
                if let Ok(Some(_)) = child.try_wait() {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    if let Err(e) = child.kill() {
        debug!("kill({}) failed: {}", child.id(), e);
    }
    let _ = child.wait();
}

/// CPU time consumed by the calling thread.
#[cfg(all(test, unix))]
pub(crate) fn thread_cpu_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: clock_gettime only writes into the timespec we own.
    unsafe {
        libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts);
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandRequest {
        CommandRequest::new("sh", timeout).with_args(["-c", script])
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_exit_code() {
        let runner = SystemRunner::default();
        let out = runner.run(&sh("echo hello", Duration::from_secs(10)));
        assert!(out.success());
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout(), "hello\n");
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_distinct() {
        let runner = SystemRunner::default();
        let out = runner.run(&sh("echo oops >&2; exit 3", Duration::from_secs(10)));
        assert_eq!(out.status(), ProcessStatus::NonZeroExit(3));
        assert!(out.stderr().contains("oops"));
        assert!(out.combined().contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_and_reports() {
        let runner = SystemRunner::default();
        let start = Instant::now();
        let out = runner.run(&sh("echo started; sleep 30", Duration::from_millis(300)));
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert_eq!(out.status(), ProcessStatus::TimedOut);
        assert!(out.stdout().contains("started"));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn closed_streams_do_not_spin_while_child_runs() {
        let runner = SystemRunner::default();
        let cpu_before = thread_cpu_time();
        let start = Instant::now();
        let out = runner.run(&sh("exec >&- 2>&-; sleep 1", Duration::from_secs(10)));
        let wall = start.elapsed();
        let cpu = thread_cpu_time() - cpu_before;

        assert!(out.success(), "{:?}", out);
        assert!(wall >= Duration::from_millis(900));
        assert!(cpu < wall / 4, "cpu {:?} over wall {:?}", cpu, wall);
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let runner = SystemRunner::default();
        let out = runner.run(&CommandRequest::new(
            "mcpcheck-no-such-binary-4821",
            Duration::from_secs(5),
        ));
        match out.status() {
            ProcessStatus::SpawnFailed(msg) => assert!(msg.contains("mcpcheck-no-such-binary-4821")),
            other => panic!("expected spawn failure, got {:?}", other),
        }
        assert_eq!(out.exit_code, None);
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn env_is_passed_through() {
        let mut env = HashMap::new();
        env.insert("MCPCHECK_TEST_VAR".to_string(), "from-test".to_string());
        let runner = SystemRunner::default();
        let out = runner.run(&sh("echo $MCPCHECK_TEST_VAR", Duration::from_secs(10)).with_env(env));
        assert!(out.stdout().contains("from-test"));
    }

    #[cfg(unix)]
    #[test]
    fn stop_signal_aborts_running_child() {
        let stop = StopSignal::new();
        let runner = SystemRunner::new(stop.clone());
        let remote = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.stop();
        });
        let start = Instant::now();
        let out = runner.run(&sh("sleep 30", Duration::from_secs(60)));
        handle.join().unwrap();
        assert_eq!(out.status(), ProcessStatus::Aborted);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn display_joins_args() {
        let req = CommandRequest::new("npx", Duration::from_secs(1)).with_args(["-y", "pkg"]);
        assert_eq!(req.display(), "npx -y pkg");
        let bare = CommandRequest::new("uvx", Duration::from_secs(1));
        assert_eq!(bare.display(), "uvx");
    }

    #[test]
    fn signalled_status_without_code() {
        let out = ProcessOutput::exited(None, vec![], Duration::ZERO);
        assert_eq!(out.status(), ProcessStatus::Signalled);
        assert!(!out.success());
    }
}
