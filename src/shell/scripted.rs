//! Scripted process runner for tests and dry planning.
//!
//! Responses are matched by program name and, optionally, by a prefix of
//! the argument list. Every request is recorded so tests can assert on
//! what would have run.

use std::sync::Mutex;
use std::time::Duration;

use super::runner::{CommandRequest, OutputLine, ProcessOutput, ProcessRunner};

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    args_prefix: Vec<String>,
    output: ProcessOutput,
}

/// Runner that answers from a script instead of spawning processes.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    /// Runner where every unscripted command is "not found".
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `program` (any args) with `output`.
    pub fn on(self, program: &str, output: ProcessOutput) -> Self {
        self.on_args(program, &[], output)
    }

    /// Answer `program` whose args start with `args_prefix`.
    ///
    /// Later rules take precedence over earlier ones.
    pub fn on_args(self, program: &str, args_prefix: &[&str], output: ProcessOutput) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                program: program.to_string(),
                args_prefix: args_prefix.iter().map(|a| a.to_string()).collect(),
                output,
            });
        }
        self
    }

    /// Exit 0 with the given stdout lines.
    pub fn ok(stdout: &[&str]) -> ProcessOutput {
        ProcessOutput::exited(
            Some(0),
            stdout
                .iter()
                .map(|l| OutputLine::Stdout(l.to_string()))
                .collect(),
            Duration::from_millis(1),
        )
    }

    /// Exit with `code` and the given stderr lines.
    pub fn fail(code: i32, stderr: &[&str]) -> ProcessOutput {
        ProcessOutput::exited(
            Some(code),
            stderr
                .iter()
                .map(|l| OutputLine::Stderr(l.to_string()))
                .collect(),
            Duration::from_millis(1),
        )
    }

    /// Every request seen so far.
    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Requests for one program.
    pub fn calls_to(&self, program: &str) -> Vec<CommandRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> ProcessOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(poisoned) => poisoned.into_inner(),
        };
        rules
            .iter()
            .rev()
            .find(|rule| {
                rule.program == request.program
                    && request.args.len() >= rule.args_prefix.len()
                    && rule
                        .args_prefix
                        .iter()
                        .zip(&request.args)
                        .all(|(want, got)| want == got)
            })
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| {
                ProcessOutput::spawn_failed(
                    format!("command not found: {}", request.program),
                    Duration::ZERO,
                )
            })
    }
}
