//! Mock UI implementation for testing.
//!
//! `MockUI` implements the `UserInterface` trait and captures all
//! interactions for later assertion.
//!
//! # Example
//!
//! ```
//! use mcpcheck::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.message("Starting session");
//! ui.success("Done!");
//!
//! assert!(ui.messages().contains(&"Starting session".to_string()));
//! assert!(ui.successes().contains(&"Done!".to_string()));
//! ```

use std::sync::{Arc, Mutex};

use crate::report::Verdict;

use super::{OutputMode, SpinnerHandle, UserInterface};

/// Mock UI implementation for testing.
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    progress: Vec<(usize, usize)>,
    spinners: Vec<String>,
    spinner_results: Arc<Mutex<Vec<String>>>,
    verdicts: Vec<Verdict>,
    results_snapshot: Vec<String>,
}

impl MockUI {
    pub fn new() -> Self {
        Self::with_mode(OutputMode::Normal)
    }

    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set whether this mock behaves as interactive.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn progress_updates(&self) -> &[(usize, usize)] {
        &self.progress
    }

    /// Messages spinners were started with.
    pub fn spinners(&self) -> &[String] {
        &self.spinners
    }

    /// How each spinner finished, as `success: msg`, `error: msg` or
    /// `skipped: msg`.
    pub fn spinner_results(&mut self) -> &[String] {
        self.results_snapshot = self
            .spinner_results
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();
        &self.results_snapshot
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Check if any message, success, warning or error contains `needle`.
    pub fn has_output(&self, needle: &str) -> bool {
        self.messages
            .iter()
            .chain(&self.successes)
            .chain(&self.warnings)
            .chain(&self.errors)
            .any(|m| m.contains(needle))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        self.spinners.push(message.to_string());
        Box::new(MockSpinner {
            results: Arc::clone(&self.spinner_results),
        })
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn show_progress(&mut self, current: usize, total: usize) {
        self.progress.push((current, total));
    }

    fn show_verdict(&mut self, verdict: Verdict) {
        self.verdicts.push(verdict);
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Spinner handed out by [`MockUI`]; records how it finished.
#[derive(Debug)]
pub struct MockSpinner {
    results: Arc<Mutex<Vec<String>>>,
}

impl MockSpinner {
    fn record(&self, kind: &str, msg: &str) {
        if let Ok(mut results) = self.results.lock() {
            results.push(format!("{}: {}", kind, msg));
        }
    }
}

impl SpinnerHandle for MockSpinner {
    fn set_message(&mut self, _msg: &str) {}

    fn finish_success(&mut self, msg: &str) {
        self.record("success", msg);
    }

    fn finish_error(&mut self, msg: &str) {
        self.record("error", msg);
    }

    fn finish_skipped(&mut self, msg: &str) {
        self.record("skipped", msg);
    }
}
