//! Per-item progress display.

use std::time::{Duration, Instant};

use super::{SpinnerHandle, UserInterface};
use crate::runner::{ItemRun, ProgressEvent};

/// Turns scheduler progress events into spinner lines, one per item.
#[derive(Default)]
pub struct ItemProgress {
    label: String,
    spinner: Option<Box<dyn SpinnerHandle>>,
    started: Option<Instant>,
}

impl ItemProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    pub fn handle(&mut self, ui: &mut dyn UserInterface, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::ItemStarting {
                index,
                total,
                subject_name,
                method,
            } => {
                self.label = format!("[{}/{}] {} ({})", index, total, subject_name, method);
                self.started = Some(Instant::now());
                self.spinner = Some(ui.start_spinner(&self.label));
            }
            ProgressEvent::ItemFinished { run, .. } => {
                let elapsed = self.started.take().map(|t| t.elapsed()).unwrap_or_default();
                let line = self.finish_line(run, elapsed);
                if let Some(mut spinner) = self.spinner.take() {
                    if run.passed {
                        spinner.finish_success(&line);
                    } else if run.aborted && run.outcomes.is_empty() {
                        spinner.finish_skipped(&line);
                    } else {
                        spinner.finish_error(&line);
                    }
                }
                if ui.output_mode().shows_phase_detail() {
                    for outcome in &run.outcomes {
                        for phase in outcome.phases() {
                            let status = if !phase.ran {
                                "not run"
                            } else if phase.success {
                                "ok"
                            } else {
                                "failed"
                            };
                            ui.message(&format!(
                                "    attempt {} {} {} ({}ms){}",
                                outcome.attempt,
                                phase.phase,
                                status,
                                phase.duration_ms,
                                phase
                                    .error
                                    .as_deref()
                                    .map(|e| format!(": {}", e))
                                    .unwrap_or_default()
                            ));
                        }
                    }
                }
            }
        }
    }

    fn finish_line(&self, run: &ItemRun, elapsed: Duration) -> String {
        let attempts = match run.attempts() {
            1 => "1 attempt".to_string(),
            n => format!("{} attempts", n),
        };
        if run.passed {
            format!("{} {}, {}", self.label, attempts, format_duration(elapsed))
        } else if run.aborted && run.outcomes.is_empty() {
            format!("{} stopped", self.label)
        } else {
            let causes = run.last_root_causes();
            if causes.is_empty() {
                format!("{} failed after {}", self.label, attempts)
            } else {
                format!(
                    "{} failed after {}: {}",
                    self.label,
                    attempts,
                    causes.join("; ")
                )
            }
        }
    }
}

/// Format a timestamp as a relative time string (e.g., "2 minutes ago").
pub fn format_relative_time(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    let now = chrono::Utc::now();
    let diff = now.signed_duration_since(timestamp);
    let seconds = diff.num_seconds();

    if seconds < 0 {
        return "just now".to_string();
    }

    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return if minutes == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{} minutes ago", minutes)
        };
    }

    let hours = minutes / 60;
    if hours < 24 {
        return if hours == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{} hours ago", hours)
        };
    }

    let days = hours / 24;
    if days < 30 {
        return if days == 1 {
            "yesterday".to_string()
        } else {
            format!("{} days ago", days)
        };
    }

    let months = days / 30;
    if months < 12 {
        return if months == 1 {
            "1 month ago".to_string()
        } else {
            format!("{} months ago", months)
        };
    }

    let years = months / 12;
    if years == 1 {
        "1 year ago".to_string()
    } else {
        format!("{} years ago", years)
    }
}

/// Format a duration for display.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}
