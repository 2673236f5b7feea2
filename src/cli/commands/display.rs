//! Shared display helpers for plans and sessions.
//!
//! Used by `plan`, `run` and `report` so a queue and a finished session
//! read the same everywhere.

use crate::runner::QueuePlan;
use crate::session::TestSession;
use crate::ui::UserInterface;

fn pct(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Print the queue, then what was left out and why.
pub fn show_plan(ui: &mut dyn UserInterface, plan: &QueuePlan) {
    if plan.items.is_empty() {
        ui.warning("Nothing to test: no compatible install methods");
    } else {
        ui.message(&format!("{} item(s) queued:", plan.items.len()));
        for item in &plan.items {
            let commands: Vec<String> =
                item.method.commands().iter().map(|c| c.display()).collect();
            if commands.is_empty() {
                ui.message(&format!("  {:>3}. {}", item.index + 1, item.describe()));
            } else {
                ui.message(&format!(
                    "  {:>3}. {} [{}]",
                    item.index + 1,
                    item.describe(),
                    commands.join(" && ")
                ));
            }
        }
    }

    for exclusion in &plan.exclusions {
        ui.warning(&format!(
            "{} method {}: {}",
            exclusion.subject_name,
            exclusion.method_index + 1,
            exclusion.reason
        ));
    }
    for skipped in &plan.skipped {
        ui.message(&format!("  ○ {}: {}", skipped.subject_id, skipped.reason));
    }
}

/// Print the results and verdict of a finished session.
pub fn show_session(ui: &mut dyn UserInterface, session: &TestSession) {
    let s = &session.summary;
    ui.message(&format!(
        "Items: {} tested, {} passed, {} failed ({})",
        s.total_items,
        s.passed_items,
        s.failed_items,
        pct(s.success_rate)
    ));
    ui.message(&format!(
        "Attempts: {} total, {} successful ({})",
        s.total_attempts,
        s.successful_attempts,
        pct(s.attempt_success_rate)
    ));
    if let Some(m) = &session.metrics {
        ui.message(&format!(
            "Environment compatibility: {} (threshold {})",
            pct(m.environment_compat_rate),
            pct(m.environment_threshold)
        ));
    }
    if session.aborted {
        ui.warning("Session stopped before the queue finished");
    }

    if !s.top_errors.is_empty() {
        ui.message("Most frequent errors:");
        for e in &s.top_errors {
            ui.message(&format!("  {}x {}", e.count, e.error));
        }
    }
    for recommendation in &session.recommendations {
        ui.warning(recommendation);
    }

    ui.show_verdict(session.verdict());
}
