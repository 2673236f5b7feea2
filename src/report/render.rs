//! Human-readable session summary in Markdown.

use std::fmt::Write;

use crate::session::TestSession;

fn pct(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Render the summary document for a finalized session.
pub fn render_markdown(session: &TestSession) -> String {
    let mut out = String::new();
    let s = &session.summary;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# mcpcheck session {}", session.id);
    let _ = writeln!(out);
    let _ = writeln!(out, "**Verdict: {}**", session.verdict());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Platform: {}{}",
        session.platform.label(),
        if session.platform.ci { " (CI)" } else { "" }
    );
    let _ = writeln!(out, "- Store: {}", session.store);
    let _ = writeln!(out, "- Started: {}", session.started_at.to_rfc3339());
    if let Some(ms) = session.duration_ms() {
        let _ = writeln!(out, "- Duration: {}ms", ms);
    }
    if session.aborted {
        let _ = writeln!(out, "- Stopped early by operator");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Results");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Items: {} tested, {} passed, {} failed ({})",
        s.total_items,
        s.passed_items,
        s.failed_items,
        pct(s.success_rate)
    );
    let _ = writeln!(
        out,
        "- Attempts: {} total, {} successful ({})",
        s.total_attempts,
        s.successful_attempts,
        pct(s.attempt_success_rate)
    );
    if let Some(m) = &session.metrics {
        let _ = writeln!(
            out,
            "- Environment compatibility: {} (threshold {})",
            pct(m.environment_compat_rate),
            pct(m.environment_threshold)
        );
        let _ = writeln!(out, "- Critical store failures: {}", m.critical_store_failures);
    }
    let _ = writeln!(out);

    if !s.by_method.is_empty() {
        let _ = writeln!(out, "## By method");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Method | Items | Passed | Attempts | Rate |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for (method, m) in &s.by_method {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                method,
                m.items,
                m.passed,
                m.attempts,
                pct(m.success_rate)
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Phase timings (ms)");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Phase | Runs | Min | Avg | Max |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for (name, t) in [
        ("install", &s.timings.install),
        ("verify", &s.timings.verify),
        ("cleanup", &s.timings.cleanup),
    ] {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            name, t.count, t.min_ms, t.avg_ms, t.max_ms
        );
    }
    let _ = writeln!(out);

    if !s.top_errors.is_empty() {
        let _ = writeln!(out, "## Top errors");
        let _ = writeln!(out);
        for e in &s.top_errors {
            let _ = writeln!(out, "- {}x `{}`", e.count, e.error);
        }
        let _ = writeln!(out);
    }

    if !s.exhausted.is_empty() {
        let _ = writeln!(out, "## Retries exhausted");
        let _ = writeln!(out);
        for x in &s.exhausted {
            let _ = writeln!(
                out,
                "- {} ({}) after {} attempts: {}",
                x.subject_id,
                x.method,
                x.attempts,
                x.last_errors.join("; ")
            );
        }
        let _ = writeln!(out);
    }

    if !session.plan.exclusions.is_empty() || !session.plan.skipped.is_empty() {
        let _ = writeln!(out, "## Not tested");
        let _ = writeln!(out);
        for e in &session.plan.exclusions {
            let _ = writeln!(
                out,
                "- {} method {}: {}",
                e.subject_id,
                e.method_index + 1,
                e.reason
            );
        }
        for skipped in &session.plan.skipped {
            let _ = writeln!(out, "- {}: {}", skipped.subject_id, skipped.reason);
        }
        let _ = writeln!(out);
    }

    if !session.store_checks.is_empty() {
        let _ = writeln!(out, "## Store checks");
        let _ = writeln!(out);
        for c in &session.store_checks {
            let _ = writeln!(
                out,
                "- [{}] {}{}: {}",
                if c.passed { "x" } else { " " },
                c.name,
                if c.critical { " (critical)" } else { "" },
                c.detail
            );
        }
        let _ = writeln!(out);
    }

    if !session.recommendations.is_empty() {
        let _ = writeln!(out, "## Recommendations");
        let _ = writeln!(out);
        for r in &session.recommendations {
            let _ = writeln!(out, "- {}", r);
        }
    }

    out
}
