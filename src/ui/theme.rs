//! Visual theme and styling.

use console::Style;

use crate::report::Verdict;

/// Colors and glyphs for terminal output.
#[derive(Debug, Clone)]
pub struct McpCheckTheme {
    /// Style for success messages (green).
    pub success: Style,
    /// Style for warning messages (yellow).
    pub warning: Style,
    /// Style for error messages (red bold).
    pub error: Style,
    /// Style for running elements and progress bars (cyan).
    pub info: Style,
    /// Style for dim/secondary text.
    pub dim: Style,
    /// Style for highlighted text (bold).
    pub highlight: Style,
    /// Style for headers (cyan bold).
    pub header: Style,
    /// Style for install commands shown in output (dim italic).
    pub command: Style,
}

impl Default for McpCheckTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl McpCheckTheme {
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
            info: Style::new().cyan(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().bold().cyan(),
            command: Style::new().dim().italic(),
        }
    }

    /// Create a theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            command: Style::new(),
        }
    }

    /// Pick the colored or plain theme for this terminal.
    pub fn detect() -> Self {
        if should_use_colors() {
            Self::new()
        } else {
            Self::plain()
        }
    }

    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    pub fn format_skipped(&self, msg: &str) -> String {
        format!("{}", self.dim.apply_to(format!("○ {}", msg)))
    }

    /// Format a header banner.
    pub fn format_header(&self, title: &str) -> String {
        format!(
            "{} {}",
            self.header.apply_to("▸"),
            self.highlight.apply_to(title)
        )
    }

    /// Format a verdict line, colored by severity.
    pub fn format_verdict(&self, verdict: Verdict) -> String {
        let style = match verdict {
            Verdict::Ready => &self.success,
            Verdict::Caution => &self.warning,
            Verdict::NotReady => &self.error,
        };
        format!(
            "{} {}",
            self.highlight.apply_to("Verdict:"),
            style.apply_to(verdict)
        )
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    // https://no-color.org/
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    console::Term::stdout().is_term()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_theme_has_glyphs_only() {
        let theme = McpCheckTheme::plain();
        assert_eq!(theme.format_success("done"), "✓ done");
        assert_eq!(theme.format_warning("slow"), "⚠ slow");
        assert_eq!(theme.format_error("broken"), "✗ broken");
        assert_eq!(theme.format_skipped("later"), "○ later");
        assert_eq!(theme.format_header("mcpcheck"), "▸ mcpcheck");
    }

    #[test]
    fn verdict_uses_wire_name() {
        let theme = McpCheckTheme::plain();
        assert_eq!(theme.format_verdict(Verdict::NotReady), "Verdict: NOT_READY");
        assert_eq!(theme.format_verdict(Verdict::Ready), "Verdict: READY");
    }
}
