//! Report command implementation.
//!
//! The `mcpcheck report` command shows a saved session: the latest by
//! default, a named one with `--session`, or a list with `--list`.

use crate::cli::args::ReportArgs;
use crate::error::{McpCheckError, Result};
use crate::report::{render_markdown, ReportStore};
use crate::session::SessionId;
use crate::ui::{format_relative_time, UserInterface};

use super::dispatcher::{Command, CommandContext, CommandResult};

const LIST_LIMIT: usize = 20;

/// The report command implementation.
pub struct ReportCommand {
    ctx: CommandContext,
    args: ReportArgs,
}

impl ReportCommand {
    pub fn new(ctx: CommandContext, args: ReportArgs) -> Self {
        Self { ctx, args }
    }

    fn store(&self) -> Result<ReportStore> {
        let dir = match &self.args.report_dir {
            Some(dir) => dir.clone(),
            None => self.ctx.load_config()?.report.dir,
        };
        Ok(ReportStore::new(self.ctx.resolve(&dir)))
    }

    fn list(&self, reports: &ReportStore, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let sessions = reports.list(LIST_LIMIT)?;
        if sessions.is_empty() {
            ui.message(&format!("No sessions in {}", reports.path().display()));
            return Ok(CommandResult::success());
        }
        for session in sessions {
            ui.message(&format!(
                "{}  {:<9}  {}/{} passed  {}",
                session.id,
                session.verdict(),
                session.summary.passed_items,
                session.summary.total_items,
                format_relative_time(session.started_at)
            ));
        }
        Ok(CommandResult::success())
    }
}

impl Command for ReportCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let reports = self.store()?;
        if self.args.list {
            return self.list(&reports, ui);
        }

        let session = match &self.args.session {
            Some(raw) => {
                let id = SessionId::parse(raw).ok_or_else(|| {
                    McpCheckError::ConfigValidationError {
                        message: format!("'{}' is not a session id", raw),
                    }
                })?;
                reports.load(&id)?
            }
            None => match reports.latest()? {
                Some(session) => session,
                None => {
                    ui.message(&format!("No sessions in {}", reports.path().display()));
                    return Ok(CommandResult::success());
                }
            },
        };

        if self.args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&session).map_err(anyhow::Error::from)?
            );
        } else {
            ui.message(&render_markdown(&session));
        }
        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::session::TestSession;
    use crate::shell::PlatformInfo;
    use crate::ui::MockUI;
    use tempfile::TempDir;

    fn saved(dir: &std::path::Path) -> TestSession {
        let mut session = TestSession::new(
            SessionId::new(),
            HarnessConfig::default(),
            PlatformInfo::current(),
        );
        session.finalize();
        ReportStore::new(dir).save(&session).unwrap();
        session
    }

    fn command(temp: &TempDir, args: ReportArgs) -> ReportCommand {
        ReportCommand::new(
            CommandContext::new(temp.path()),
            ReportArgs {
                report_dir: Some(temp.path().join("reports")),
                ..args
            },
        )
    }

    #[test]
    fn shows_latest_session() {
        let temp = TempDir::new().unwrap();
        let session = saved(&temp.path().join("reports"));
        let mut ui = MockUI::new();

        command(&temp, ReportArgs::default()).execute(&mut ui).unwrap();

        assert!(ui.has_output(&format!("# mcpcheck session {}", session.id)));
    }

    #[test]
    fn lists_sessions() {
        let temp = TempDir::new().unwrap();
        let session = saved(&temp.path().join("reports"));
        let mut ui = MockUI::new();

        command(
            &temp,
            ReportArgs {
                list: true,
                ..Default::default()
            },
        )
        .execute(&mut ui)
        .unwrap();

        assert_eq!(ui.messages().len(), 1);
        assert!(ui.messages()[0].starts_with(&session.id.to_string()));
        assert!(ui.messages()[0].contains("NOT_READY"));
    }

    #[test]
    fn bad_session_id_is_error() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();
        let result = command(
            &temp,
            ReportArgs {
                session: Some("yesterday".into()),
                ..Default::default()
            },
        )
        .execute(&mut ui);
        assert!(result.is_err());
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();
        let result = command(&temp, ReportArgs::default())
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.has_output("No sessions in"));
    }
}
