//! Run command implementation.
//!
//! The `mcpcheck run` command tests every compatible catalog entry and
//! writes the session report. The exit code carries the verdict.

use tracing::debug;

use crate::catalog::load_catalog;
use crate::cli::args::RunArgs;
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::install::{HttpPackageIndex, StdioHealthProbe};
use crate::logging::RunLog;
use crate::report::ReportStore;
use crate::runner::{Harness, RunOptions};
use crate::session::SessionId;
use crate::shell::SystemRunner;
use crate::store::open_store;
use crate::ui::{ItemProgress, UserInterface};

use super::dispatcher::{
    apply_methods_flag, apply_store_flag, finish_config, Command, CommandContext, CommandResult,
    EXIT_ERROR,
};
use super::display::show_session;

/// The run command implementation.
pub struct RunCommand {
    ctx: CommandContext,
    args: RunArgs,
}

impl RunCommand {
    pub fn new(ctx: CommandContext, args: RunArgs) -> Self {
        Self { ctx, args }
    }

    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Config files, then environment, then flags.
    fn build_config(&self) -> Result<HarnessConfig> {
        let mut config = self.ctx.load_config()?;
        apply_methods_flag(&mut config, &self.args.methods);
        if let Some(n) = self.args.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(dir) = &self.args.report_dir {
            config.report.dir = dir.clone();
        }
        apply_store_flag(&mut config, self.args.store.as_deref())?;
        finish_config(config)
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config = self.build_config()?;
        let catalog_path = self.ctx.resolve(&self.args.catalog);
        let subjects = load_catalog(&catalog_path)?;
        debug!("Run config: {:?}", config);

        let reports = ReportStore::new(self.ctx.resolve(&config.report.dir));
        let store = open_store(&config.store)?;
        let runner = SystemRunner::new(self.ctx.stop.clone());
        let index = HttpPackageIndex::new(config.timeouts.registry())?;
        let probe = StdioHealthProbe::new(self.ctx.stop.clone(), &config.timeouts, &config.health);

        let id = SessionId::new();
        let log = RunLog::to_file(reports.log_path(&id), config.report.log_flush_every);
        let options = RunOptions {
            only_subjects: self.args.subjects.clone(),
            catalog: Some(catalog_path.display().to_string()),
        };

        ui.show_header(&format!("mcpcheck session {}", id));
        ui.message(&format!(
            "{} subject(s) from {}, store {}",
            subjects.len(),
            catalog_path.display(),
            store.describe()
        ));

        let harness = Harness::new(
            &config,
            &runner,
            &index,
            &probe,
            store.as_ref(),
            self.ctx.stop.clone(),
        );
        let mut progress = ItemProgress::new();
        let outcome = harness.run_with_progress(id, &subjects, &options, &log, |event| {
            progress.handle(&mut *ui, event)
        });

        if let Err(e) = log.finish() {
            ui.warning(&format!("Could not write run log: {:#}", e));
        }

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                ui.error(&format!("Session failed: {}", e));
                return Ok(CommandResult::failure(EXIT_ERROR));
            }
        };

        let saved = reports.save(&session)?;

        if self.args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&session).map_err(anyhow::Error::from)?
            );
        } else {
            show_session(ui, &session);
            ui.message(&format!("Report: {}", saved.summary.display()));
            if let Some(path) = log.path() {
                ui.message(&format!("Run log: {}", path.display()));
            }
        }

        Ok(CommandResult::with_code(session.verdict().exit_code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreKind;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            catalog: PathBuf::from("servers.yml"),
            methods: vec![],
            subjects: vec![],
            max_attempts: None,
            report_dir: None,
            store: None,
            json: false,
        }
    }

    fn command(args: RunArgs) -> RunCommand {
        RunCommand::new(CommandContext::new("/nonexistent/mcpcheck-project"), args)
    }

    #[test]
    fn flags_override_defaults() {
        let cmd = command(RunArgs {
            methods: vec!["npx".into()],
            max_attempts: Some(5),
            report_dir: Some(PathBuf::from("out")),
            store: Some("memory".into()),
            ..args()
        });
        let config = cmd.build_config().unwrap();
        assert_eq!(config.methods.allowed, vec!["npx"]);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.report.dir, PathBuf::from("out"));
        assert_eq!(config.store.kind, StoreKind::Memory);
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let cmd = command(RunArgs {
            max_attempts: Some(0),
            ..args()
        });
        assert!(cmd.build_config().is_err());
    }

    #[test]
    fn rest_store_without_url_is_invalid() {
        let cmd = command(RunArgs {
            store: Some("rest".into()),
            ..args()
        });
        if std::env::var("MCPCHECK_STORE_URL").is_err() {
            assert!(cmd.build_config().is_err());
        }
    }
}
