//! Check-store command implementation.
//!
//! The `mcpcheck check-store` command runs the store health suite on its
//! own, the same checks a run performs before testing anything.

use crate::cli::args::CheckStoreArgs;
use crate::error::Result;
use crate::store::{open_store, AttemptStore};
use crate::ui::UserInterface;
use crate::verify::{critical_failures, default_suite, run_suite};

use super::dispatcher::{apply_store_flag, finish_config, Command, CommandContext, CommandResult};

/// The check-store command implementation.
pub struct CheckStoreCommand {
    ctx: CommandContext,
    args: CheckStoreArgs,
}

impl CheckStoreCommand {
    pub fn new(ctx: CommandContext, args: CheckStoreArgs) -> Self {
        Self { ctx, args }
    }

    /// Run the suite against an already-open store.
    pub fn check(
        &self,
        store: &dyn AttemptStore,
        settings: &crate::config::StoreSettings,
        ui: &mut dyn UserInterface,
    ) -> Result<CommandResult> {
        let results = run_suite(store, &default_suite(settings));

        if self.args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&results).map_err(anyhow::Error::from)?
            );
        } else {
            ui.show_header(&format!("Store checks: {}", store.describe()));
            for r in &results {
                let line = format!(
                    "{}{}: {} ({}ms)",
                    r.name,
                    if r.critical { " [critical]" } else { "" },
                    r.detail,
                    r.duration_ms
                );
                if r.passed {
                    ui.success(&line);
                } else if r.critical {
                    ui.error(&line);
                } else {
                    ui.warning(&line);
                }
            }
        }

        let critical = critical_failures(&results);
        if critical.is_empty() {
            Ok(CommandResult::success())
        } else {
            if !self.args.json {
                ui.error(&format!("{} critical check(s) failed", critical.len()));
            }
            Ok(CommandResult::failure(1))
        }
    }
}

impl Command for CheckStoreCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let mut config = self.ctx.load_config()?;
        apply_store_flag(&mut config, self.args.store.as_deref())?;
        let config = finish_config(config)?;
        let store = open_store(&config.store)?;
        self.check(store.as_ref(), &config.store, ui)
    }
}
