//! Plan command implementation.
//!
//! The `mcpcheck plan` command detects tools and prints the queue a run
//! would execute. Nothing is installed and the store is not contacted.

use crate::catalog::load_catalog;
use crate::cli::args::PlanArgs;
use crate::detection::detect;
use crate::error::Result;
use crate::report::environment_compat_rate;
use crate::runner::{build_queue, required_tools};
use crate::shell::{PlatformInfo, ProcessRunner, SystemRunner};
use crate::ui::UserInterface;

use super::dispatcher::{apply_methods_flag, finish_config, Command, CommandContext, CommandResult};
use super::display::show_plan;

/// The plan command implementation.
pub struct PlanCommand {
    ctx: CommandContext,
    args: PlanArgs,
}

impl PlanCommand {
    pub fn new(ctx: CommandContext, args: PlanArgs) -> Self {
        Self { ctx, args }
    }

    /// Plan with an explicit process runner.
    pub fn execute_with(
        &self,
        runner: &dyn ProcessRunner,
        ui: &mut dyn UserInterface,
    ) -> Result<CommandResult> {
        let mut config = self.ctx.load_config()?;
        apply_methods_flag(&mut config, &self.args.methods);
        let config = finish_config(config)?;
        let subjects = load_catalog(&self.ctx.resolve(&self.args.catalog))?;

        let prerequisites = detect(
            runner,
            &required_tools(&subjects),
            config.timeouts.detect(),
        );
        let plan = build_queue(&subjects, &config, &prerequisites, &self.args.subjects);

        ui.show_header(&format!("Test plan on {}", PlatformInfo::current().label()));
        for tool in prerequisites.tools.values() {
            match (&tool.available, &tool.version) {
                (true, Some(version)) => ui.success(&format!("{} {}", tool.kind, version)),
                (true, None) => ui.success(&tool.kind.to_string()),
                (false, _) => ui.warning(&format!("{} not found", tool.kind)),
            }
        }
        show_plan(ui, &plan);
        ui.message(&format!(
            "Environment compatibility: {:.1}%",
            environment_compat_rate(&plan) * 100.0
        ));

        Ok(CommandResult::success())
    }
}

impl Command for PlanCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let runner = SystemRunner::new(self.ctx.stop.clone());
        self.execute_with(&runner, ui)
    }
}
