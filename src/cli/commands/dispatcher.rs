//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands
//! - [`CommandContext`] for what every command shares: paths, config, stop

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::config::{apply_env_overrides, load_config, validate, HarnessConfig, StoreKind};
use crate::error::{McpCheckError, Result};
use crate::shell::StopSignal;
use crate::ui::UserInterface;

/// Exit code for a session-level error.
pub const EXIT_ERROR: i32 = 3;

/// Trait for command implementations.
pub trait Command {
    /// Execute the command.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }

    /// Result carrying a readiness exit code (0 only for READY).
    pub fn with_code(exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
        }
    }
}

/// State shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub project_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub stop: StopSignal,
}

impl CommandContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_path: None,
            stop: StopSignal::new(),
        }
    }

    /// Load config files and `MCPCHECK_*` overrides, without validating.
    ///
    /// Commands layer their own flags on top and then call [`validate`].
    pub fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = load_config(&self.project_root, self.config_path.as_deref())?;
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Resolve a path given on the command line against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Apply a `--store` flag.
pub fn apply_store_flag(config: &mut HarnessConfig, store: Option<&str>) -> Result<()> {
    if let Some(kind) = store {
        config.store.kind =
            kind.parse::<StoreKind>()
                .map_err(|message| McpCheckError::ConfigValidationError { message })?;
    }
    Ok(())
}

/// Apply a `--methods` flag; empty means keep the configured list.
pub fn apply_methods_flag(config: &mut HarnessConfig, methods: &[String]) {
    if !methods.is_empty() {
        config.methods.allowed = methods
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
    }
}

/// Final check once every layer is applied.
pub fn finish_config(config: HarnessConfig) -> Result<HarnessConfig> {
    validate(&config)?;
    Ok(config)
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    context: CommandContext,
}

impl CommandDispatcher {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            context: CommandContext::new(project_root),
        }
    }

    /// Layer an explicit config file.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.context.config_path = path;
        self
    }

    /// Share a stop signal (wired to SIGINT/SIGTERM by the binary).
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.context.stop = stop;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.context.project_root
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ctx = self.context.clone();
        match &cli.command {
            Commands::Run(args) => super::run::RunCommand::new(ctx, args.clone()).execute(ui),
            Commands::Plan(args) => super::plan::PlanCommand::new(ctx, args.clone()).execute(ui),
            Commands::CheckStore(args) => {
                super::check_store::CheckStoreCommand::new(ctx, args.clone()).execute(ui)
            }
            Commands::Report(args) => {
                super::report::ReportCommand::new(ctx, args.clone()).execute(ui)
            }
            Commands::Completions(args) => {
                super::completions::CompletionsCommand::new(args.clone()).execute(ui)
            }
        }
    }
}
