//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// mcpcheck - Install, verify and clean up MCP servers, then judge readiness.
#[derive(Debug, Parser)]
#[command(name = "mcpcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (layered over .mcpcheck/config.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show per-phase detail for every attempt
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Test every catalog entry: install, verify, clean up, then report
    Run(RunArgs),

    /// Show the test queue without running anything
    Plan(PlanArgs),

    /// Run the attempt store health checks
    CheckStore(CheckStoreArgs),

    /// Show a saved session report
    Report(ReportArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Catalog file (YAML, or JSON by extension)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Allowed install methods (comma-separated; replaces the configured list)
    #[arg(long, value_delimiter = ',')]
    pub methods: Vec<String>,

    /// Test only these subject ids (comma-separated)
    #[arg(long = "subject", value_delimiter = ',')]
    pub subjects: Vec<String>,

    /// Attempts per item, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Directory for session reports and run logs
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Attempt store backend (memory or rest)
    #[arg(long)]
    pub store: Option<String>,

    /// Print the session record as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, clap::Args)]
pub struct PlanArgs {
    /// Catalog file (YAML, or JSON by extension)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Allowed install methods (comma-separated; replaces the configured list)
    #[arg(long, value_delimiter = ',')]
    pub methods: Vec<String>,

    /// Plan only these subject ids (comma-separated)
    #[arg(long = "subject", value_delimiter = ',')]
    pub subjects: Vec<String>,
}

/// Arguments for the `check-store` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CheckStoreArgs {
    /// Attempt store backend (memory or rest)
    #[arg(long)]
    pub store: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `report` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ReportArgs {
    /// Session id (defaults to the most recent)
    #[arg(long)]
    pub session: Option<String>,

    /// List recent sessions instead of showing one
    #[arg(long, conflicts_with = "session")]
    pub list: bool,

    /// Print the session record as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory holding session reports
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
