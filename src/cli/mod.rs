//! Command-line interface for mcpcheck.
//!
//! This module provides the CLI argument parsing using clap's derive macros
//! and command implementations.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{CheckStoreArgs, Cli, Commands, CompletionsArgs, PlanArgs, ReportArgs, RunArgs};
pub use commands::{Command, CommandContext, CommandDispatcher, CommandResult, EXIT_ERROR};
