//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations and hands each one the shared
//! [`CommandContext`] (project root, explicit config path, stop signal).

pub mod check_store;
pub mod completions;
pub mod dispatcher;
pub mod display;
pub mod plan;
pub mod report;
pub mod run;

pub use dispatcher::{Command, CommandContext, CommandDispatcher, CommandResult, EXIT_ERROR};
