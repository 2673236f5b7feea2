//! mcpcheck - Install-test orchestration for MCP server packages.
//!
//! mcpcheck takes a catalog of MCP servers and, for every compatible install
//! method, installs the package, confirms the attempt landed in the attempt
//! store, and cleans up. Failed attempts are retried with backoff. The
//! results roll up into a session report and a READY / CAUTION / NOT_READY
//! verdict.
//!
//! # Modules
//!
//! - [`catalog`] - Subjects and their install methods
//! - [`cleanup`] - Artifact removal and record deletion
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration loading, overrides, and validation
//! - [`detection`] - Package-manager detection
//! - [`error`] - Error types and result aliases
//! - [`install`] - Package resolution and server health probes
//! - [`logging`] - The per-session run log
//! - [`report`] - Aggregation, readiness, and report files
//! - [`runner`] - Attempts, retries, the queue, and the session driver
//! - [`session`] - Session identity and records
//! - [`shell`] - Process execution and the stop signal
//! - [`store`] - Attempt store backends
//! - [`ui`] - Spinners and terminal output
//! - [`verify`] - Store lookups and store health checks
//!
//! # Example
//!
//! ```
//! use mcpcheck::catalog::parse_catalog;
//!
//! let subjects = parse_catalog(
//!     "- id: fs\n  install_methods:\n    - command: npx -y @modelcontextprotocol/server-filesystem\n",
//!     false,
//! )
//! .unwrap();
//! let method = subjects[0].install_methods[0].resolve().unwrap();
//! assert_eq!(method.label(), "npx");
//! ```

pub mod catalog;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod install;
pub mod logging;
pub mod report;
pub mod runner;
pub mod session;
pub mod shell;
pub mod store;
pub mod ui;
pub mod verify;

pub use error::{McpCheckError, Result};
