//! Process execution.
//!
//! - [`ProcessRunner`]: the seam every executor runs commands through
//! - [`SystemRunner`]: real processes with deadlines and stop handling
//! - [`ScriptedRunner`]: canned answers for tests
//! - [`StopSignal`]: operator abort, with cancellable waits

pub mod platform;
pub mod runner;
pub mod scripted;
pub mod stop;

pub use platform::{is_ci, PlatformInfo};
pub use runner::{
    CommandRequest, OutputLine, ProcessOutput, ProcessRunner, ProcessStatus, SystemRunner,
};
pub use scripted::ScriptedRunner;
pub use stop::StopSignal;
