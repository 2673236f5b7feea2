//! Session-start environment detection.

pub mod prerequisites;

pub use prerequisites::{candidates, detect, extract_version, Prerequisites, ToolStatus};
