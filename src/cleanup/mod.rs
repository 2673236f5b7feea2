//! Cleanup phase.

pub mod executor;

pub use executor::{classify_removal, removal_request, ArtifactOutcome, CleanupExecutor, CleanupPhase};
