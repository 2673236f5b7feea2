//! Verification against the attempt store.

pub mod client;
pub mod store_checks;

pub use client::{VerificationClient, VerificationReport};
pub use store_checks::{
    critical_failures, default_suite, run_suite, unreachable, StoreCheckResult, VerificationTest,
    STORE_REACHABLE,
};
