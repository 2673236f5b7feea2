//! Single-shot store verification.
//!
//! The client asks once. Settle delays and polling belong to the
//! orchestrator so that every poll shows up in the phase logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::store::{AttemptStatus, AttemptStore};

/// What one lookup found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub found: bool,
    /// Stored status string, if a record was visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The record as returned, for reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl VerificationReport {
    pub fn not_found() -> Self {
        Self {
            found: false,
            status: None,
            raw: None,
        }
    }

    /// The record is visible but its final status has not landed yet.
    pub fn is_pending(&self) -> bool {
        self.found && self.status.as_deref() == Some(AttemptStatus::Pending.as_str())
    }

    /// Whether the latest record says the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.found && self.status.as_deref() == Some(AttemptStatus::Success.as_str())
    }
}

/// Looks up the latest attempt for a subject.
pub struct VerificationClient<'a> {
    store: &'a dyn AttemptStore,
}

impl<'a> VerificationClient<'a> {
    pub fn new(store: &'a dyn AttemptStore) -> Self {
        Self { store }
    }

    /// One lookup. An empty result is `found: false`, not an error.
    pub fn verify(&self, subject_id: &str) -> Result<VerificationReport> {
        let Some(record) = self.store.query_latest_attempt(subject_id)? else {
            return Ok(VerificationReport::not_found());
        };
        let raw = serde_json::to_value(&record).ok();
        Ok(VerificationReport {
            found: true,
            status: Some(record.status),
            raw,
        })
    }
}
