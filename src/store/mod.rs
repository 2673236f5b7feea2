//! The attempt store: where install attempts are durably recorded.
//!
//! The harness only needs a small verb set from the store. [`AttemptStore`]
//! is implemented by [`RestStore`] (PostgREST-style HTTP) and
//! [`MemoryStore`] (in-process, with optional visibility lag).
//!
//! An empty query result means "not yet visible", never an error.

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::config::{StoreKind, StoreSettings};
use crate::error::Result;
use crate::shell::PlatformInfo;

/// Lifecycle of one attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt to be recorded.
#[derive(Debug, Clone, Serialize)]
pub struct NewAttempt {
    pub subject_id: String,
    /// Method label, e.g. `npx` or `pip -> python`.
    pub method: String,
    pub platform: PlatformInfo,
    pub session_id: String,
}

/// Attempt as read back from the store.
///
/// `status` stays a string: a store may hold values this harness never
/// writes, and those must be reported rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub subject_id: String,
    #[serde(default)]
    pub method: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    pub fn parsed_status(&self) -> Option<AttemptStatus> {
        AttemptStatus::parse(&self.status)
    }
}

/// Accept numeric or string primary keys.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Ad-hoc read: equality filters, optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    pub table: String,
    pub filters: Vec<(String, String)>,
    /// Column and descending flag.
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl StoreQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some((column.into(), true));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Data store consumed by the harness.
pub trait AttemptStore: Send + Sync {
    /// Human-readable backend description.
    fn describe(&self) -> String;

    /// Cheapest round trip that proves the store answers.
    fn ping(&self) -> Result<()>;

    /// Record a new pending attempt and return its id.
    fn insert_attempt(&self, attempt: &NewAttempt) -> Result<String>;

    fn update_attempt_status(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Most recent visible attempt for a subject.
    fn query_latest_attempt(&self, subject_id: &str) -> Result<Option<AttemptRecord>>;

    /// Delete every attempt for a subject; returns how many were removed.
    fn delete_attempts(&self, subject_id: &str) -> Result<usize>;

    fn read(&self, query: &StoreQuery) -> Result<Vec<serde_json::Value>>;
}

/// Build the configured backend.
pub fn open_store(settings: &StoreSettings) -> Result<Box<dyn AttemptStore>> {
    match settings.kind {
        StoreKind::Memory => Ok(Box::new(MemoryStore::with_tables(
            &settings.attempts_table,
            &settings.subjects_table,
        ))),
        StoreKind::Rest => Ok(Box::new(RestStore::from_settings(settings)?)),
    }
}
