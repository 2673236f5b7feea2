//! Store health suite, run at session start and by `check-store`.
//!
//! Each [`VerificationTest`] performs one read against the store and
//! decides whether the answer is acceptable. A critical failure means
//! nothing can be tested meaningfully.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::StoreSettings;
use crate::store::{AttemptStatus, AttemptStore, StoreQuery};

/// Name of the check that gates a whole session.
pub const STORE_REACHABLE: &str = "store reachable";

type CheckFn = Box<dyn Fn(&dyn AttemptStore) -> Result<String, String> + Send + Sync>;

/// One named store check.
pub struct VerificationTest {
    pub name: String,
    pub critical: bool,
    check: CheckFn,
}

impl VerificationTest {
    pub fn new<F>(name: impl Into<String>, critical: bool, check: F) -> Self
    where
        F: Fn(&dyn AttemptStore) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            critical,
            check: Box::new(check),
        }
    }

    pub fn run(&self, store: &dyn AttemptStore) -> StoreCheckResult {
        let start = Instant::now();
        let outcome = (self.check)(store);
        let duration_ms = start.elapsed().as_millis() as u64;
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        debug!("Store check '{}': {} ({})", self.name, passed, detail);
        StoreCheckResult {
            name: self.name.clone(),
            critical: self.critical,
            passed,
            detail,
            duration_ms,
        }
    }
}

impl std::fmt::Debug for VerificationTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationTest")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

/// Result of one store check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCheckResult {
    pub name: String,
    pub critical: bool,
    pub passed: bool,
    pub detail: String,
    pub duration_ms: u64,
}

/// The standard four checks for a configured store.
pub fn default_suite(settings: &StoreSettings) -> Vec<VerificationTest> {
    let attempts = settings.attempts_table.clone();
    let subjects = settings.subjects_table.clone();
    let recent = settings.attempts_table.clone();

    vec![
        VerificationTest::new(STORE_REACHABLE, true, |store| {
            store
                .ping()
                .map(|_| format!("{} answered", store.describe()))
                .map_err(|e| e.to_string())
        }),
        VerificationTest::new("attempt records readable", true, move |store| {
            store
                .read(&StoreQuery::table(&attempts).limit(1))
                .map(|rows| format!("{} read ok ({} row sample)", attempts, rows.len()))
                .map_err(|e| e.to_string())
        }),
        VerificationTest::new("subject catalog readable", false, move |store| {
            store
                .read(&StoreQuery::table(&subjects).limit(1))
                .map(|rows| format!("{} read ok ({} row sample)", subjects, rows.len()))
                .map_err(|e| e.to_string())
        }),
        VerificationTest::new("recent attempt statuses valid", false, move |store| {
            let rows = store
                .read(
                    &StoreQuery::table(&recent)
                        .order_desc("created_at")
                        .limit(20),
                )
                .map_err(|e| e.to_string())?;
            let invalid: Vec<String> = rows
                .iter()
                .filter_map(|row| {
                    let status = row.get("status").and_then(|s| s.as_str()).unwrap_or("");
                    AttemptStatus::parse(status)
                        .is_none()
                        .then(|| format!("'{}'", status))
                })
                .collect();
            if invalid.is_empty() {
                Ok(format!("{} recent record(s) valid", rows.len()))
            } else {
                Err(format!("unexpected status values: {}", invalid.join(", ")))
            }
        }),
    ]
}

/// Run every check in order.
pub fn run_suite(store: &dyn AttemptStore, tests: &[VerificationTest]) -> Vec<StoreCheckResult> {
    tests.iter().map(|t| t.run(store)).collect()
}

/// Failed checks that were marked critical.
pub fn critical_failures(results: &[StoreCheckResult]) -> Vec<&StoreCheckResult> {
    results.iter().filter(|r| r.critical && !r.passed).collect()
}

/// The failed reachability check, if it failed.
pub fn unreachable(results: &[StoreCheckResult]) -> Option<&StoreCheckResult> {
    results
        .iter()
        .find(|r| r.name == STORE_REACHABLE && !r.passed)
}
