//! In-process attempt store.
//!
//! Used for offline runs and tests. A visibility lag makes new records
//! invisible to the first N `query_latest_attempt` calls, the way an
//! eventually consistent backend behaves right after a write.

use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{AttemptRecord, AttemptStatus, AttemptStore, NewAttempt, StoreQuery};
use crate::error::{McpCheckError, Result};

#[derive(Debug)]
struct StoredAttempt {
    record: AttemptRecord,
    seq: u64,
    hidden_for: u32,
}

#[derive(Debug, Default)]
struct State {
    attempts: Vec<StoredAttempt>,
    subjects: Vec<Value>,
    next_seq: u64,
}

/// Mutex-guarded store living for the process.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    attempts_table: String,
    subjects_table: String,
    visibility_lag: u32,
    offline: AtomicBool,
    /// Status written instead of whatever the caller asks for.
    forced_status: Mutex<Option<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_tables("install_attempts", "mcp_servers")
    }

    pub fn with_tables(attempts_table: &str, subjects_table: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            attempts_table: attempts_table.to_string(),
            subjects_table: subjects_table.to_string(),
            visibility_lag: 0,
            offline: AtomicBool::new(false),
            forced_status: Mutex::new(None),
        }
    }

    /// Hide each new record from its first `queries` lookups.
    pub fn with_visibility_lag(mut self, queries: u32) -> Self {
        self.visibility_lag = queries;
        self
    }

    /// Seed rows for the subjects table.
    pub fn with_subjects(self, rows: Vec<Value>) -> Self {
        self.lock().subjects = rows;
        self
    }

    /// Make every operation fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Corrupt status updates, emulating a backend that records something
    /// other than what was written.
    pub fn force_status(&self, status: Option<&str>) {
        if let Ok(mut forced) = self.forced_status.lock() {
            *forced = status.map(str::to_string);
        }
    }

    /// Number of records held, visible or not.
    pub fn len(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records for a subject, oldest first.
    pub fn attempts_for(&self, subject_id: &str) -> Vec<AttemptRecord> {
        self.lock()
            .attempts
            .iter()
            .filter(|a| a.record.subject_id == subject_id)
            .map(|a| a.record.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self, operation: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(McpCheckError::store(operation, "memory store is offline"))
        } else {
            Ok(())
        }
    }
}

impl AttemptStore for MemoryStore {
    fn describe(&self) -> String {
        format!("memory ({})", self.attempts_table)
    }

    fn ping(&self) -> Result<()> {
        self.check_online("ping")
    }

    fn insert_attempt(&self, attempt: &NewAttempt) -> Result<String> {
        self.check_online("insert")?;
        let mut state = self.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        let id = format!("mem-{}", seq);
        state.attempts.push(StoredAttempt {
            record: AttemptRecord {
                id: id.clone(),
                subject_id: attempt.subject_id.clone(),
                method: attempt.method.clone(),
                status: AttemptStatus::Pending.to_string(),
                error: None,
                session_id: Some(attempt.session_id.clone()),
                created_at: Some(Utc::now()),
            },
            seq,
            hidden_for: self.visibility_lag,
        });
        Ok(id)
    }

    fn update_attempt_status(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.check_online("update")?;
        let forced = self
            .forced_status
            .lock()
            .ok()
            .and_then(|f| f.clone());
        let mut state = self.lock();
        let stored = state
            .attempts
            .iter_mut()
            .find(|a| a.record.id == attempt_id)
            .ok_or_else(|| {
                McpCheckError::store("update", format!("no attempt with id {}", attempt_id))
            })?;
        stored.record.status = forced.unwrap_or_else(|| status.to_string());
        stored.record.error = error.map(str::to_string);
        Ok(())
    }

    fn query_latest_attempt(&self, subject_id: &str) -> Result<Option<AttemptRecord>> {
        self.check_online("query")?;
        let mut state = self.lock();
        let latest = state
            .attempts
            .iter()
            .filter(|a| a.record.subject_id == subject_id && a.hidden_for == 0)
            .max_by_key(|a| a.seq)
            .map(|a| a.record.clone());
        for stored in state
            .attempts
            .iter_mut()
            .filter(|a| a.record.subject_id == subject_id && a.hidden_for > 0)
        {
            stored.hidden_for -= 1;
        }
        Ok(latest)
    }

    fn delete_attempts(&self, subject_id: &str) -> Result<usize> {
        self.check_online("delete")?;
        let mut state = self.lock();
        let before = state.attempts.len();
        state.attempts.retain(|a| a.record.subject_id != subject_id);
        Ok(before - state.attempts.len())
    }

    fn read(&self, query: &StoreQuery) -> Result<Vec<Value>> {
        self.check_online("read")?;
        let state = self.lock();
        let mut rows: Vec<Value> = if query.table == self.attempts_table {
            state
                .attempts
                .iter()
                .filter(|a| a.hidden_for == 0)
                .map(|a| serde_json::to_value(&a.record))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| McpCheckError::store("read", e.to_string()))?
        } else if query.table == self.subjects_table {
            state.subjects.clone()
        } else {
            return Err(McpCheckError::store(
                "read",
                format!("unknown table {}", query.table),
            ));
        };

        rows.retain(|row| {
            query.filters.iter().all(|(column, expected)| match row.get(column) {
                Some(Value::String(s)) => s == expected,
                Some(other) => other.to_string() == *expected,
                None => false,
            })
        });
        if let Some((column, desc)) = &query.order {
            rows.sort_by(|a, b| {
                let ka = a.get(column).map(Value::to_string).unwrap_or_default();
                let kb = b.get(column).map(Value::to_string).unwrap_or_default();
                if *desc {
                    kb.cmp(&ka)
                } else {
                    ka.cmp(&kb)
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::PlatformInfo;
    use serde_json::json;

    fn attempt(subject: &str) -> NewAttempt {
        NewAttempt {
            subject_id: subject.to_string(),
            method: "npx".to_string(),
            platform: PlatformInfo::current(),
            session_id: "s1".to_string(),
        }
    }

    #[test]
    fn insert_then_query_latest() {
        let store = MemoryStore::new();
        let first = store.insert_attempt(&attempt("a")).unwrap();
        let second = store.insert_attempt(&attempt("a")).unwrap();
        assert_ne!(first, second);
        store
            .update_attempt_status(&second, AttemptStatus::Success, None)
            .unwrap();
        let latest = store.query_latest_attempt("a").unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.status, "success");
    }

    #[test]
    fn visibility_lag_hides_new_records() {
        let store = MemoryStore::new().with_visibility_lag(2);
        store.insert_attempt(&attempt("a")).unwrap();
        assert!(store.query_latest_attempt("a").unwrap().is_none());
        assert!(store.query_latest_attempt("a").unwrap().is_none());
        assert!(store.query_latest_attempt("a").unwrap().is_some());
    }

    #[test]
    fn delete_counts_removed_rows_and_is_repeatable() {
        let store = MemoryStore::new();
        store.insert_attempt(&attempt("a")).unwrap();
        store.insert_attempt(&attempt("a")).unwrap();
        store.insert_attempt(&attempt("b")).unwrap();
        assert_eq!(store.delete_attempts("a").unwrap(), 2);
        assert_eq!(store.delete_attempts("a").unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn offline_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.ping().is_err());
        assert!(store.insert_attempt(&attempt("a")).is_err());
        assert!(store.query_latest_attempt("a").is_err());
        store.set_offline(false);
        assert!(store.ping().is_ok());
    }

    #[test]
    fn forced_status_overrides_updates() {
        let store = MemoryStore::new();
        store.force_status(Some("archived"));
        let id = store.insert_attempt(&attempt("a")).unwrap();
        store
            .update_attempt_status(&id, AttemptStatus::Success, None)
            .unwrap();
        assert_eq!(store.query_latest_attempt("a").unwrap().unwrap().status, "archived");
    }

    #[test]
    fn update_unknown_id_is_error() {
        let store = MemoryStore::new();
        assert!(store
            .update_attempt_status("nope", AttemptStatus::Failed, Some("x"))
            .is_err());
    }

    #[test]
    fn read_filters_and_limits() {
        let store = MemoryStore::new().with_subjects(vec![
            json!({"id": "a", "name": "A"}),
            json!({"id": "b", "name": "B"}),
        ]);
        let rows = store
            .read(&StoreQuery::table("mcp_servers").eq("id", "b"))
            .unwrap();
        assert_eq!(rows, vec![json!({"id": "b", "name": "B"})]);

        store.insert_attempt(&attempt("a")).unwrap();
        store.insert_attempt(&attempt("a")).unwrap();
        let rows = store
            .read(&StoreQuery::table("install_attempts").limit(1))
            .unwrap();
        assert_eq!(rows.len(), 1);

        assert!(store.read(&StoreQuery::table("other")).is_err());
    }
}
