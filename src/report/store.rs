//! Session report storage.
//!
//! A report directory holds, per session, `session-<id>.json` (the full
//! record), `summary-<id>.md` (the human summary) and `run-<id>.log`
//! (the run log, written by [`crate::logging::RunLog`]).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::render::render_markdown;
use crate::session::{SessionId, TestSession};

/// Files written for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub session: PathBuf,
    pub summary: PathBuf,
}

/// Storage for session reports.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create report directory at {:?}", self.dir))
    }

    fn session_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("session-{}.json", id))
    }

    fn summary_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("summary-{}.md", id))
    }

    /// Where the run log for a session goes.
    pub fn log_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("run-{}.log", id))
    }

    /// Write the session record and its summary.
    pub fn save(&self, session: &TestSession) -> Result<SavedReport> {
        self.ensure_dir()?;
        let session_path = self.session_path(&session.id);
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&session_path, json)
            .with_context(|| format!("Failed to write session to {:?}", session_path))?;

        let summary_path = self.summary_path(&session.id);
        fs::write(&summary_path, render_markdown(session))
            .with_context(|| format!("Failed to write summary to {:?}", summary_path))?;

        Ok(SavedReport {
            session: session_path,
            summary: summary_path,
        })
    }

    /// Load a session by ID.
    pub fn load(&self, id: &SessionId) -> Result<TestSession> {
        let path = self.session_path(id);
        let json =
            fs::read_to_string(&path).with_context(|| format!("Session not found: {:?}", path))?;
        serde_json::from_str(&json).context("Failed to parse session")
    }

    /// Get the most recent session.
    pub fn latest(&self) -> Result<Option<TestSession>> {
        Ok(self.list(1)?.into_iter().next())
    }

    /// IDs of stored sessions, newest first.
    pub fn ids(&self) -> Result<Vec<SessionId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read report directory {:?}", self.dir))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(id) = name
                .strip_prefix("session-")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(SessionId::parse)
            {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(ids)
    }

    /// Load up to `limit` recent sessions, skipping unreadable files.
    pub fn list(&self, limit: usize) -> Result<Vec<TestSession>> {
        let mut sessions = Vec::new();
        for id in self.ids()? {
            if sessions.len() >= limit {
                break;
            }
            if let Ok(session) = self.load(&id) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::shell::PlatformInfo;
    use tempfile::TempDir;

    fn finished() -> TestSession {
        let mut session = TestSession::new(
            SessionId::new(),
            HarnessConfig::default(),
            PlatformInfo::current(),
        );
        session.finalize();
        session
    }

    #[test]
    fn save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = ReportStore::new(temp.path().join("reports"));
        let session = finished();

        let saved = store.save(&session).unwrap();
        assert!(saved.session.exists());
        let summary = fs::read_to_string(&saved.summary).unwrap();
        assert!(summary.contains("NOT_READY"));

        let loaded = store.load(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[test]
    fn latest_is_newest() {
        let temp = TempDir::new().unwrap();
        let store = ReportStore::new(temp.path());

        let first = finished();
        store.save(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = finished();
        store.save(&second).unwrap();

        assert_eq!(store.latest().unwrap().unwrap().id, second.id);
        assert_eq!(store.ids().unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = ReportStore::new(temp.path().join("nothing"));
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn unknown_session_is_error() {
        let temp = TempDir::new().unwrap();
        let store = ReportStore::new(temp.path());
        assert!(store.load(&SessionId::new()).is_err());
    }

    #[test]
    fn other_files_are_ignored() {
        let temp = TempDir::new().unwrap();
        let store = ReportStore::new(temp.path());
        fs::write(temp.path().join("notes.json"), "{}").unwrap();
        fs::write(temp.path().join("session-bogus.json"), "{}").unwrap();
        assert!(store.ids().unwrap().is_empty());
    }
}
