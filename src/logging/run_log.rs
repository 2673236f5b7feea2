//! Structured run log.
//!
//! Every executor receives a `&RunLog` and writes through it. Entries are
//! buffered and appended to `run-<session>.log` every `flush_every`
//! entries and on [`RunLog::finish`]; each entry is also mirrored to
//! `tracing` so `--debug` output and the file tell the same story.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Emitting component, e.g. `install` or `scheduler`.
    pub component: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<5} [{}] {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.level,
            self.component,
            self.message
        )
    }
}

#[derive(Debug)]
enum Sink {
    File(PathBuf),
    Memory,
}

#[derive(Debug)]
struct Inner {
    pending: Vec<LogEntry>,
    kept: Vec<LogEntry>,
    written: usize,
}

/// Buffered structured logger passed by reference into every component.
#[derive(Debug)]
pub struct RunLog {
    sink: Sink,
    flush_every: usize,
    inner: Mutex<Inner>,
}

impl RunLog {
    /// Log appending to `path`, flushed every `flush_every` entries.
    pub fn to_file(path: impl Into<PathBuf>, flush_every: usize) -> Self {
        Self::with_sink(Sink::File(path.into()), flush_every)
    }

    /// Log that keeps every entry in memory.
    pub fn in_memory() -> Self {
        Self::with_sink(Sink::Memory, usize::MAX)
    }

    fn with_sink(sink: Sink, flush_every: usize) -> Self {
        Self {
            sink,
            flush_every: flush_every.max(1),
            inner: Mutex::new(Inner {
                pending: Vec::new(),
                kept: Vec::new(),
                written: 0,
            }),
        }
    }

    /// File the log is written to, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File(path) => Some(path),
            Sink::Memory => None,
        }
    }

    pub fn debug(&self, component: &str, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, component, message.as_ref());
    }

    pub fn info(&self, component: &str, message: impl AsRef<str>) {
        self.log(LogLevel::Info, component, message.as_ref());
    }

    pub fn warn(&self, component: &str, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, component, message.as_ref());
    }

    pub fn error(&self, component: &str, message: impl AsRef<str>) {
        self.log(LogLevel::Error, component, message.as_ref());
    }

    /// Record one entry.
    pub fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(component = component, "{}", message),
            LogLevel::Info => tracing::info!(component = component, "{}", message),
            LogLevel::Warn => tracing::warn!(component = component, "{}", message),
            LogLevel::Error => tracing::error!(component = component, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message: message.to_string(),
        };

        let mut inner = self.lock();
        match self.sink {
            Sink::Memory => inner.kept.push(entry),
            Sink::File(_) => {
                inner.pending.push(entry);
                if inner.pending.len() >= self.flush_every {
                    if let Err(e) = self.write_pending(&mut inner) {
                        tracing::warn!("Run log flush failed: {:#}", e);
                    }
                }
            }
        }
    }

    /// Write buffered entries now.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        self.write_pending(&mut inner)
    }

    /// Final flush at session end.
    pub fn finish(&self) -> Result<()> {
        self.flush()
    }

    /// Entries held in memory (in-memory logs only).
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().kept.clone()
    }

    /// Entries written to disk so far.
    pub fn written(&self) -> usize {
        self.lock().written
    }

    fn write_pending(&self, inner: &mut Inner) -> Result<()> {
        let Sink::File(path) = &self.sink else {
            return Ok(());
        };
        if inner.pending.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {:?}", parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open run log {:?}", path))?;
        let mut text = String::new();
        for entry in &inner.pending {
            text.push_str(&entry.to_string());
            text.push('\n');
        }
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to write run log {:?}", path))?;
        inner.written += inner.pending.len();
        inner.pending.clear();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
