//! Session ID generation and parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A unique test session identifier.
///
/// Format: `run_{timestamp_ms}_{hex}`. The suffix is derived from the
/// clock, the process id and a per-process counter, so two sessions
/// started in the same millisecond still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    timestamp: DateTime<Utc>,
    suffix: [u8; 6],
}

impl SessionId {
    /// Generate a new session ID.
    pub fn new() -> Self {
        let now = Utc::now();
        // Truncate to milliseconds for consistent serialization
        let timestamp = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);

        let mut hasher = Sha256::new();
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        let digest = hasher.finalize();

        let mut suffix = [0u8; 6];
        suffix.copy_from_slice(&digest[..6]);
        Self { timestamp, suffix }
    }

    /// Get the session timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> String {
        self.to_string()
    }

    /// Parse a session ID from a string.
    pub fn parse(s: &str) -> Option<Self> {
        let (millis, hex_part) = s.strip_prefix("run_")?.split_once('_')?;
        let timestamp = DateTime::from_timestamp_millis(millis.parse().ok()?)?;
        let bytes = hex::decode(hex_part).ok()?;
        let suffix: [u8; 6] = bytes.try_into().ok()?;
        Some(Self { timestamp, suffix })
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_{}_{}",
            self.timestamp.timestamp_millis(),
            hex::encode(self.suffix)
        )
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SessionId::parse(&s).ok_or_else(|| serde::de::Error::custom("Invalid session ID format"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_within_a_process() {
        let ids: Vec<SessionId> = (0..50).map(|_| SessionId::new()).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_and_parse_agree() {
        let id = SessionId::new();
        let s = id.to_string();
        assert!(s.starts_with("run_"));
        assert_eq!(SessionId::parse(&s), Some(id));
    }

    #[test]
    fn timestamp_is_recent() {
        let id = SessionId::new();
        let age = Utc::now().signed_duration_since(id.timestamp());
        assert!(age.num_seconds() < 2);
    }

    #[test]
    fn serializes_as_string() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with("\"run_"));
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(SessionId::parse("invalid").is_none());
        assert!(SessionId::parse("run_").is_none());
        assert!(SessionId::parse("run_123").is_none());
        assert!(SessionId::parse("run_abc_00112233aabb").is_none());
        assert!(SessionId::parse("run_123_0011").is_none());
    }
}
