//! Pending network operations and the durable queue snapshot.
//!
//! Operations that cannot run synchronously (offline, or explicitly
//! deferred) are queued here and replayed when connectivity returns.
//! Only pending entries are persisted: anything mid-flight at shutdown
//! simply shows up as pending again on resume (at-least-once delivery).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two kinds of queueable operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Transcription,
    Rewrite,
}

/// A transcription request waiting for connectivity.
///
/// The audio payload is not carried here; it is read from the audio
/// partition by note id when the queue drains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTranscription {
    pub note_id: Uuid,

    /// Language hint; `None` or "auto" lets the service detect
    pub language: Option<String>,

    /// When the operation was queued
    pub queued_at: DateTime<Utc>,
}

impl PendingTranscription {
    pub fn new(note_id: Uuid, language: Option<String>) -> Self {
        Self {
            note_id,
            language,
            queued_at: Utc::now(),
        }
    }
}

/// A rewrite request waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRewrite {
    pub note_id: Uuid,

    /// Text to rewrite (usually the note's transcript)
    pub text: String,

    /// Rewrite instruction
    pub prompt: String,

    /// When the operation was queued
    pub queued_at: DateTime<Utc>,
}

impl PendingRewrite {
    pub fn new(note_id: Uuid, text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            note_id,
            text: text.into(),
            prompt: prompt.into(),
            queued_at: Utc::now(),
        }
    }
}

/// Whole-queue snapshot persisted through the state bridge.
///
/// Two independent FIFO lists: ordering is guaranteed within a kind,
/// not across kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub transcriptions: Vec<PendingTranscription>,

    #[serde(default)]
    pub rewrites: Vec<PendingRewrite>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.transcriptions.len() + self.rewrites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcriptions.is_empty() && self.rewrites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = QueueSnapshot {
            transcriptions: vec![PendingTranscription::new(Uuid::new_v4(), Some("en".into()))],
            rewrites: vec![PendingRewrite::new(Uuid::new_v4(), "text", "make it formal")],
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: QueueSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_snapshot_tolerates_missing_lists() {
        // A snapshot written before rewrites existed still loads
        let parsed: QueueSnapshot = serde_json::from_str(r#"{"transcriptions":[]}"#).unwrap();
        assert!(parsed.is_empty());
    }
}
