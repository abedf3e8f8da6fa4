//! Note records and payloads.
//!
//! A note is split across three storage partitions joined by its id:
//! the metadata record (this module's `NoteRecord`), the audio payload,
//! and an optional photo payload. The record deliberately has no payload
//! fields, so metadata can never embed binary data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Metadata for a single note. Persisted as JSON in the metadata partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Unique note identifier (join key across partitions)
    pub id: Uuid,

    /// Short generated title
    pub title: String,

    /// Short generated description
    pub description: String,

    /// Full transcript text (empty until transcription completes)
    pub transcript: String,

    /// Rewritten transcript, if a rewrite has been applied
    pub rewritten: Option<String>,

    /// Source language tag ("auto" lets the service detect)
    pub language: String,

    /// Recording duration in seconds
    pub duration_seconds: f64,

    /// When the note was created
    pub created_at: DateTime<Utc>,

    /// When the note was last modified
    pub updated_at: DateTime<Utc>,

    /// Keyword strings attached to the note
    pub keywords: Vec<String>,

    /// Checksum of the audio payload at last write (first 16 hex chars of SHA256)
    pub audio_checksum: String,
}

impl NoteRecord {
    /// Refresh the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the note still carries its capture-time placeholder title
    pub fn has_placeholder_title(&self) -> bool {
        self.title.is_empty()
    }
}

/// A complete note: metadata plus binary payloads.
///
/// Only assembled in memory; the payloads are stored in their own
/// partitions and never serialized alongside the record.
#[derive(Debug, Clone)]
pub struct Note {
    pub record: NoteRecord,
    pub audio: Vec<u8>,
    pub photo: Option<Vec<u8>>,
}

impl Note {
    /// Create a new note from a captured recording
    pub fn new(
        title: impl Into<String>,
        language: impl Into<String>,
        duration_seconds: f64,
        audio: Vec<u8>,
        photo: Option<Vec<u8>>,
    ) -> Self {
        let now = Utc::now();
        let checksum = audio_checksum(&audio);

        Self {
            record: NoteRecord {
                id: Uuid::new_v4(),
                title: title.into(),
                description: String::new(),
                transcript: String::new(),
                rewritten: None,
                language: language.into(),
                duration_seconds,
                created_at: now,
                updated_at: now,
                keywords: Vec::new(),
                audio_checksum: checksum,
            },
            audio,
            photo,
        }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }
}

/// Checksum of an audio payload (first 16 hex chars of SHA256)
pub fn audio_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
