//! The partitioned note store.
//!
//! Metadata, audio, and photo live in three independent partitions
//! joined by note id. A note is complete iff its audio entry exists;
//! the photo entry is optional. Write sequences put payloads down
//! before metadata, so a crash mid-sequence leaves at most an orphaned
//! payload (cleanable) and never a metadata entry whose audio is gone.

use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{audio_checksum, Note, NoteRecord};

use super::partition::Partition;
use super::quota::{CleanupReport, QuotaGovernor, SpaceReclaimer, StorageQuotaStatus};
use super::StoreError;

/// An integrity anomaly reported by [`NoteStore::validate_integrity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Audio entry with no metadata record
    OrphanedAudio(Uuid),

    /// Photo entry with no metadata record
    OrphanedPhoto(Uuid),

    /// Metadata record whose audio entry is gone. A corruption to be
    /// surfaced, never auto-cleaned.
    MissingAudio(Uuid),
}

/// Three-partition durable note store with quota admission
pub struct NoteStore {
    metadata: Partition,
    audio: Partition,
    photo: Partition,
    quota: QuotaGovernor,
}

impl NoteStore {
    /// Open (or create) the store under `home/notes`
    pub async fn open(home: &Path) -> Result<Self, StoreError> {
        let root = home.join("notes");
        let store = Self {
            metadata: Partition::new(root.join("metadata"), "json"),
            audio: Partition::new(root.join("audio"), "bin"),
            photo: Partition::new(root.join("photo"), "bin"),
            quota: QuotaGovernor::new(root.clone()),
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Open with an injected quota governor (tests)
    pub async fn open_with_governor(
        home: &Path,
        quota: QuotaGovernor,
    ) -> Result<Self, StoreError> {
        let root = home.join("notes");
        let store = Self {
            metadata: Partition::new(root.join("metadata"), "json"),
            audio: Partition::new(root.join("audio"), "bin"),
            photo: Partition::new(root.join("photo"), "bin"),
            quota,
        };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        self.metadata.initialize().await?;
        self.audio.initialize().await?;
        self.photo.initialize().await?;
        Ok(())
    }

    /// Durably create a note.
    ///
    /// Runs quota admission first (with one automatic cleanup pass on
    /// denial), then writes audio, photo, and finally the metadata
    /// record.
    pub async fn create(&self, note: &Note) -> Result<(), StoreError> {
        let estimated = self.quota.estimate_size(note);
        let decision = self.quota.admit_with_cleanup(estimated, self).await;
        if !decision.admitted {
            return Err(StoreError::StorageFull {
                estimated_bytes: estimated,
            });
        }

        let id = note.id();
        self.audio.write(id, &note.audio).await?;
        if let Some(photo) = &note.photo {
            self.photo.write(id, photo).await?;
        }

        let mut record = note.record.clone();
        record.audio_checksum = audio_checksum(&note.audio);
        self.write_record(&record).await?;

        tracing::info!(note_id = %id, "note created");
        Ok(())
    }

    /// Load a complete note. `Corrupt` if metadata exists but the audio
    /// entry is missing: a note without audio has no content.
    pub async fn retrieve(&self, id: Uuid) -> Result<Note, StoreError> {
        let record = self.get_record(id).await?;

        let audio = self
            .audio
            .read(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                id,
                reason: "metadata exists but audio entry is missing".to_string(),
            })?;

        // A checksum mismatch can be a legal crash window between the
        // audio and metadata writes of an update, so it is not a hard
        // error.
        if record.audio_checksum != audio_checksum(&audio) {
            tracing::warn!(note_id = %id, "audio checksum does not match metadata");
        }

        let photo = self.photo.read(id).await?;

        Ok(Note {
            record,
            audio,
            photo,
        })
    }

    /// Load just the metadata record
    pub async fn get_record(&self, id: Uuid) -> Result<NoteRecord, StoreError> {
        let bytes = self
            .metadata
            .read(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read only the audio payload (used by the queue drain)
    pub async fn read_audio(&self, id: Uuid) -> Result<Option<Vec<u8>>, StoreError> {
        self.audio.read(id).await
    }

    /// Partial update: payloads passed as `None` are left untouched,
    /// never deleted. The metadata record is rewritten with a refreshed
    /// update timestamp.
    pub async fn update(
        &self,
        record: &NoteRecord,
        new_audio: Option<&[u8]>,
        new_photo: Option<&[u8]>,
    ) -> Result<NoteRecord, StoreError> {
        // The note must already exist
        let _existing = self.get_record(record.id).await?;

        if new_audio.is_some() || new_photo.is_some() {
            let payload_bytes =
                new_audio.map_or(0, |a| a.len() as u64) + new_photo.map_or(0, |p| p.len() as u64);
            let decision = self.quota.admit_with_cleanup(payload_bytes, self).await;
            if !decision.admitted {
                return Err(StoreError::StorageFull {
                    estimated_bytes: payload_bytes,
                });
            }
        }

        let mut updated = record.clone();
        if let Some(audio) = new_audio {
            self.audio.write(record.id, audio).await?;
            updated.audio_checksum = audio_checksum(audio);
        }
        if let Some(photo) = new_photo {
            self.photo.write(record.id, photo).await?;
        }

        updated.touch();
        self.write_record(&updated).await?;

        tracing::debug!(note_id = %record.id, "note updated");
        Ok(updated)
    }

    /// Remove a note from all three partitions. Idempotent: deleting an
    /// id that does not exist is not an error.
    ///
    /// Metadata goes first so an interrupted delete leaves orphaned
    /// payloads (cleanable) rather than a metadata record whose audio
    /// is gone.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.metadata.remove(id).await?;
        self.audio.remove(id).await?;
        self.photo.remove(id).await?;

        tracing::info!(note_id = %id, "note deleted");
        Ok(())
    }

    /// All complete notes, newest first.
    ///
    /// Entries that fail to join with their audio are skipped with a
    /// warning rather than failing the whole listing; `verify` surfaces
    /// them explicitly.
    pub async fn list_all(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes = Vec::new();

        for id in self.metadata.keys().await? {
            match self.retrieve(id).await {
                Ok(note) => notes.push(note),
                Err(StoreError::Corrupt { id, reason }) => {
                    tracing::warn!(note_id = %id, %reason, "skipping corrupt note");
                }
                Err(e) => return Err(e),
            }
        }

        notes.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        Ok(notes)
    }

    /// All metadata records, newest first (no payload reads)
    pub async fn list_records(&self) -> Result<Vec<NoteRecord>, StoreError> {
        let mut records = Vec::new();
        for id in self.metadata.keys().await? {
            match self.get_record(id).await {
                Ok(record) => records.push(record),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Read-only diagnostic: symmetric difference of the partition key
    /// sets.
    pub async fn validate_integrity(&self) -> Result<Vec<Anomaly>, StoreError> {
        let metadata_keys = self.metadata.keys().await?;
        let audio_keys = self.audio.keys().await?;
        let photo_keys = self.photo.keys().await?;

        let mut anomalies = Vec::new();

        for id in &audio_keys {
            if !metadata_keys.contains(id) {
                anomalies.push(Anomaly::OrphanedAudio(*id));
            }
        }
        for id in &photo_keys {
            if !metadata_keys.contains(id) {
                anomalies.push(Anomaly::OrphanedPhoto(*id));
            }
        }
        for id in &metadata_keys {
            if !audio_keys.contains(id) {
                anomalies.push(Anomaly::MissingAudio(*id));
            }
        }

        Ok(anomalies)
    }

    /// Delete every orphaned payload entry. Metadata-missing-audio
    /// entries are left alone: those are surfaced, not cleaned.
    pub async fn cleanup_orphans(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let anomalies = match self.validate_integrity().await {
            Ok(anomalies) => anomalies,
            Err(e) => {
                report.errors.push(format!("integrity scan failed: {e}"));
                return report;
            }
        };

        for anomaly in anomalies {
            let (partition, id) = match anomaly {
                Anomaly::OrphanedAudio(id) => (&self.audio, id),
                Anomaly::OrphanedPhoto(id) => (&self.photo, id),
                Anomaly::MissingAudio(_) => continue,
            };

            match partition.remove(id).await {
                Ok(Some(bytes)) => {
                    report.removed += 1;
                    report.bytes_freed += bytes;
                }
                Ok(None) => {}
                Err(e) => report.errors.push(format!("failed to remove {id}: {e}")),
            }
        }

        if report.removed > 0 {
            tracing::info!(
                removed = report.removed,
                bytes_freed = report.bytes_freed,
                "orphan cleanup finished"
            );
        }
        report
    }

    /// Current device quota status
    pub fn quota_status(&self) -> StorageQuotaStatus {
        self.quota.status()
    }

    /// Direct access to a partition (tests and diagnostics)
    #[doc(hidden)]
    pub fn audio_partition(&self) -> &Partition {
        &self.audio
    }

    #[doc(hidden)]
    pub fn photo_partition(&self) -> &Partition {
        &self.photo
    }

    #[doc(hidden)]
    pub fn metadata_partition(&self) -> &Partition {
        &self.metadata
    }

    async fn write_record(&self, record: &NoteRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.metadata.write(record.id, &bytes).await
    }
}

#[async_trait]
impl SpaceReclaimer for NoteStore {
    async fn reclaim(&self) -> CleanupReport {
        self.cleanup_orphans().await
    }
}
