//! Quota Governor Integration Tests
//!
//! Admission control wired through the note store, with a scripted
//! storage probe standing in for the device.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use murmur::domain::Note;
use murmur::storage::{DiskUsage, QuotaGovernor, StorageProbe, StoreError};
use murmur::NoteStore;
use tempfile::TempDir;
use uuid::Uuid;

const MB: u64 = 1024 * 1024;

/// Probe that returns a scripted sequence of usage readings, repeating
/// the last one once the script runs out
struct ScriptedProbe {
    readings: Mutex<Vec<Option<DiskUsage>>>,
}

impl ScriptedProbe {
    fn new(readings: Vec<Option<DiskUsage>>) -> Self {
        Self {
            readings: Mutex::new(readings),
        }
    }
}

impl StorageProbe for ScriptedProbe {
    fn usage(&self, _path: &Path) -> Option<DiskUsage> {
        let mut readings = self.readings.lock().unwrap();
        if readings.len() > 1 {
            readings.remove(0)
        } else {
            readings.first().copied().flatten()
        }
    }
}

async fn store_with_probe(temp: &TempDir, readings: Vec<Option<DiskUsage>>) -> NoteStore {
    let governor = QuotaGovernor::with_probe(
        PathBuf::from(temp.path()),
        Box::new(ScriptedProbe::new(readings)),
    );
    NoteStore::open_with_governor(temp.path(), governor)
        .await
        .unwrap()
}

fn large_note(bytes: usize) -> Note {
    Note::new("big", "en", 60.0, vec![0u8; bytes], None)
}

#[tokio::test]
async fn test_create_fails_when_over_quota_with_nothing_to_clean() {
    let temp = TempDir::new().unwrap();
    let store = store_with_probe(
        &temp,
        vec![Some(DiskUsage {
            used: 990 * MB,
            quota: 1000 * MB,
        })],
    )
    .await;

    let err = store.create(&large_note(50 * MB as usize)).await.unwrap_err();
    assert!(matches!(err, StoreError::StorageFull { .. }));

    // The denied write left nothing behind
    assert!(store.validate_integrity().await.unwrap().is_empty());
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_pass_unblocks_admission() {
    let temp = TempDir::new().unwrap();

    // First reading denies (990/1000); the post-cleanup reading has
    // 60 MB back (930/1000), so the 50 MB write fits
    let store = store_with_probe(
        &temp,
        vec![
            Some(DiskUsage {
                used: 990 * MB,
                quota: 1000 * MB,
            }),
            Some(DiskUsage {
                used: 930 * MB,
                quota: 1000 * MB,
            }),
        ],
    )
    .await;

    // Seed an orphan for the cleanup pass to reclaim
    let orphan = Uuid::new_v4();
    store
        .audio_partition()
        .write(orphan, &vec![1u8; 4096])
        .await
        .unwrap();

    store.create(&large_note(50 * MB as usize)).await.unwrap();

    // The orphan is gone and the note landed
    assert!(!store.audio_partition().exists(orphan).await);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_admission_fails_open_without_probe() {
    let temp = TempDir::new().unwrap();
    let store = store_with_probe(&temp, vec![None]).await;

    // Best-effort admission: no probe means the write is admitted
    store.create(&large_note(1024)).await.unwrap();

    let status = store.quota_status();
    assert_eq!(status.used_bytes, 0);
    assert!(!status.is_near_limit);
    assert!(!status.is_at_limit);
}

#[tokio::test]
async fn test_status_reflects_thresholds() {
    let temp = TempDir::new().unwrap();
    let store = store_with_probe(
        &temp,
        vec![Some(DiskUsage {
            used: 820 * MB,
            quota: 1000 * MB,
        })],
    )
    .await;

    let status = store.quota_status();
    assert!(status.is_near_limit);
    assert!(!status.is_at_limit);
    assert_eq!(status.available_bytes, 180 * MB);
    assert!((status.percent_used - 82.0).abs() < 0.01);
}
