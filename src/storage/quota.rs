//! Storage quota governor: admission control before expensive writes.
//!
//! Partial writes under "disk full" are the worst failure mode for the
//! partitioned store (they create exactly the orphan states integrity
//! checking exists to catch), so every multi-partition write is admitted
//! against the device quota first. Admission is best-effort: if the
//! platform cannot report usage, the governor fails open.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::Note;

/// Near-limit warning threshold, percent of device quota
pub const NEAR_LIMIT_PERCENT: f64 = 80.0;

/// At-limit threshold, percent of device quota
pub const AT_LIMIT_PERCENT: f64 = 95.0;

/// Rough audio size estimate when the payload is not yet known
const BYTES_PER_MINUTE_ESTIMATE: u64 = 1024 * 1024;

/// Device storage usage as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub used: u64,
    pub quota: u64,
}

/// Source of device storage statistics. Injectable so tests can script
/// exact usage numbers.
pub trait StorageProbe: Send + Sync {
    /// Current usage for the filesystem containing `path`; `None` when
    /// the platform cannot report it.
    fn usage(&self, path: &Path) -> Option<DiskUsage>;
}

/// Probe backed by the real filesystem
#[derive(Debug, Default)]
pub struct FsProbe;

impl StorageProbe for FsProbe {
    fn usage(&self, path: &Path) -> Option<DiskUsage> {
        let quota = fs2::total_space(path).ok()?;
        let available = fs2::available_space(path).ok()?;
        Some(DiskUsage {
            used: quota.saturating_sub(available),
            quota,
        })
    }
}

/// Derived quota status, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct StorageQuotaStatus {
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent_used: f64,
    pub is_near_limit: bool,
    pub is_at_limit: bool,
}

impl StorageQuotaStatus {
    fn unavailable() -> Self {
        Self {
            used_bytes: 0,
            available_bytes: 0,
            percent_used: 0.0,
            is_near_limit: false,
            is_at_limit: false,
        }
    }
}

/// Report from an automatic cleanup pass
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Entries removed
    pub removed: usize,

    /// Bytes reclaimed
    pub bytes_freed: u64,

    /// Non-fatal errors hit during cleanup (never abort the pass)
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn merge(&mut self, other: CleanupReport) {
        self.removed += other.removed;
        self.bytes_freed += other.bytes_freed;
        self.errors.extend(other.errors);
    }
}

/// Outcome of an admission check, including any cleanup that ran
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub admitted: bool,
    pub cleanup: Option<CleanupReport>,
}

/// Something that can free local space on demand (orphan cleanup)
#[async_trait]
pub trait SpaceReclaimer {
    async fn reclaim(&self) -> CleanupReport;
}

/// Pre-write admission control against the device quota
pub struct QuotaGovernor {
    root: PathBuf,
    probe: Box<dyn StorageProbe>,
}

impl QuotaGovernor {
    /// Governor for the filesystem containing `root`
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            probe: Box::new(FsProbe),
        }
    }

    /// Governor with a scripted probe (tests)
    pub fn with_probe(root: PathBuf, probe: Box<dyn StorageProbe>) -> Self {
        Self { root, probe }
    }

    /// Estimate the durable size of a note: UTF-16-equivalent text bytes
    /// plus payload sizes. Falls back to a duration-based audio estimate
    /// (~1 MiB/minute) when the payload is not yet captured.
    pub fn estimate_size(&self, note: &Note) -> u64 {
        let record = &note.record;

        let mut text_units: usize = 0;
        for field in [
            &record.title,
            &record.description,
            &record.transcript,
            &record.language,
        ] {
            text_units += field.chars().map(char::len_utf16).sum::<usize>();
        }
        if let Some(rewritten) = &record.rewritten {
            text_units += rewritten.chars().map(char::len_utf16).sum::<usize>();
        }
        for keyword in &record.keywords {
            text_units += keyword.chars().map(char::len_utf16).sum::<usize>();
        }

        let audio_bytes = if note.audio.is_empty() {
            let minutes = (record.duration_seconds / 60.0).max(0.0);
            (minutes * BYTES_PER_MINUTE_ESTIMATE as f64).ceil() as u64
        } else {
            note.audio.len() as u64
        };

        let photo_bytes = note.photo.as_ref().map_or(0, |p| p.len() as u64);

        (text_units as u64) * 2 + audio_bytes + photo_bytes
    }

    /// Would `used + estimated_bytes` stay under the device quota?
    /// Fails open when the probe cannot report usage.
    pub fn check_admission(&self, estimated_bytes: u64) -> bool {
        match self.probe.usage(&self.root) {
            Some(usage) => usage.used.saturating_add(estimated_bytes) < usage.quota,
            None => {
                tracing::debug!("storage probe unavailable, admitting write");
                true
            }
        }
    }

    /// Admission with one automatic cleanup pass on denial.
    ///
    /// Cleanup errors are carried in the report; they never abort the
    /// re-check.
    pub async fn admit_with_cleanup(
        &self,
        estimated_bytes: u64,
        reclaimer: &dyn SpaceReclaimer,
    ) -> AdmissionDecision {
        if self.check_admission(estimated_bytes) {
            return AdmissionDecision {
                admitted: true,
                cleanup: None,
            };
        }

        tracing::info!(
            estimated_bytes,
            "admission denied, running automatic cleanup"
        );
        let report = reclaimer.reclaim().await;
        tracing::info!(
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            "cleanup pass finished"
        );

        AdmissionDecision {
            admitted: self.check_admission(estimated_bytes),
            cleanup: Some(report),
        }
    }

    /// Read-only quota status; zero values when the probe is unavailable
    pub fn status(&self) -> StorageQuotaStatus {
        let Some(usage) = self.probe.usage(&self.root) else {
            return StorageQuotaStatus::unavailable();
        };

        if usage.quota == 0 {
            return StorageQuotaStatus::unavailable();
        }

        let percent_used = usage.used as f64 / usage.quota as f64 * 100.0;
        StorageQuotaStatus {
            used_bytes: usage.used,
            available_bytes: usage.quota.saturating_sub(usage.used),
            percent_used,
            is_near_limit: percent_used >= NEAR_LIMIT_PERCENT,
            is_at_limit: percent_used >= AT_LIMIT_PERCENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Note;
    use std::sync::Mutex;

    /// Probe returning a scripted sequence of usage values
    pub(crate) struct ScriptedProbe {
        values: Mutex<Vec<Option<DiskUsage>>>,
    }

    impl ScriptedProbe {
        pub(crate) fn new(values: Vec<Option<DiskUsage>>) -> Self {
            Self {
                values: Mutex::new(values),
            }
        }
    }

    impl StorageProbe for ScriptedProbe {
        fn usage(&self, _path: &Path) -> Option<DiskUsage> {
            let mut values = self.values.lock().unwrap();
            if values.len() > 1 {
                values.remove(0)
            } else {
                values.first().copied().flatten()
            }
        }
    }

    struct NoopReclaimer;

    #[async_trait]
    impl SpaceReclaimer for NoopReclaimer {
        async fn reclaim(&self) -> CleanupReport {
            CleanupReport::default()
        }
    }

    fn governor(values: Vec<Option<DiskUsage>>) -> QuotaGovernor {
        QuotaGovernor::with_probe(
            PathBuf::from("/tmp"),
            Box::new(ScriptedProbe::new(values)),
        )
    }

    #[test]
    fn test_estimate_counts_text_as_utf16() {
        let gov = governor(vec![None]);
        let mut note = Note::new("", "", 0.0, b"12345".to_vec(), None);
        note.record.transcript = "abcd".to_string();

        // 4 ASCII chars * 2 bytes + 5 audio bytes
        assert_eq!(gov.estimate_size(&note), 13);
    }

    #[test]
    fn test_estimate_uses_duration_when_audio_unknown() {
        let gov = governor(vec![None]);
        let note = Note::new("", "", 120.0, Vec::new(), None);

        // 2 minutes at ~1 MiB/minute
        assert_eq!(gov.estimate_size(&note), 2 * 1024 * 1024);
    }

    #[test]
    fn test_admission_respects_quota() {
        let gov = governor(vec![Some(DiskUsage {
            used: 990,
            quota: 1000,
        })]);

        assert!(gov.check_admission(5));
        assert!(!gov.check_admission(50));
    }

    #[test]
    fn test_admission_fails_open_without_probe() {
        let gov = governor(vec![None]);
        assert!(gov.check_admission(u64::MAX / 2));
    }

    #[tokio::test]
    async fn test_admit_with_cleanup_rechecks() {
        // First check sees 990/1000, after cleanup the probe reports 930/1000
        let gov = governor(vec![
            Some(DiskUsage {
                used: 990,
                quota: 1000,
            }),
            Some(DiskUsage {
                used: 930,
                quota: 1000,
            }),
        ]);

        let decision = gov.admit_with_cleanup(50, &NoopReclaimer).await;
        assert!(decision.admitted);
        assert!(decision.cleanup.is_some());
    }

    #[tokio::test]
    async fn test_admit_with_cleanup_still_denies_when_full() {
        let gov = governor(vec![Some(DiskUsage {
            used: 990,
            quota: 1000,
        })]);

        let decision = gov.admit_with_cleanup(50, &NoopReclaimer).await;
        assert!(!decision.admitted);
    }

    #[test]
    fn test_status_thresholds() {
        let gov = governor(vec![Some(DiskUsage {
            used: 960,
            quota: 1000,
        })]);
        let status = gov.status();

        assert!(status.is_near_limit);
        assert!(status.is_at_limit);
        assert_eq!(status.available_bytes, 40);

        let gov = governor(vec![Some(DiskUsage {
            used: 850,
            quota: 1000,
        })]);
        let status = gov.status();
        assert!(status.is_near_limit);
        assert!(!status.is_at_limit);

        let gov = governor(vec![None]);
        let status = gov.status();
        assert_eq!(status.used_bytes, 0);
        assert!(!status.is_near_limit);
    }
}
