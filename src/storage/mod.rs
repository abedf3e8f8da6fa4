//! Durable note storage: partitioned blob store and quota governor.

pub mod note_store;
pub mod partition;
pub mod quota;

use thiserror::Error;
use uuid::Uuid;

pub use note_store::{Anomaly, NoteStore};
pub use partition::Partition;
pub use quota::{
    AdmissionDecision, CleanupReport, DiskUsage, FsProbe, QuotaGovernor, SpaceReclaimer,
    StorageProbe, StorageQuotaStatus,
};

/// Errors from the local storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Admission denied: the write would exceed the device quota
    #[error("storage quota exceeded: write of {estimated_bytes} bytes was not admitted")]
    StorageFull { estimated_bytes: u64 },

    /// Lower-level I/O fault during a partition write
    #[error("write failed: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// No metadata entry for the requested note
    #[error("note not found: {0}")]
    NotFound(Uuid),

    /// Partition mismatch: metadata exists but required payload is gone
    #[error("note {id} is corrupt: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
