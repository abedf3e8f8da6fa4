//! murmur - local-first voice note capture
//!
//! Records of captured voice notes live entirely on-device; the remote
//! service is only consulted for transcription and rewriting, and every
//! network-dependent step survives being offline.
//!
//! # Architecture
//!
//! - Notes are split across three keyed partitions (metadata / audio /
//!   photo) with referential integrity checking and orphan cleanup
//! - Writes pass quota admission control before touching the partitions
//! - Network operations queue durably and drain sequentially with
//!   bounded-backoff retries when connectivity returns
//! - All mutable app state persists through a state bridge, so a
//!   restart resumes mid-operation
//!
//! # Modules
//!
//! - `domain`: Data structures (Note, pending operations, app state)
//! - `storage`: Partitioned note store and quota governor
//! - `sync`: Remote scribe client, retrying transport, operation queue
//! - `state`: Durable state bridge and command-driven state store
//! - `cli`: Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod state;
pub mod storage;
pub mod sync;

// Re-export main types at crate root for convenience
pub use domain::{Note, NoteRecord, PendingRewrite, PendingTranscription, QueueSnapshot};
pub use state::{StateBridge, StateStore};
pub use storage::{Anomaly, NoteStore, QuotaGovernor, StorageQuotaStatus, StoreError};
pub use sync::{ApiError, ApiErrorKind, OperationQueue, RetryPolicy, RetryingTransport};
