//! Data structures shared across the storage and sync layers.

pub mod note;
pub mod ops;
pub mod state;

pub use note::{audio_checksum, Note, NoteRecord};
pub use ops::{OpKind, PendingRewrite, PendingTranscription, QueueSnapshot};
pub use state::{AppCommand, PersistedAppState, Settings};
