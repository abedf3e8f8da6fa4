//! Durable FIFO queue of pending network operations.
//!
//! The queue holds transcription and rewrite requests that could not
//! run synchronously. It is drained strictly sequentially: the Nth
//! entry never starts before the (N-1)th has resolved. A failed entry
//! never blocks the rest of the drain; it stays pending (retryable) or
//! is surfaced in the report (terminal) while the drain moves on.
//!
//! Every mutation is persisted through the state bridge, so entries
//! survive restarts. An entry mid-flight at shutdown reappears as
//! pending on resume: delivery is at-least-once, never silent loss.

use uuid::Uuid;

use crate::domain::{OpKind, PendingRewrite, PendingTranscription, QueueSnapshot};
use crate::state::bridge::{BridgeError, StateBridge};
use crate::storage::{NoteStore, StoreError};

use super::api::{RewriteRequest, ScribeService, TranscriptionRequest};
use super::error::ApiError;
use super::transport::RetryingTransport;

/// Prompt used when asking the service for note metadata
const METADATA_PROMPT: &str =
    "Generate a short title, a one-sentence description, and exactly three keywords \
     for this transcript.";

/// A queue entry that failed with a non-retryable error during a drain.
/// The entry itself stays queued; dropping it silently would lose work.
#[derive(Debug, Clone)]
pub struct TerminalFailure {
    pub kind: OpKind,
    pub note_id: Uuid,
    pub error: ApiError,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Entries completed and removed
    pub completed: usize,

    /// Entries left pending after a retryable failure
    pub retained: usize,

    /// Entries dropped because their note no longer exists
    pub abandoned: usize,

    /// Entries left queued after a non-retryable failure
    pub terminal: Vec<TerminalFailure>,
}

/// How a single entry resolved during a drain
enum Outcome {
    Completed,
    Abandoned(String),
    Retryable(String),
    Terminal(ApiError),
}

impl Outcome {
    fn from_api_error(error: ApiError) -> Self {
        if error.should_retry() {
            Self::Retryable(error.to_string())
        } else {
            Self::Terminal(error)
        }
    }
}

/// The durable offline operation queue
pub struct OperationQueue {
    snapshot: QueueSnapshot,
    bridge: StateBridge,
}

impl OperationQueue {
    /// Hydrate the queue from its durable snapshot
    pub async fn load(bridge: StateBridge) -> Result<Self, BridgeError> {
        bridge.initialize().await?;
        let snapshot = bridge.load_offline_queue().await?;
        Ok(Self { snapshot, bridge })
    }

    pub fn snapshot(&self) -> &QueueSnapshot {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Append a transcription request. At most one pending transcription
    /// per note: an existing entry for the same note is replaced
    /// (removal before reinsertion), which also moves it to the back.
    pub async fn enqueue_transcription(
        &mut self,
        op: PendingTranscription,
    ) -> Result<(), BridgeError> {
        self.snapshot
            .transcriptions
            .retain(|existing| existing.note_id != op.note_id);
        self.snapshot.transcriptions.push(op);
        self.persist().await
    }

    /// Append a rewrite request, replacing any pending rewrite for the
    /// same note
    pub async fn enqueue_rewrite(&mut self, op: PendingRewrite) -> Result<(), BridgeError> {
        self.snapshot
            .rewrites
            .retain(|existing| existing.note_id != op.note_id);
        self.snapshot.rewrites.push(op);
        self.persist().await
    }

    /// Explicit cancellation, used when a note is deleted while an
    /// operation for it is still queued
    pub async fn remove_by_note_id(
        &mut self,
        kind: OpKind,
        note_id: Uuid,
    ) -> Result<bool, BridgeError> {
        let before = self.snapshot.len();
        match kind {
            OpKind::Transcription => self
                .snapshot
                .transcriptions
                .retain(|op| op.note_id != note_id),
            OpKind::Rewrite => self.snapshot.rewrites.retain(|op| op.note_id != note_id),
        }

        let removed = self.snapshot.len() != before;
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Process every pending entry, one at a time, in order.
    ///
    /// Successful entries are removed (and the removal persisted before
    /// the next entry starts). Entries that fail retryably stay pending
    /// and the drain continues. Entries that fail terminally also stay
    /// queued but are surfaced in the report instead of being retried
    /// forever.
    pub async fn drain<S: ScribeService>(
        &mut self,
        transport: &RetryingTransport<S>,
        store: &NoteStore,
        model: &str,
    ) -> Result<DrainReport, BridgeError> {
        let mut report = DrainReport::default();

        let mut idx = 0;
        while idx < self.snapshot.transcriptions.len() {
            let op = self.snapshot.transcriptions[idx].clone();
            let outcome = self.run_transcription(&op, transport, store, model).await;
            idx = self
                .resolve(OpKind::Transcription, idx, op.note_id, outcome, &mut report)
                .await?;
        }

        let mut idx = 0;
        while idx < self.snapshot.rewrites.len() {
            let op = self.snapshot.rewrites[idx].clone();
            let outcome = self.run_rewrite(&op, transport, store).await;
            idx = self
                .resolve(OpKind::Rewrite, idx, op.note_id, outcome, &mut report)
                .await?;
        }

        tracing::info!(
            completed = report.completed,
            retained = report.retained,
            abandoned = report.abandoned,
            terminal = report.terminal.len(),
            "queue drain finished"
        );
        Ok(report)
    }

    /// Apply an entry's outcome; returns the index of the next entry
    async fn resolve(
        &mut self,
        kind: OpKind,
        idx: usize,
        note_id: Uuid,
        outcome: Outcome,
        report: &mut DrainReport,
    ) -> Result<usize, BridgeError> {
        match outcome {
            Outcome::Completed => {
                self.remove_at(kind, idx);
                self.persist().await?;
                report.completed += 1;
                Ok(idx)
            }
            Outcome::Abandoned(reason) => {
                tracing::warn!(%note_id, ?kind, %reason, "abandoning queued operation");
                self.remove_at(kind, idx);
                self.persist().await?;
                report.abandoned += 1;
                Ok(idx)
            }
            Outcome::Retryable(reason) => {
                tracing::info!(%note_id, ?kind, %reason, "entry stays pending");
                report.retained += 1;
                Ok(idx + 1)
            }
            Outcome::Terminal(error) => {
                tracing::warn!(%note_id, ?kind, %error, "entry failed terminally");
                report.terminal.push(TerminalFailure {
                    kind,
                    note_id,
                    error,
                });
                Ok(idx + 1)
            }
        }
    }

    fn remove_at(&mut self, kind: OpKind, idx: usize) {
        match kind {
            OpKind::Transcription => {
                self.snapshot.transcriptions.remove(idx);
            }
            OpKind::Rewrite => {
                self.snapshot.rewrites.remove(idx);
            }
        }
    }

    async fn run_transcription<S: ScribeService>(
        &self,
        op: &PendingTranscription,
        transport: &RetryingTransport<S>,
        store: &NoteStore,
        model: &str,
    ) -> Outcome {
        let audio = match store.read_audio(op.note_id).await {
            Ok(Some(audio)) => audio,
            Ok(None) => return Outcome::Abandoned("audio entry no longer exists".to_string()),
            Err(e) => return Outcome::Retryable(format!("failed to read audio: {e}")),
        };

        let mut record = match store.get_record(op.note_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Outcome::Abandoned("note no longer exists".to_string())
            }
            Err(e) => return Outcome::Retryable(format!("failed to read metadata: {e}")),
        };

        let request = TranscriptionRequest {
            audio,
            file_name: format!("{}.m4a", op.note_id),
            language: op.language.clone(),
            prompt: None,
            model: model.to_string(),
        };

        let response = match transport.transcribe(&request).await {
            Ok(response) => response,
            Err(e) => return Outcome::from_api_error(e),
        };

        record.transcript = response.transcript;
        record.language = response.language;
        record = match store.update(&record, None, None).await {
            Ok(record) => record,
            Err(e) => return Outcome::Retryable(format!("failed to store transcript: {e}")),
        };

        // Best-effort metadata generation for notes still carrying a
        // placeholder title; a failure here never fails the entry.
        if record.has_placeholder_title() && !record.transcript.is_empty() {
            self.generate_metadata(record, transport, store).await;
        }

        Outcome::Completed
    }

    async fn generate_metadata<S: ScribeService>(
        &self,
        mut record: crate::domain::NoteRecord,
        transport: &RetryingTransport<S>,
        store: &NoteStore,
    ) {
        let request = RewriteRequest::metadata(record.transcript.clone(), METADATA_PROMPT);
        match transport.rewrite(&request).await {
            Ok(response) => {
                if let Some(title) = response.title {
                    record.title = title;
                }
                if let Some(description) = response.description {
                    record.description = description;
                }
                if let Some(keywords) = response.keywords {
                    record.keywords = keywords;
                }
                if let Err(e) = store.update(&record, None, None).await {
                    tracing::warn!(note_id = %record.id, error = %e, "failed to store metadata");
                }
            }
            Err(e) => {
                tracing::warn!(note_id = %record.id, error = %e, "metadata generation failed");
            }
        }
    }

    async fn run_rewrite<S: ScribeService>(
        &self,
        op: &PendingRewrite,
        transport: &RetryingTransport<S>,
        store: &NoteStore,
    ) -> Outcome {
        let mut record = match store.get_record(op.note_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Outcome::Abandoned("note no longer exists".to_string())
            }
            Err(e) => return Outcome::Retryable(format!("failed to read metadata: {e}")),
        };

        let request = RewriteRequest::rewrite(op.text.clone(), op.prompt.clone());
        let response = match transport.rewrite(&request).await {
            Ok(response) => response,
            Err(e) => return Outcome::from_api_error(e),
        };

        record.rewritten = Some(response.rewritten_text);
        if let Err(e) = store.update(&record, None, None).await {
            return Outcome::Retryable(format!("failed to store rewrite: {e}"));
        }

        Outcome::Completed
    }

    async fn persist(&self) -> Result<(), BridgeError> {
        self.bridge.save_offline_queue(&self.snapshot).await
    }
}
