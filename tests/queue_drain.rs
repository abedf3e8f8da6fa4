//! Offline Queue Durability Integration Tests
//!
//! Drains across simulated restarts: the queue is reloaded from its
//! on-disk snapshot between passes, the way a relaunched process would.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use murmur::domain::{Note, PendingRewrite, PendingTranscription};
use murmur::state::StateBridge;
use murmur::sync::{
    ApiError, OperationQueue, RetryPolicy, RetryingTransport, RewriteRequest, RewriteResponse,
    ScribeService, TranscriptionRequest, TranscriptionResponse,
};
use murmur::NoteStore;
use tempfile::TempDir;

/// Service returning a scripted sequence of results per endpoint
struct ScriptedService {
    transcriptions: Mutex<Vec<Result<TranscriptionResponse, ApiError>>>,
    rewrites: Mutex<Vec<Result<RewriteResponse, ApiError>>>,
}

impl ScriptedService {
    fn new(
        transcriptions: Vec<Result<TranscriptionResponse, ApiError>>,
        rewrites: Vec<Result<RewriteResponse, ApiError>>,
    ) -> Self {
        Self {
            transcriptions: Mutex::new(transcriptions),
            rewrites: Mutex::new(rewrites),
        }
    }
}

#[async_trait]
impl ScribeService for ScriptedService {
    async fn transcribe(
        &self,
        _request: &TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ApiError> {
        self.transcriptions.lock().unwrap().remove(0)
    }

    async fn rewrite(&self, _request: &RewriteRequest) -> Result<RewriteResponse, ApiError> {
        self.rewrites.lock().unwrap().remove(0)
    }
}

fn ok_transcript(text: &str) -> Result<TranscriptionResponse, ApiError> {
    Ok(TranscriptionResponse {
        transcript: text.to_string(),
        language: "en".to_string(),
    })
}

fn transport(service: ScriptedService) -> RetryingTransport<ScriptedService> {
    // One attempt per entry keeps scripted sequences aligned
    RetryingTransport::new(
        service,
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        },
    )
}

struct Fixture {
    bridge: StateBridge,
    store: NoteStore,
    _temp: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let bridge = StateBridge::new(temp.path().join("murmur"));
        let store = NoteStore::open(temp.path()).await.unwrap();
        Self {
            bridge,
            store,
            _temp: temp,
        }
    }

    /// A fresh queue instance, as a relaunched process would build it
    async fn reload_queue(&self) -> OperationQueue {
        OperationQueue::load(self.bridge.clone()).await.unwrap()
    }
}

#[tokio::test]
async fn test_retained_entry_completes_after_restart() {
    let fixture = Fixture::new().await;

    let note = Note::new("field recording", "en", 12.0, b"audio".to_vec(), None);
    fixture.store.create(&note).await.unwrap();

    let mut queue = fixture.reload_queue().await;
    queue
        .enqueue_transcription(PendingTranscription::new(note.id(), None))
        .await
        .unwrap();

    // First pass: the network is down, the entry stays pending
    let offline = transport(ScriptedService::new(
        vec![Err(ApiError::network("no route to host"))],
        vec![],
    ));
    let report = queue
        .drain(&offline, &fixture.store, "scribe-1")
        .await
        .unwrap();
    assert_eq!(report.retained, 1);
    assert_eq!(report.completed, 0);

    // Relaunch: the entry is still on disk and completes this time
    let mut queue = fixture.reload_queue().await;
    assert_eq!(queue.len(), 1);

    let online = transport(ScriptedService::new(vec![ok_transcript("it worked")], vec![]));
    let report = queue
        .drain(&online, &fixture.store, "scribe-1")
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
    assert!(queue.is_empty());

    let record = fixture.store.get_record(note.id()).await.unwrap();
    assert_eq!(record.transcript, "it worked");
}

#[tokio::test]
async fn test_completed_entries_do_not_reappear_after_restart() {
    let fixture = Fixture::new().await;

    let first = Note::new("first", "en", 5.0, b"a".to_vec(), None);
    let second = Note::new("second", "en", 5.0, b"b".to_vec(), None);
    fixture.store.create(&first).await.unwrap();
    fixture.store.create(&second).await.unwrap();

    let mut queue = fixture.reload_queue().await;
    queue
        .enqueue_transcription(PendingTranscription::new(first.id(), None))
        .await
        .unwrap();
    queue
        .enqueue_transcription(PendingTranscription::new(second.id(), None))
        .await
        .unwrap();

    // First succeeds, second hits a transient fault
    let flaky = transport(ScriptedService::new(
        vec![ok_transcript("one"), Err(ApiError::server("503"))],
        vec![],
    ));
    queue
        .drain(&flaky, &fixture.store, "scribe-1")
        .await
        .unwrap();

    // After relaunch only the failed entry is pending; the completed
    // one was removed and persisted before the drain moved on
    let queue = fixture.reload_queue().await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.snapshot().transcriptions[0].note_id, second.id());
}

#[tokio::test]
async fn test_terminal_entry_recovers_on_a_later_drain() {
    let fixture = Fixture::new().await;

    let note = Note::new("note", "en", 8.0, b"audio".to_vec(), None);
    fixture.store.create(&note).await.unwrap();

    let mut queue = fixture.reload_queue().await;
    queue
        .enqueue_transcription(PendingTranscription::new(note.id(), None))
        .await
        .unwrap();

    // Credential rejected: terminal, but the entry is not dropped
    let rejected = transport(ScriptedService::new(
        vec![Err(ApiError::auth("invalid api key"))],
        vec![],
    ));
    let report = queue
        .drain(&rejected, &fixture.store, "scribe-1")
        .await
        .unwrap();
    assert_eq!(report.terminal.len(), 1);
    assert_eq!(queue.len(), 1);

    // After the user fixes the key, the same entry drains normally
    let mut queue = fixture.reload_queue().await;
    let accepted = transport(ScriptedService::new(vec![ok_transcript("finally")], vec![]));
    let report = queue
        .drain(&accepted, &fixture.store, "scribe-1")
        .await
        .unwrap();
    assert_eq!(report.completed, 1);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_transcriptions_and_rewrites_drain_in_one_pass() {
    let fixture = Fixture::new().await;

    let captured = Note::new("captured", "en", 8.0, b"audio".to_vec(), None);
    let mut written = Note::new("written", "en", 3.0, b"audio".to_vec(), None);
    written.record.transcript = "rough draft".to_string();
    fixture.store.create(&captured).await.unwrap();
    fixture.store.create(&written).await.unwrap();

    let mut queue = fixture.reload_queue().await;
    queue
        .enqueue_transcription(PendingTranscription::new(captured.id(), None))
        .await
        .unwrap();
    queue
        .enqueue_rewrite(PendingRewrite::new(written.id(), "rough draft", "formal"))
        .await
        .unwrap();

    let service = ScriptedService::new(
        vec![ok_transcript("spoken words")],
        vec![Ok(RewriteResponse {
            rewritten_text: "polished draft".to_string(),
            original_text: "rough draft".to_string(),
            title: None,
            description: None,
            keywords: None,
        })],
    );
    let report = queue
        .drain(&transport(service), &fixture.store, "scribe-1")
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert!(queue.is_empty());

    let transcribed = fixture.store.get_record(captured.id()).await.unwrap();
    assert_eq!(transcribed.transcript, "spoken words");
    let rewritten = fixture.store.get_record(written.id()).await.unwrap();
    assert_eq!(rewritten.rewritten.as_deref(), Some("polished draft"));
}
