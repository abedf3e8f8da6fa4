//! Command-line interface for murmur.
//!
//! Provides commands for importing captured audio, listing and showing
//! notes, queueing rewrites, draining the offline queue, and running
//! storage diagnostics.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config;
use crate::domain::{AppCommand, Note, OpKind, PendingRewrite, PendingTranscription, Settings};
use crate::state::{StateBridge, StateStore};
use crate::storage::{Anomaly, NoteStore};
use crate::sync::{HttpScribeClient, OperationQueue, RetryingTransport};

/// murmur - local-first voice note capture
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a captured audio file as a new note and queue its
    /// transcription
    Import {
        /// Path to the audio file
        audio: PathBuf,

        /// Title (generated from the transcript if not specified)
        #[arg(short, long)]
        title: Option<String>,

        /// Language tag ("auto" lets the service detect)
        #[arg(short, long)]
        language: Option<String>,

        /// Optional photo to attach
        #[arg(short, long)]
        photo: Option<PathBuf>,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "0")]
        duration: f64,
    },

    /// List all notes, newest first
    List,

    /// Show a note's metadata and transcript
    Show {
        /// Note ID (UUID)
        note_id: String,
    },

    /// Queue a rewrite of a note's transcript
    Rewrite {
        /// Note ID (UUID)
        note_id: String,

        /// Rewrite instruction (defaults to the configured prompt)
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Delete a note and cancel its queued operations
    Delete {
        /// Note ID (UUID)
        note_id: String,
    },

    /// Drain the offline queue against the remote service
    Sync,

    /// Show storage quota and queue status
    Status,

    /// Check partition integrity
    Verify,

    /// Remove orphaned payload entries
    Cleanup,

    /// Update a persisted setting
    Set {
        #[command(subcommand)]
        setting: SetCommands,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Clear persisted state and the offline queue
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum SetCommands {
    /// Preferred transcription language
    Language { value: String },

    /// Transcription model identifier
    Model { value: String },

    /// Default rewrite prompt
    Prompt { value: String },

    /// API credential
    ApiKey { value: String },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Import {
                audio,
                title,
                language,
                photo,
                duration,
            } => import(audio, title, language, photo, duration).await,
            Commands::List => list().await,
            Commands::Show { note_id } => show(&note_id).await,
            Commands::Rewrite { note_id, prompt } => rewrite(&note_id, prompt).await,
            Commands::Delete { note_id } => delete(&note_id).await,
            Commands::Sync => sync().await,
            Commands::Status => status().await,
            Commands::Verify => verify().await,
            Commands::Cleanup => cleanup().await,
            Commands::Set { setting } => set(setting).await,
            Commands::Config => show_config(),
            Commands::Reset => reset().await,
        }
    }
}

fn bridge() -> Result<StateBridge> {
    Ok(StateBridge::new(config::murmur_home()?))
}

async fn open_store() -> Result<NoteStore> {
    let home = config::murmur_home()?;
    NoteStore::open(&home)
        .await
        .context("Failed to open note store")
}

/// Build the retrying transport from config plus persisted settings.
/// The persisted credential wins over the config file.
fn build_transport(settings: &Settings) -> Result<RetryingTransport<HttpScribeClient>> {
    let cfg = config::config()?;

    let api_key = settings.api_key().or_else(|| cfg.api.api_key.clone());
    let client = HttpScribeClient::new(cfg.api.base_url.clone(), api_key, cfg.api.request_timeout)
        .context("Failed to build API client")?;

    Ok(RetryingTransport::new(client, cfg.retry.clone()))
}

async fn import(
    audio_path: PathBuf,
    title: Option<String>,
    language: Option<String>,
    photo_path: Option<PathBuf>,
    duration: f64,
) -> Result<()> {
    let audio = tokio::fs::read(&audio_path)
        .await
        .with_context(|| format!("Failed to read audio file: {}", audio_path.display()))?;

    let photo = match photo_path {
        Some(path) => Some(
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read photo: {}", path.display()))?,
        ),
        None => None,
    };

    let state = StateStore::load(bridge()?).await?;
    let language = language.unwrap_or_else(|| state.state().settings.language.clone());

    let note = Note::new(
        title.unwrap_or_default(),
        language.clone(),
        duration,
        audio,
        photo,
    );
    let note_id = note.id();

    let store = open_store().await?;
    store
        .create(&note)
        .await
        .context("Failed to store the note")?;

    let mut queue = OperationQueue::load(bridge()?).await?;
    queue
        .enqueue_transcription(PendingTranscription::new(note_id, Some(language)))
        .await?;

    println!("Imported note {note_id}");
    println!("Transcription queued; run `murmur sync` when online.");
    Ok(())
}

async fn list() -> Result<()> {
    let store = open_store().await?;
    let records = store.list_records().await?;

    if records.is_empty() {
        println!("No notes yet.");
        return Ok(());
    }

    for record in records {
        let title = if record.title.is_empty() {
            "(untitled)"
        } else {
            &record.title
        };
        println!(
            "{}  {}  {}  {:.0}s",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            title,
            record.duration_seconds,
        );
    }
    Ok(())
}

async fn show(note_id: &str) -> Result<()> {
    let id = parse_note_id(note_id)?;
    let store = open_store().await?;
    let note = store.retrieve(id).await?;
    let record = note.record;

    println!("Note:        {}", record.id);
    println!(
        "Title:       {}",
        if record.title.is_empty() {
            "(untitled)"
        } else {
            &record.title
        }
    );
    if !record.description.is_empty() {
        println!("Description: {}", record.description);
    }
    println!("Language:    {}", record.language);
    println!("Duration:    {:.0}s", record.duration_seconds);
    println!("Created:     {}", record.created_at);
    println!("Updated:     {}", record.updated_at);
    if !record.keywords.is_empty() {
        println!("Keywords:    {}", record.keywords.join(", "));
    }
    println!("Audio:       {} bytes", note.audio.len());
    if let Some(photo) = &note.photo {
        println!("Photo:       {} bytes", photo.len());
    }

    if record.transcript.is_empty() {
        println!("\n(transcription pending)");
    } else {
        println!("\n{}", record.transcript);
    }
    if let Some(rewritten) = &record.rewritten {
        println!("\n--- rewritten ---\n{rewritten}");
    }
    Ok(())
}

async fn rewrite(note_id: &str, prompt: Option<String>) -> Result<()> {
    let id = parse_note_id(note_id)?;
    let store = open_store().await?;
    let record = store.get_record(id).await?;

    if record.transcript.is_empty() {
        bail!("Note {id} has no transcript yet; sync first");
    }

    let state = StateStore::load(bridge()?).await?;
    let prompt = prompt.unwrap_or_else(|| state.state().settings.rewrite_prompt.clone());

    let mut queue = OperationQueue::load(bridge()?).await?;
    queue
        .enqueue_rewrite(PendingRewrite::new(id, record.transcript, prompt))
        .await?;

    println!("Rewrite queued; run `murmur sync` when online.");
    Ok(())
}

async fn delete(note_id: &str) -> Result<()> {
    let id = parse_note_id(note_id)?;
    let store = open_store().await?;
    store.delete(id).await?;

    // Cancel anything still queued for this note
    let mut queue = OperationQueue::load(bridge()?).await?;
    queue.remove_by_note_id(OpKind::Transcription, id).await?;
    queue.remove_by_note_id(OpKind::Rewrite, id).await?;

    println!("Deleted note {id}");
    Ok(())
}

async fn sync() -> Result<()> {
    let state = StateStore::load(bridge()?).await?;
    let settings = state.state().settings.clone();

    let mut queue = OperationQueue::load(bridge()?).await?;
    if queue.is_empty() {
        println!("Queue is empty; nothing to sync.");
        return Ok(());
    }

    let store = open_store().await?;
    let transport = build_transport(&settings)?;

    let report = queue.drain(&transport, &store, &settings.model).await?;

    println!(
        "Sync finished: {} completed, {} still pending, {} abandoned",
        report.completed, report.retained, report.abandoned
    );
    for failure in &report.terminal {
        println!(
            "  {} on note {}: {} (not retried)",
            failure.error.kind, failure.note_id, failure.error.message
        );
    }
    Ok(())
}

async fn status() -> Result<()> {
    let store = open_store().await?;
    let quota = store.quota_status();
    let records = store.list_records().await?;
    let queue = OperationQueue::load(bridge()?).await?;

    println!("Notes:   {}", records.len());
    println!(
        "Queue:   {} transcription(s), {} rewrite(s) pending",
        queue.snapshot().transcriptions.len(),
        queue.snapshot().rewrites.len()
    );
    println!(
        "Storage: {:.1}% used ({} of {} bytes free)",
        quota.percent_used,
        quota.available_bytes,
        quota.used_bytes + quota.available_bytes
    );
    if quota.is_at_limit {
        println!("Storage is at its limit; run `murmur cleanup`.");
    } else if quota.is_near_limit {
        println!("Storage is nearly full.");
    }
    Ok(())
}

async fn verify() -> Result<()> {
    let store = open_store().await?;
    let anomalies = store.validate_integrity().await?;

    if anomalies.is_empty() {
        println!("All partitions consistent.");
        return Ok(());
    }

    for anomaly in &anomalies {
        match anomaly {
            Anomaly::OrphanedAudio(id) => println!("orphaned audio:  {id}"),
            Anomaly::OrphanedPhoto(id) => println!("orphaned photo:  {id}"),
            Anomaly::MissingAudio(id) => {
                println!("missing audio:   {id}  (metadata kept; delete to discard)")
            }
        }
    }
    println!("{} anomalies found.", anomalies.len());
    Ok(())
}

async fn cleanup() -> Result<()> {
    let store = open_store().await?;
    let report = store.cleanup_orphans().await;

    println!(
        "Removed {} orphaned entries ({} bytes freed)",
        report.removed, report.bytes_freed
    );
    for error in &report.errors {
        println!("  warning: {error}");
    }
    Ok(())
}

async fn set(setting: SetCommands) -> Result<()> {
    let mut state = StateStore::load(bridge()?).await?;

    let command = match setting {
        SetCommands::Language { value } => AppCommand::SetLanguage(value),
        SetCommands::Model { value } => AppCommand::SetModel(value),
        SetCommands::Prompt { value } => AppCommand::SetRewritePrompt(value),
        SetCommands::ApiKey { value } => AppCommand::SetApiKey(value),
    };

    state.apply(command).await?;
    println!("Setting saved.");
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Home:      {}", cfg.home.display());
    println!("API URL:   {}", cfg.api.base_url);
    println!("Model:     {}", cfg.api.model);
    println!(
        "API key:   {}",
        if cfg.api.api_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!(
        "Retry:     {} attempts, {:?} base delay, {:?} cap",
        cfg.retry.max_attempts, cfg.retry.base_delay, cfg.retry.max_delay
    );
    match &cfg.config_file {
        Some(path) => println!("Config:    {}", path.display()),
        None => println!("Config:    (defaults)"),
    }
    Ok(())
}

async fn reset() -> Result<()> {
    let bridge = bridge()?;
    bridge.clear_persisted_state().await?;
    bridge.clear_offline_queue().await?;
    println!("Persisted state and offline queue cleared.");
    Ok(())
}

fn parse_note_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid note id: {raw}"))
}
