//! Persisted application state and the commands that mutate it.
//!
//! State changes flow through a closed command enum rather than ad-hoc
//! field writes, so every transition can be persisted and replayed in
//! tests without a UI attached.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key used by the reversible credential encoding.
///
/// Obfuscation only, not security-grade: it keeps the API key out of
/// casual view in the state file, nothing more.
const CREDENTIAL_KEY: &[u8] = b"murmur-local-state";

/// User-adjustable settings, persisted as part of the app state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Preferred transcription language ("auto" = detect)
    pub language: String,

    /// Model identifier sent with transcription requests
    pub model: String,

    /// Default prompt used for rewrite operations
    pub rewrite_prompt: String,

    /// API credential, stored with the reversible encoding
    pub api_key_encoded: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            model: "scribe-1".to_string(),
            rewrite_prompt: "Clean up this transcript into clear prose.".to_string(),
            api_key_encoded: None,
        }
    }
}

impl Settings {
    /// Store an API key using the reversible encoding
    pub fn set_api_key(&mut self, key: &str) {
        self.api_key_encoded = Some(encode_credential(key));
    }

    /// Decode the stored API key, if any
    pub fn api_key(&self) -> Option<String> {
        self.api_key_encoded
            .as_deref()
            .and_then(decode_credential)
    }
}

/// Snapshot of UI-relevant state, persisted on every transition.
///
/// Kept separate from the offline queue snapshot so a corrupt queue
/// record never invalidates settings, and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedAppState {
    #[serde(default)]
    pub settings: Settings,

    /// Currently selected note, if any
    #[serde(default)]
    pub selected_note: Option<Uuid>,

    /// Whether a recording is in progress (cleared on restart)
    #[serde(default)]
    pub recording: bool,
}

/// Commands that mutate the persisted state
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    SelectNote(Option<Uuid>),
    SetRecording(bool),
    SetLanguage(String),
    SetModel(String),
    SetRewritePrompt(String),
    SetApiKey(String),
    ClearApiKey,
}

impl PersistedAppState {
    /// Apply a command, producing the next state in place
    pub fn apply(&mut self, command: AppCommand) {
        match command {
            AppCommand::SelectNote(id) => self.selected_note = id,
            AppCommand::SetRecording(active) => self.recording = active,
            AppCommand::SetLanguage(lang) => self.settings.language = lang,
            AppCommand::SetModel(model) => self.settings.model = model,
            AppCommand::SetRewritePrompt(prompt) => self.settings.rewrite_prompt = prompt,
            AppCommand::SetApiKey(key) => self.settings.set_api_key(&key),
            AppCommand::ClearApiKey => self.settings.api_key_encoded = None,
        }
    }
}

/// Encode a credential: XOR with a fixed key, then hex
pub fn encode_credential(plain: &str) -> String {
    let bytes: Vec<u8> = plain
        .bytes()
        .zip(CREDENTIAL_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    hex::encode(bytes)
}

/// Reverse of [`encode_credential`]; `None` if the input is not valid
pub fn decode_credential(encoded: &str) -> Option<String> {
    let bytes = hex::decode(encoded).ok()?;
    let plain: Vec<u8> = bytes
        .iter()
        .zip(CREDENTIAL_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    String::from_utf8(plain).ok()
}
