//! HTTP client for the remote transcription/rewrite service.
//!
//! Two endpoints behind one transport: `transcribe` uploads an audio
//! payload as multipart, `rewrite` posts JSON. Metadata generation
//! (title/description/keywords) is a second use of the rewrite
//! endpoint, not a separate protocol. Failures are classified into the
//! taxonomy in [`crate::sync::error`] before they reach callers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiErrorKind};

/// A transcription request. `language` of `None` or "auto" lets the
/// service detect.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    pub file_name: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResponse {
    pub transcript: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    pub text: String,
    pub prompt: String,

    /// Ask for structured metadata (title/description/keywords) instead
    /// of a plain rewrite
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_metadata: bool,
}

impl RewriteRequest {
    pub fn rewrite(text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: prompt.into(),
            generate_metadata: false,
        }
    }

    pub fn metadata(text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: prompt.into(),
            generate_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    pub rewritten_text: String,
    pub original_text: String,

    /// Present only for metadata generation: title (≤50 chars)
    #[serde(default)]
    pub title: Option<String>,

    /// Present only for metadata generation: description (≤150 chars)
    #[serde(default)]
    pub description: Option<String>,

    /// Present only for metadata generation: exactly 3 keywords
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

/// Structured error body returned by the service
#[derive(Debug, Deserialize)]
struct ApiFailureBody {
    error: String,
    #[serde(rename = "type")]
    kind: Option<ApiErrorKind>,
    retryable: Option<bool>,
    #[serde(rename = "retryAfter")]
    retry_after: Option<u64>,
}

/// The remote service seam. The queue and transport only see this
/// trait, so tests drive them with a scripted implementation.
#[async_trait]
pub trait ScribeService: Send + Sync {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ApiError>;

    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse, ApiError>;
}

/// reqwest-backed client for the scribe service
pub struct HttpScribeClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpScribeClient {
    /// Build a client with an explicit per-attempt timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::unknown(format!("failed to build HTTP client: {e}"), false))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl ScribeService for HttpScribeClient {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResponse, ApiError> {
        let audio_part = Part::bytes(request.audio.clone())
            .file_name(request.file_name.clone())
            .mime_str("audio/mp4")
            .map_err(|e| ApiError::unknown(format!("invalid audio part: {e}"), false))?;

        let mut form = Form::new()
            .part("audio", audio_part)
            .text("model", request.model.clone());

        if let Some(language) = &request.language {
            if language != "auto" {
                form = form.text("language", language.clone());
            }
        }
        if let Some(prompt) = &request.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .authorize(self.client.post(self.endpoint("v1/transcribe")))
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let response = check_status(response).await?;
        response
            .json::<TranscriptionResponse>()
            .await
            .map_err(|e| ApiError::unknown(format!("malformed transcription response: {e}"), false))
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse, ApiError> {
        let response = self
            .authorize(self.client.post(self.endpoint("v1/rewrite")))
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let response = check_status(response).await?;
        response
            .json::<RewriteResponse>()
            .await
            .map_err(|e| ApiError::unknown(format!("malformed rewrite response: {e}"), false))
    }
}

/// Map a reqwest transport fault into the taxonomy
fn classify_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() || error.is_connect() {
        ApiError::network(error.to_string())
    } else {
        ApiError::unknown(error.to_string(), true)
    }
}

/// Pass a success response through; classify anything else.
///
/// The structured error body wins when present; otherwise the HTTP
/// status decides (401 auth, 429 quota, 5xx server, 400 malformed).
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();

    if let Ok(failure) = serde_json::from_str::<ApiFailureBody>(&body) {
        let kind = failure.kind.unwrap_or_else(|| kind_for_status(status));
        let mut error = ApiError {
            retryable: failure.retryable.unwrap_or(default_retryable(kind)),
            retry_after: failure.retry_after.or(header_retry_after),
            message: failure.error,
            kind,
        };
        if error.kind == ApiErrorKind::Auth {
            error.retryable = false;
        }
        return Err(error);
    }

    let kind = kind_for_status(status);
    Err(ApiError {
        kind,
        message: format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
        retryable: default_retryable(kind),
        retry_after: header_retry_after,
    })
}

fn kind_for_status(status: StatusCode) -> ApiErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::Quota,
        s if s.is_server_error() => ApiErrorKind::Server,
        _ => ApiErrorKind::Unknown,
    }
}

fn default_retryable(kind: ApiErrorKind) -> bool {
    match kind {
        ApiErrorKind::Auth => false,
        ApiErrorKind::Quota | ApiErrorKind::Network | ApiErrorKind::Server => true,
        ApiErrorKind::Unknown => false,
    }
}
