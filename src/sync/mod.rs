//! Offline synchronization: remote scribe client, retrying transport,
//! and the durable operation queue.

pub mod api;
pub mod error;
pub mod queue;
pub mod transport;

pub use api::{
    HttpScribeClient, RewriteRequest, RewriteResponse, ScribeService, TranscriptionRequest,
    TranscriptionResponse,
};
pub use error::{ApiError, ApiErrorKind};
pub use queue::{DrainReport, OperationQueue, TerminalFailure};
pub use transport::{RetryPolicy, RetryingTransport};
