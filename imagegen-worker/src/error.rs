use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagegen_common::artifact_store::ArtifactStoreError;
use imagegen_common::event::EventError;
use imagegen_common::inference::InferenceError;
use imagegen_common::record_store::RecordStoreError;
use thiserror::Error;

/// Enumeration of errors terminating a generation invocation.
/// None of these are retried internally, the invoking transport decides whether to redeliver.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("malformed change event: {0}")]
    MalformedEvent(#[from] EventError),
    #[error("upstream service error: {0}")]
    UpstreamService(String),
    #[error("failed to decode generated artifact: {0}")]
    Decode(String),
    #[error("failed to store artifact: {0}")]
    StorageWrite(#[from] ArtifactStoreError),
    #[error("failed to write artifact key back to the record: {0}")]
    WriteBack(#[from] RecordStoreError),
}

impl From<InferenceError> for ProcessingError {
    fn from(err: InferenceError) -> Self {
        ProcessingError::UpstreamService(err.to_string())
    }
}

impl ProcessingError {
    /// Short label for metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            ProcessingError::MalformedEvent(_) => "malformed_event",
            ProcessingError::UpstreamService(_) => "upstream_service",
            ProcessingError::Decode(_) => "decode",
            ProcessingError::StorageWrite(_) => "storage_write",
            ProcessingError::WriteBack(RecordStoreError::ConditionFailed(_)) => {
                "write_back_conflict"
            }
            ProcessingError::WriteBack(_) => "write_back",
        }
    }
}

impl IntoResponse for ProcessingError {
    fn into_response(self) -> Response {
        match self {
            ProcessingError::MalformedEvent(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            // Permanent: the row is gone or already points at another artifact.
            ProcessingError::WriteBack(RecordStoreError::ConditionFailed(_)) => {
                (StatusCode::CONFLICT, self.to_string())
            }

            ProcessingError::UpstreamService(_)
            | ProcessingError::Decode(_)
            | ProcessingError::StorageWrite(_)
            | ProcessingError::WriteBack(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}

/// Enumeration of errors terminating a notification invocation.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("malformed object event: {0}")]
    MalformedEvent(#[from] EventError),
    #[error("artifact {key} has no {field} metadata")]
    MissingMetadata { key: String, field: &'static str },
    #[error("failed to read artifact metadata: {0}")]
    ObjectMetadata(#[from] ArtifactStoreError),
    #[error("failed to deliver notification: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error("failed to build webhook url: {0}")]
    WebhookUrl(#[from] url::ParseError),
}

impl NotifyError {
    pub fn cause(&self) -> &'static str {
        match self {
            NotifyError::MalformedEvent(_) => "malformed_event",
            NotifyError::MissingMetadata { .. } => "missing_metadata",
            NotifyError::ObjectMetadata(_) => "object_metadata",
            NotifyError::Webhook(_) => "webhook",
            NotifyError::WebhookUrl(_) => "webhook_url",
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        match self {
            NotifyError::MalformedEvent(_) | NotifyError::MissingMetadata { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            NotifyError::ObjectMetadata(_) | NotifyError::Webhook(_) | NotifyError::WebhookUrl(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}

/// Enumeration of errors raised while wiring the service at startup.
#[derive(Error, Debug)]
pub enum AppContextError {
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("invalid webhook base url: {0}")]
    WebhookUrl(#[from] url::ParseError),
}
