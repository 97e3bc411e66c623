use axum::{extract::State, Json};
use bytes::Bytes;
use imagegen_common::event::{InvocationResponse, ObjectCreatedEvent, StreamEvent};
use tracing::debug;

use crate::error::{NotifyError, ProcessingError};
use crate::notifier::Notifier;
use crate::pipeline::PipelineHandler;

pub async fn index() -> &'static str {
    "imagegen worker"
}

/// Invoked with a change stream batch, processes its first record.
pub async fn generate(
    State(pipeline): State<PipelineHandler>,
    body: Bytes,
) -> Result<Json<InvocationResponse>, ProcessingError> {
    let event = StreamEvent::from_slice(&body)?.into_change_event()?;
    debug!(
        event_id = event.event_id.as_deref().unwrap_or_default(),
        event_type = %event.event_type,
        "decoded change event"
    );

    Ok(Json(pipeline.handle(event).await?))
}

/// Invoked when an artifact lands in the object store.
pub async fn notify(
    State(notifier): State<Notifier>,
    body: Bytes,
) -> Result<Json<InvocationResponse>, NotifyError> {
    let object = ObjectCreatedEvent::from_slice(&body)?.into_created_object()?;

    Ok(Json(notifier.notify(object).await?))
}
