use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use imagegen_common::artifact_store::ArtifactStore;
use imagegen_common::event::{ChangeEvent, EventError, EventType, InvocationResponse};
use imagegen_common::generation::{
    ArtifactDecodeError, GenerationRequest, GenerationSettings,
};
use imagegen_common::inference::InferenceEndpoint;
use imagegen_common::keys::{artifact_metadata, storage_key, RecordKey};
use imagegen_common::record_store::{RecordStore, RecordStoreError, WriteCondition};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProcessingError;
use crate::metrics_consts::{
    ARTIFACTS_STORED, EVENTS_IGNORED, EVENTS_RECEIVED, INFERENCE_TIME, PIPELINE_ERRORS,
    WRITE_BACKS,
};

/// The binary output of one generation, as written to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub storage_key: String,
    pub metadata: HashMap<String, String>,
}

/// Turns an inserted prompt row into a stored image and records its location on the row.
///
/// Collaborators are injected once at startup and shared by every invocation; the
/// handler itself keeps no state between events.
#[derive(Clone)]
pub struct PipelineHandler {
    inference: Arc<dyn InferenceEndpoint>,
    artifacts: Arc<dyn ArtifactStore>,
    records: Arc<dyn RecordStore>,
    settings: GenerationSettings,
    model_id: String,
    write_condition: WriteCondition,
}

impl PipelineHandler {
    pub fn new(
        inference: Arc<dyn InferenceEndpoint>,
        artifacts: Arc<dyn ArtifactStore>,
        records: Arc<dyn RecordStore>,
        model_id: &str,
    ) -> Self {
        Self {
            inference,
            artifacts,
            records,
            settings: GenerationSettings::default(),
            model_id: model_id.to_owned(),
            write_condition: WriteCondition::ExistingRowUnclaimed,
        }
    }

    pub fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn write_condition(mut self, condition: WriteCondition) -> Self {
        self.write_condition = condition;
        self
    }

    /// Process a single change event.
    ///
    /// Anything but an insert is acknowledged with "ignore" and no side effects.
    /// An insert performs at most one model call, one artifact write and one
    /// write-back, in that order.
    #[instrument(skip_all, fields(event_id, event_type, user_id, prompt_id))]
    pub async fn handle(&self, event: ChangeEvent) -> Result<InvocationResponse, ProcessingError> {
        let span = tracing::Span::current();
        span.record("event_type", event.event_type.as_str());
        if let Some(event_id) = &event.event_id {
            span.record("event_id", event_id.as_str());
        }

        metrics::counter!(EVENTS_RECEIVED, "event_type" => event.event_type.as_str())
            .increment(1);

        if event.event_type != EventType::Insert {
            // Prompt edits do not trigger a new generation.
            debug!("ignoring {} event", event.event_type);
            metrics::counter!(EVENTS_IGNORED).increment(1);
            return Ok(InvocationResponse::ignored());
        }

        let result = self.process_insert(event).await;
        if let Err(err) = &result {
            error!("failed to process event: {}", err);
            metrics::counter!(PIPELINE_ERRORS, "cause" => err.cause()).increment(1);
        }
        result
    }

    async fn process_insert(
        &self,
        event: ChangeEvent,
    ) -> Result<InvocationResponse, ProcessingError> {
        let image = event
            .new_image
            .ok_or(EventError::MissingNewImage(event.event_type))?;
        let request = GenerationRequest::from_image(&image)?;

        let span = tracing::Span::current();
        span.record("user_id", request.owner_id.as_str());
        span.record("prompt_id", request.request_id.as_str());
        debug!(prompt = %request.prompt_text, "extracted generation request");

        let artifact = self.generate(&request).await?;

        self.write_back(&request, &artifact.storage_key).await?;

        info!(key = %artifact.storage_key, "artifact generated and recorded");
        Ok(InvocationResponse::ok())
    }

    /// Run the model for a request and persist its first artifact.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, ProcessingError> {
        let body = self.settings.build(&request.prompt_text);

        let start = Instant::now();
        let response = self.inference.invoke(&self.model_id, &body).await;
        metrics::histogram!(INFERENCE_TIME).record(start.elapsed().as_secs_f64());
        let response = response?;

        if let Some(result) = &response.result {
            debug!(result = %result, artifacts = response.artifacts.len(), "model responded");
        }

        let bytes = response.decode_first_artifact().map_err(|err| match err {
            ArtifactDecodeError::NoArtifacts => ProcessingError::UpstreamService(err.to_string()),
            ArtifactDecodeError::MissingPayload | ArtifactDecodeError::InvalidPayload(_) => {
                ProcessingError::Decode(err.to_string())
            }
        })?;

        let artifact = Artifact {
            bytes,
            storage_key: storage_key(&request.owner_id, &request.request_id),
            metadata: artifact_metadata(request),
        };

        self.artifacts
            .put(
                &artifact.storage_key,
                artifact.bytes.clone(),
                artifact.metadata.clone(),
            )
            .await?;
        metrics::counter!(ARTIFACTS_STORED).increment(1);

        Ok(artifact)
    }

    async fn write_back(
        &self,
        request: &GenerationRequest,
        key: &str,
    ) -> Result<(), ProcessingError> {
        let record = RecordKey::from(request);

        match self
            .records
            .set_artifact_key(&record, key, self.write_condition)
            .await
        {
            Ok(()) => {
                metrics::counter!(WRITE_BACKS, "outcome" => "success").increment(1);
                Ok(())
            }
            Err(err) => {
                let outcome = match err {
                    RecordStoreError::ConditionFailed(_) => "conflict",
                    RecordStoreError::OperationFailed(_) => "failure",
                };
                metrics::counter!(WRITE_BACKS, "outcome" => outcome).increment(1);
                // The artifact is already stored: a redelivery of the same event
                // lands on the same key and can still record it.
                warn!(key = %key, record = %record, "artifact stored but not recorded");
                Err(err.into())
            }
        }
    }
}
