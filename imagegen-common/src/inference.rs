use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use thiserror::Error;

use crate::generation::{GenerationRequestBody, GenerationResponse};

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("failed to encode generation request: {0}")]
    InvalidRequest(String),
    #[error("model invocation failed: {0}")]
    Rejected(String),
    #[error("model returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl From<aws_sdk_bedrockruntime::Error> for InferenceError {
    fn from(err: aws_sdk_bedrockruntime::Error) -> Self {
        InferenceError::Rejected(err.to_string())
    }
}

/// A synchronous text-to-image model endpoint.
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    async fn invoke(
        &self,
        model_id: &str,
        body: &GenerationRequestBody,
    ) -> Result<GenerationResponse, InferenceError>;
}

/// Model endpoint served by Bedrock's runtime API.
/// No client side timeout is set, a call lasts as long as the model takes.
pub struct BedrockEndpoint {
    client: aws_sdk_bedrockruntime::Client,
}

impl BedrockEndpoint {
    pub fn new(client: aws_sdk_bedrockruntime::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InferenceEndpoint for BedrockEndpoint {
    async fn invoke(
        &self,
        model_id: &str,
        body: &GenerationRequestBody,
    ) -> Result<GenerationResponse, InferenceError> {
        let payload =
            serde_json::to_vec(body).map_err(|e| InferenceError::InvalidRequest(e.to_string()))?;

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type(JSON_CONTENT_TYPE)
            .accept(JSON_CONTENT_TYPE)
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(aws_sdk_bedrockruntime::Error::from)?;

        serde_json::from_slice(output.body().as_ref())
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))
    }
}

/// Mock endpoint for testing: answers every call with the same canned result.
#[derive(Clone)]
pub struct MockInferenceEndpoint {
    response: Result<GenerationResponse, InferenceError>,
    calls: Arc<Mutex<Vec<(String, GenerationRequestBody)>>>,
}

impl MockInferenceEndpoint {
    pub fn returning(response: GenerationResponse) -> Self {
        Self {
            response: Ok(response),
            calls: Default::default(),
        }
    }

    pub fn failing(error: InferenceError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    /// Model id and body of every invocation, in call order.
    pub fn calls(&self) -> Vec<(String, GenerationRequestBody)> {
        self.calls.lock().expect("poisoned mock lock").clone()
    }
}

#[async_trait]
impl InferenceEndpoint for MockInferenceEndpoint {
    async fn invoke(
        &self,
        model_id: &str,
        body: &GenerationRequestBody,
    ) -> Result<GenerationResponse, InferenceError> {
        self.calls
            .lock()
            .expect("poisoned mock lock")
            .push((model_id.to_owned(), body.clone()));
        self.response.clone()
    }
}
