//! Object store holding generated artifacts.
//!
//! Follows the common S3 client pattern: a trait with a real implementation over
//! the AWS SDK and a manual mock that's always available for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_s3::{operation::head_object::HeadObjectError, primitives::ByteStream};
use thiserror::Error;

pub const PNG_CONTENT_TYPE: &str = "image/png";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store operation failed: {0}")]
    OperationFailed(String),
}

impl From<aws_sdk_s3::Error> for ArtifactStoreError {
    fn from(err: aws_sdk_s3::Error) -> Self {
        ArtifactStoreError::OperationFailed(err.to_string())
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write an artifact at `key`, replacing any previous object.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), ArtifactStoreError>;

    /// Read back the user metadata of a stored artifact.
    async fn metadata(&self, key: &str) -> Result<HashMap<String, String>, ArtifactStoreError>;
}

/// Artifact store backed by a single S3 bucket.
pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_owned(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), ArtifactStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(PNG_CONTENT_TYPE)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| aws_sdk_s3::Error::from(e).into())
            .map(|_| ())
    }

    async fn metadata(&self, key: &str) -> Result<HashMap<String, String>, ArtifactStoreError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = format!("failed to head object in {}: {e}", self.bucket);
                if let HeadObjectError::NotFound(_) = e.into_service_error() {
                    ArtifactStoreError::NotFound(key.to_owned())
                } else {
                    ArtifactStoreError::OperationFailed(message)
                }
            })?;

        Ok(head.metadata().cloned().unwrap_or_default())
    }
}

/// An object written through the mock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

/// Mock artifact store for testing, records every successful write.
#[derive(Clone, Default)]
pub struct MockArtifactStore {
    put_error: Option<ArtifactStoreError>,
    metadata_responses: HashMap<String, Result<HashMap<String, String>, ArtifactStoreError>>,
    puts: Arc<Mutex<Vec<StoredObject>>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put() fail with the given error.
    pub fn put_err(mut self, error: ArtifactStoreError) -> Self {
        self.put_error = Some(error);
        self
    }

    /// Set up a response for metadata(), taking precedence over previously written objects.
    pub fn metadata_ret(
        mut self,
        key: &str,
        response: Result<HashMap<String, String>, ArtifactStoreError>,
    ) -> Self {
        self.metadata_responses.insert(key.to_owned(), response);
        self
    }

    pub fn puts(&self) -> Vec<StoredObject> {
        self.puts.lock().expect("poisoned mock lock").clone()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<(), ArtifactStoreError> {
        if let Some(error) = &self.put_error {
            return Err(error.clone());
        }

        self.puts
            .lock()
            .expect("poisoned mock lock")
            .push(StoredObject {
                key: key.to_owned(),
                bytes,
                metadata,
            });
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<HashMap<String, String>, ArtifactStoreError> {
        if let Some(response) = self.metadata_responses.get(key) {
            return response.clone();
        }

        self.puts
            .lock()
            .expect("poisoned mock lock")
            .iter()
            .rev()
            .find(|object| object.key == key)
            .map(|object| object.metadata.clone())
            .ok_or_else(|| ArtifactStoreError::NotFound(key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_records_puts() {
        let store = MockArtifactStore::new();
        let metadata = HashMap::from([("userId".to_owned(), "u1".to_owned())]);

        store
            .put("public/u1/p1.png", vec![1, 2, 3], metadata.clone())
            .await
            .unwrap();

        assert_eq!(
            store.puts(),
            vec![StoredObject {
                key: "public/u1/p1.png".to_owned(),
                bytes: vec![1, 2, 3],
                metadata: metadata.clone(),
            }]
        );
        assert_eq!(store.metadata("public/u1/p1.png").await.unwrap(), metadata);
    }

    #[tokio::test]
    async fn test_mock_store_clones_share_writes() {
        let store = MockArtifactStore::new();
        let handle = store.clone();

        handle
            .put("public/u1/p1.png", vec![], HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.puts().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_put_error() {
        let store = MockArtifactStore::new()
            .put_err(ArtifactStoreError::OperationFailed("access denied".to_owned()));

        let result = store.put("public/u1/p1.png", vec![], HashMap::new()).await;

        assert_eq!(
            result,
            Err(ArtifactStoreError::OperationFailed("access denied".to_owned()))
        );
        assert!(store.puts().is_empty());
    }

    #[tokio::test]
    async fn test_mock_store_metadata_not_found() {
        let store = MockArtifactStore::new();

        let result = store.metadata("public/nobody/nothing.png").await;
        assert!(matches!(result, Err(ArtifactStoreError::NotFound(_))));
    }
}
