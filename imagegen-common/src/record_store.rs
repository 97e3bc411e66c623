use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_sdk_dynamodb::{error::SdkError, types::AttributeValue as DynamoValue};
use thiserror::Error;

use crate::generation::{PROMPT_ID_FIELD, USER_ID_FIELD};
use crate::keys::{RecordKey, ARTIFACT_KEY_ATTRIBUTE};

const UPDATE_EXPRESSION: &str = "SET #key = :key";
const UNCLAIMED_CONDITION: &str =
    "attribute_exists(#owner) AND (attribute_not_exists(#key) OR #key = :key)";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    #[error("row {0} is missing or already points at another artifact")]
    ConditionFailed(String),
    #[error("record store operation failed: {0}")]
    OperationFailed(String),
}

impl From<aws_sdk_dynamodb::Error> for RecordStoreError {
    fn from(err: aws_sdk_dynamodb::Error) -> Self {
        RecordStoreError::OperationFailed(err.to_string())
    }
}

/// Precondition attached to a write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Set the attribute whatever the row's current state, creating the row if needed.
    None,
    /// The row must exist and its artifact key must be unset or already equal to the new one.
    ExistingRowUnclaimed,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record the artifact's storage key on the row identified by `record`.
    async fn set_artifact_key(
        &self,
        record: &RecordKey,
        storage_key: &str,
        condition: WriteCondition,
    ) -> Result<(), RecordStoreError>;
}

/// Record store backed by a DynamoDB table keyed by (UserId, PromptId).
pub struct DynamoRecordStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoRecordStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_owned(),
        }
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn set_artifact_key(
        &self,
        record: &RecordKey,
        storage_key: &str,
        condition: WriteCondition,
    ) -> Result<(), RecordStoreError> {
        // "Key" is a reserved word, so it always goes through a name placeholder.
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(USER_ID_FIELD, DynamoValue::S(record.owner_id.clone()))
            .key(PROMPT_ID_FIELD, DynamoValue::S(record.request_id.clone()))
            .update_expression(UPDATE_EXPRESSION)
            .expression_attribute_names("#key", ARTIFACT_KEY_ATTRIBUTE)
            .expression_attribute_values(":key", DynamoValue::S(storage_key.to_owned()));

        if condition == WriteCondition::ExistingRowUnclaimed {
            request = request
                .expression_attribute_names("#owner", USER_ID_FIELD)
                .condition_expression(UNCLAIMED_CONDITION);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(err)) if err.err().is_conditional_check_failed_exception() => {
                Err(RecordStoreError::ConditionFailed(record.to_string()))
            }
            Err(err) => Err(aws_sdk_dynamodb::Error::from(err).into()),
        }
    }
}

/// A write-back issued against the mock store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUpdate {
    pub record: RecordKey,
    pub storage_key: String,
    pub condition: WriteCondition,
}

/// Mock record store for testing.
///
/// Holds an in-memory table of rows (row key to current artifact key) so that
/// conditional write-backs behave like the real table.
#[derive(Clone, Default)]
pub struct MockRecordStore {
    update_error: Option<RecordStoreError>,
    rows: Arc<Mutex<HashMap<RecordKey, Option<String>>>>,
    updates: Arc<Mutex<Vec<KeyUpdate>>>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row, optionally already pointing at an artifact.
    pub fn with_row(self, owner_id: &str, request_id: &str, artifact_key: Option<&str>) -> Self {
        self.rows.lock().expect("poisoned mock lock").insert(
            RecordKey::new(owner_id, request_id),
            artifact_key.map(str::to_owned),
        );
        self
    }

    /// Make every update fail with the given error.
    pub fn update_err(mut self, error: RecordStoreError) -> Self {
        self.update_error = Some(error);
        self
    }

    /// Every update attempt, including rejected ones, in call order.
    pub fn updates(&self) -> Vec<KeyUpdate> {
        self.updates.lock().expect("poisoned mock lock").clone()
    }

    pub fn artifact_key(&self, owner_id: &str, request_id: &str) -> Option<String> {
        self.rows
            .lock()
            .expect("poisoned mock lock")
            .get(&RecordKey::new(owner_id, request_id))
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn set_artifact_key(
        &self,
        record: &RecordKey,
        storage_key: &str,
        condition: WriteCondition,
    ) -> Result<(), RecordStoreError> {
        self.updates
            .lock()
            .expect("poisoned mock lock")
            .push(KeyUpdate {
                record: record.clone(),
                storage_key: storage_key.to_owned(),
                condition,
            });

        if let Some(error) = &self.update_error {
            return Err(error.clone());
        }

        let mut rows = self.rows.lock().expect("poisoned mock lock");
        if condition == WriteCondition::ExistingRowUnclaimed {
            match rows.get(record) {
                Some(None) => {}
                Some(Some(current)) if current == storage_key => {}
                _ => return Err(RecordStoreError::ConditionFailed(record.to_string())),
            }
        }

        rows.insert(record.clone(), Some(storage_key.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconditional_update_creates_row() {
        let store = MockRecordStore::new();
        let record = RecordKey::new("u1", "p1");

        store
            .set_artifact_key(&record, "public/u1/p1.png", WriteCondition::None)
            .await
            .unwrap();

        assert_eq!(
            store.artifact_key("u1", "p1").as_deref(),
            Some("public/u1/p1.png")
        );
    }

    #[tokio::test]
    async fn test_conditional_update_requires_existing_row() {
        let store = MockRecordStore::new();
        let record = RecordKey::new("u1", "p1");

        let result = store
            .set_artifact_key(
                &record,
                "public/u1/p1.png",
                WriteCondition::ExistingRowUnclaimed,
            )
            .await;

        assert_eq!(
            result,
            Err(RecordStoreError::ConditionFailed(
                "{UserId: u1, PromptId: p1}".to_owned()
            ))
        );
        assert_eq!(store.artifact_key("u1", "p1"), None);
        assert_eq!(store.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_update_is_idempotent() {
        let store = MockRecordStore::new().with_row("u1", "p1", None);
        let record = RecordKey::new("u1", "p1");

        for _ in 0..2 {
            store
                .set_artifact_key(
                    &record,
                    "public/u1/p1.png",
                    WriteCondition::ExistingRowUnclaimed,
                )
                .await
                .unwrap();
        }

        assert_eq!(
            store.artifact_key("u1", "p1").as_deref(),
            Some("public/u1/p1.png")
        );
    }

    #[tokio::test]
    async fn test_conditional_update_keeps_other_artifact() {
        let store = MockRecordStore::new().with_row("u1", "p1", Some("public/u1/other.png"));
        let record = RecordKey::new("u1", "p1");

        let result = store
            .set_artifact_key(
                &record,
                "public/u1/p1.png",
                WriteCondition::ExistingRowUnclaimed,
            )
            .await;

        assert!(matches!(result, Err(RecordStoreError::ConditionFailed(_))));
        assert_eq!(
            store.artifact_key("u1", "p1").as_deref(),
            Some("public/u1/other.png")
        );
    }
}
