use std::collections::HashMap;
use std::fmt;

use crate::generation::{GenerationRequest, PROMPT_ID_FIELD, USER_ID_FIELD};

/// Namespace under which every artifact is stored.
pub const STORAGE_PREFIX: &str = "public";

/// Row attribute the write-back sets to the artifact's storage key.
pub const ARTIFACT_KEY_ATTRIBUTE: &str = "Key";

pub const INTERACTION_ID_METADATA: &str = "interactionId";
pub const USER_ID_METADATA: &str = "userId";
pub const PROMPT_ID_METADATA: &str = "promptId";
pub const INTERACTION_TOKEN_METADATA: &str = "interactionToken";

/// Object store key for the artifact of a request.
/// Carries no random or time based component: the same request always maps to the same key.
pub fn storage_key(owner_id: &str, request_id: &str) -> String {
    format!("{STORAGE_PREFIX}/{owner_id}/{request_id}.png")
}

/// Metadata attached to a stored artifact, used downstream to notify the requester.
pub fn artifact_metadata(request: &GenerationRequest) -> HashMap<String, String> {
    HashMap::from([
        (
            INTERACTION_ID_METADATA.to_owned(),
            request.callback_id.clone(),
        ),
        (USER_ID_METADATA.to_owned(), request.owner_id.clone()),
        (PROMPT_ID_METADATA.to_owned(), request.request_id.clone()),
        (
            INTERACTION_TOKEN_METADATA.to_owned(),
            request.callback_token.clone(),
        ),
    ])
}

/// Composite primary key of a prompt row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub owner_id: String,
    pub request_id: String,
}

impl RecordKey {
    pub fn new(owner_id: &str, request_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_owned(),
            request_id: request_id.to_owned(),
        }
    }

    pub fn storage_key(&self) -> String {
        storage_key(&self.owner_id, &self.request_id)
    }
}

impl From<&GenerationRequest> for RecordKey {
    fn from(request: &GenerationRequest) -> Self {
        RecordKey::new(&request.owner_id, &request.request_id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{USER_ID_FIELD}: {}, {PROMPT_ID_FIELD}: {}}}",
            self.owner_id, self.request_id
        )
    }
}
