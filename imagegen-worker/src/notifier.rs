use std::collections::HashMap;
use std::sync::Arc;

use imagegen_common::artifact_store::ArtifactStore;
use imagegen_common::event::{CreatedObject, InvocationResponse};
use imagegen_common::keys::{INTERACTION_TOKEN_METADATA, USER_ID_METADATA};
use serde::Serialize;
use tracing::{error, info, instrument};
use url::Url;

use crate::error::NotifyError;
use crate::metrics_consts::{NOTIFICATIONS_SENT, NOTIFY_ERRORS};

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct WebhookMessage {
    pub content: String,
}

/// Tells the requester their image is ready, by following up on the chat
/// interaction whose token travelled with the artifact's metadata.
#[derive(Clone)]
pub struct Notifier {
    artifacts: Arc<dyn ArtifactStore>,
    client: reqwest::Client,
    webhook_base: Url,
    object_storage_region: String,
}

impl Notifier {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        client: reqwest::Client,
        api_url: &str,
        app_id: &str,
        object_storage_region: &str,
    ) -> Result<Self, url::ParseError> {
        let webhook_base = Url::parse(&format!(
            "{}/webhooks/{}",
            api_url.trim_end_matches('/'),
            app_id
        ))?;
        if webhook_base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        Ok(Self {
            artifacts,
            client,
            webhook_base,
            object_storage_region: object_storage_region.to_owned(),
        })
    }

    #[instrument(skip_all, fields(key = %object.key))]
    pub async fn notify(&self, object: CreatedObject) -> Result<InvocationResponse, NotifyError> {
        let result = self.send_notification(object).await;
        if let Err(err) = &result {
            error!("failed to notify requester: {}", err);
            metrics::counter!(NOTIFY_ERRORS, "cause" => err.cause()).increment(1);
        }
        result
    }

    async fn send_notification(
        &self,
        object: CreatedObject,
    ) -> Result<InvocationResponse, NotifyError> {
        let metadata = self.artifacts.metadata(&object.key).await?;

        let user_id = metadata_value(&metadata, USER_ID_METADATA).ok_or_else(|| {
            NotifyError::MissingMetadata {
                key: object.key.clone(),
                field: USER_ID_METADATA,
            }
        })?;
        let token = metadata_value(&metadata, INTERACTION_TOKEN_METADATA).ok_or_else(|| {
            NotifyError::MissingMetadata {
                key: object.key.clone(),
                field: INTERACTION_TOKEN_METADATA,
            }
        })?;

        let message = WebhookMessage {
            content: format!(
                "Your AI generated image!\n<@{}>\n{}",
                user_id,
                self.object_url(&object)
            ),
        };

        self.client
            .post(self.webhook_url(token)?)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;

        metrics::counter!(NOTIFICATIONS_SENT).increment(1);
        info!(user_id = %user_id, "requester notified");
        Ok(InvocationResponse::ok())
    }

    /// The token is appended as a single encoded path segment, never parsed as a url.
    pub fn webhook_url(&self, token: &str) -> Result<Url, NotifyError> {
        let mut webhook_url = self.webhook_base.clone();
        webhook_url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(token);
        Ok(webhook_url)
    }

    pub fn object_url(&self, object: &CreatedObject) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            object.bucket, self.object_storage_region, object.key
        )
    }
}

/// The object store lowercases user metadata keys, so lookups ignore case.
fn metadata_value<'a>(metadata: &'a HashMap<String, String>, field: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(field))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
}
