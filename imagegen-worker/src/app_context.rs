use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use imagegen_common::artifact_store::{ArtifactStore, S3ArtifactStore};
use imagegen_common::generation::GenerationSettings;
use imagegen_common::inference::BedrockEndpoint;
use imagegen_common::record_store::DynamoRecordStore;
use tracing::info;

use crate::config::Config;
use crate::error::AppContextError;
use crate::notifier::Notifier;
use crate::pipeline::PipelineHandler;

/// Everything an invocation needs, built once per process.
pub struct AppContext {
    pub pipeline: PipelineHandler,
    pub notifier: Option<Notifier>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, AppContextError> {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut s3_conf = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.object_storage_endpoint {
            s3_conf = s3_conf.endpoint_url(endpoint).force_path_style(true);
        }
        let s3_client = aws_sdk_s3::Client::from_conf(s3_conf.build());

        // The model is only offered in some regions, independently of where the data lives.
        let bedrock_conf = aws_sdk_bedrockruntime::config::Builder::from(&shared)
            .region(Region::new(config.bedrock_region.clone()))
            .build();
        let bedrock_client = aws_sdk_bedrockruntime::Client::from_conf(bedrock_conf);

        let dynamo_client = aws_sdk_dynamodb::Client::new(&shared);

        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(S3ArtifactStore::new(s3_client, config.bucket.as_str()));

        let pipeline = PipelineHandler::new(
            Arc::new(BedrockEndpoint::new(bedrock_client)),
            artifacts.clone(),
            Arc::new(DynamoRecordStore::new(
                dynamo_client,
                config.table_name.as_str(),
            )),
            config.model_id.as_str(),
        )
        .settings(GenerationSettings::from(&config.generation))
        .write_condition(config.write_condition());

        let notifier = match &config.discord_app_id {
            Some(app_id) => {
                let client = reqwest::Client::builder()
                    .timeout(config.webhook_timeout_ms.0)
                    .build()?;
                Some(Notifier::new(
                    artifacts,
                    client,
                    &config.discord_api_url,
                    app_id.as_str(),
                    &config.object_storage_region,
                )?)
            }
            None => None,
        };

        info!(
            table = config.table_name.as_str(),
            bucket = config.bucket.as_str(),
            model = config.model_id.as_str(),
            notifier = notifier.is_some(),
            "AppContext initialized"
        );

        Ok(Self { pipeline, notifier })
    }
}
