//! Wire stages to AWS adapters and run one trigger through them.

use crate::aws::AwsSettings;
use crate::config::{
    ConfigSource, FanoutStageConfig, IngestStageConfig, PersistStageConfig, TransformStageConfig,
    UploadConfig,
};
use crate::events::{PipelineEvent, StageKind};
use crate::messaging::SnsPublisher;
use crate::stages::{FanoutStage, IngestStage, PersistStage, TransformStage};
use crate::storage::S3ObjectSource;
use crate::store::DynamoDbStore;
use crate::upload::{self, UploadFileCommand, UploadFileResponse};
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

/// Run `stage` against the trigger document `event_json` and return the
/// stage's status text.
///
/// Configuration is resolved before the event is parsed, so a missing
/// setting fails the run without touching any service.
pub async fn run_stage(
    source: &ConfigSource,
    stage_kind: StageKind,
    event_json: &str,
) -> Result<String> {
    let aws = AwsSettings::from_source(source);

    let status = match stage_kind {
        StageKind::Ingest => {
            let config = IngestStageConfig::from_source(source)?;
            let sdk = aws.load().await;
            let stage = IngestStage::new(
                config,
                Arc::new(S3ObjectSource::new(aws.s3_client(&sdk))),
                Arc::new(SnsPublisher::new(aws.sns_client(&sdk))),
            );
            let PipelineEvent::ObjectCreated(event) = parse_event(stage_kind, event_json)?
            else {
                bail!("ingest expects an object-created notification");
            };
            stage.handle(&event).await.to_string()
        }
        StageKind::Transform => {
            let config = TransformStageConfig::from_source(source)?;
            let sdk = aws.load().await;
            let publisher = SnsPublisher::new(aws.sns_client(&sdk));
            let stage = TransformStage::new(config, Arc::new(publisher));
            let PipelineEvent::Message(event) = parse_event(stage_kind, event_json)? else {
                bail!("transform expects an SNS delivery");
            };
            stage.handle(&event).await?.to_string()
        }
        StageKind::Persist => {
            let config = PersistStageConfig::from_source(source)?;
            let sdk = aws.load().await;
            let store = DynamoDbStore::new(aws.dynamodb_client(&sdk), config.table.clone());
            let stage = PersistStage::new(config, Arc::new(store));
            let PipelineEvent::Message(event) = parse_event(stage_kind, event_json)? else {
                bail!("persist expects an SNS delivery");
            };
            stage.handle(&event).await.to_string()
        }
        StageKind::Fanout => {
            let config = FanoutStageConfig::from_source(source)?;
            let sdk = aws.load().await;
            let publisher = SnsPublisher::new(aws.sns_client(&sdk));
            let stage = FanoutStage::new(config, Arc::new(publisher));
            let PipelineEvent::ChangeFeed(event) = parse_event(stage_kind, event_json)?
            else {
                bail!("fanout expects a DynamoDB stream event");
            };
            stage.handle(&event).await.to_string()
        }
    };

    info!(stage = %stage_kind, "{}", status);
    Ok(status)
}

fn parse_event(stage_kind: StageKind, event_json: &str) -> Result<PipelineEvent> {
    let event = PipelineEvent::parse(stage_kind, event_json)?;
    info!(stage = %stage_kind, records = event.record_count(), "Received trigger event");
    Ok(event)
}

/// Upload a file to the configured bucket (or `bucket_override`).
pub async fn upload_file(
    source: &ConfigSource,
    bucket_override: Option<String>,
    command: UploadFileCommand,
) -> Result<UploadFileResponse> {
    let config = match bucket_override.filter(|b| !b.trim().is_empty()) {
        Some(bucket) => UploadConfig::new(bucket),
        None => UploadConfig::from_source(source)?,
    };

    let aws = AwsSettings::from_source(source);
    let sdk = aws.load().await;
    let storage = S3ObjectSource::new(aws.s3_client(&sdk));

    Ok(upload::handle(&storage, &config, command).await?)
}
