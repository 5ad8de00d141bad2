//! Run a file through every stage with in-memory adapters.
//!
//! Each stage receives exactly what the previous one published, shaped as
//! the trigger the platform would deliver.

use crate::config::{
    FanoutStageConfig, IngestStageConfig, MalformedRowPolicy, PersistStageConfig,
    TransformStageConfig, UploadConfig,
};
use crate::events::{DynamoDbEvent, S3Event};
use crate::messaging::{InMemoryBus, PublishedMessage, Topic};
use crate::stages::{
    FanoutStage, FanoutSummary, IngestStage, IngestSummary, PersistStage, PersistenceOutcome,
    TransformStage, TransformSummary,
};
use crate::storage::InMemoryObjectSource;
use crate::store::InMemoryStore;
use crate::upload::{self, UploadFileCommand, UploadFileResponse};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use userflow_common::UserRecord;

const LOCAL_BUCKET: &str = "userflow-local";
const LOCAL_TABLE: &str = "userflow-local-users";

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub upload: UploadFileResponse,
    pub ingest: IngestSummary,
    pub transform: TransformSummary,
    pub persist: PersistenceOutcome,
    pub fanout: FanoutSummary,
    pub stored: Vec<UserRecord>,
    pub notifications: Vec<PublishedMessage>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "upload:    stored {} ({} bytes, sha256 {})",
            self.upload.object(),
            self.upload.size,
            self.upload.checksum
        )?;
        writeln!(f, "ingest:    {}", self.ingest)?;
        writeln!(f, "transform: {}", self.transform)?;
        writeln!(f, "persist:   {}", self.persist)?;
        write!(f, "fanout:    {}", self.fanout)
    }
}

/// Topics used between stages in a local run.
#[derive(Debug, Clone)]
pub struct LocalTopics {
    pub ingest: Topic,
    pub transform: Topic,
    pub fanout: Topic,
}

impl LocalTopics {
    pub fn new() -> Result<Self> {
        let topic = |name: &str| Topic::new(format!("local:{}", name)).map_err(anyhow::Error::msg);
        Ok(Self {
            ingest: topic("ingest-to-transform")?,
            transform: topic("transform-to-store")?,
            fanout: topic("user-migration-fanout")?,
        })
    }
}

/// Upload `content` and drive it through ingest, transform, persist and
/// fanout. A transform failure aborts the run.
pub async fn simulate(
    filename: Option<String>,
    content: Vec<u8>,
    policy: MalformedRowPolicy,
) -> Result<SimulationReport> {
    let topics = LocalTopics::new()?;
    let source = Arc::new(InMemoryObjectSource::new());
    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryStore::new());

    let upload = upload::handle(
        source.as_ref(),
        &UploadConfig::new(LOCAL_BUCKET),
        UploadFileCommand {
            filename,
            content,
            content_type: None,
        },
    )
    .await?;
    info!("Uploaded {}", upload.object());

    let ingest = IngestStage::new(
        IngestStageConfig::new(topics.ingest.clone()),
        source.clone(),
        bus.clone(),
    )
    .handle(&S3Event::object_created(
        upload.bucket.clone(),
        upload.key.clone(),
        upload.size,
    ))
    .await;

    let transform = TransformStage::new(
        TransformStageConfig::new(topics.transform.clone(), policy),
        bus.clone(),
    )
    .handle(&bus.sns_event(&topics.ingest))
    .await
    .context("Transform stage failed")?;

    let persist = PersistStage::new(PersistStageConfig::new(LOCAL_TABLE), store.clone())
        .handle(&bus.sns_event(&topics.transform))
        .await;

    let fanout = FanoutStage::new(FanoutStageConfig::new(topics.fanout.clone()), bus.clone())
        .handle(&DynamoDbEvent::from_entries(&store.drain_changes()))
        .await;

    let notifications = bus
        .published()
        .into_iter()
        .filter(|m| m.topic == topics.fanout)
        .collect();

    Ok(SimulationReport {
        upload,
        ingest,
        transform,
        persist,
        fanout,
        stored: store.rows(),
        notifications,
    })
}
