//! Transform stage: turn tabular payloads into structured record batches.

use crate::config::TransformStageConfig;
use crate::events::SnsEvent;
use crate::messaging::{MessageId, MessagePublisher, Topic};
use crate::parser::{parse_users, ParseError, ParsedBatch};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use userflow_common::record::encode_batch;
use userflow_common::FlowError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to parse message {message_id}: {source}")]
    Parse {
        message_id: String,
        #[source]
        source: ParseError,
    },

    #[error("Failed to serialize transformed records: {0}")]
    Serialize(#[from] FlowError),

    #[error("Failed to publish transformed records to {topic}: {source:#}")]
    Publish {
        topic: Topic,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    pub topic: Topic,
    pub messages: usize,
    pub records: usize,
    pub published: Vec<MessageId>,
    pub skipped_rows: usize,
    /// Messages that yielded no records and were not forwarded.
    pub empty_messages: usize,
}

impl TransformSummary {
    fn new(topic: Topic, messages: usize) -> Self {
        Self {
            topic,
            messages,
            records: 0,
            published: Vec::new(),
            skipped_rows: 0,
            empty_messages: 0,
        }
    }
}

impl fmt::Display for TransformSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages == 0 {
            return write!(f, "No SNS records to process");
        }
        write!(
            f,
            "Published {} transformed records in {} message(s) to SNS topic {}",
            self.records,
            self.published.len(),
            self.topic
        )?;
        if self.skipped_rows > 0 {
            write!(f, " ({} malformed rows skipped)", self.skipped_rows)?;
        }
        Ok(())
    }
}

pub struct TransformStage {
    config: TransformStageConfig,
    publisher: Arc<dyn MessagePublisher>,
}

impl TransformStage {
    pub fn new(config: TransformStageConfig, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { config, publisher }
    }

    /// Parse every delivered message, then publish one batch per message.
    ///
    /// All messages are parsed before anything is published, so a parse
    /// failure under the fail-batch policy publishes nothing. A publish
    /// failure stops the invocation; batches already published stay
    /// published and are safe to replay because persistence is keyed by id.
    #[instrument(skip_all, fields(messages = event.records.len(), policy = %self.config.malformed_rows))]
    pub async fn handle(&self, event: &SnsEvent) -> Result<TransformSummary, TransformError> {
        let topic = &self.config.output_topic;
        let mut summary = TransformSummary::new(topic.clone(), event.records.len());

        if event.records.is_empty() {
            warn!("SNS event contained no records. Nothing to transform.");
            return Ok(summary);
        }

        let mut batches: Vec<(String, ParsedBatch)> = Vec::with_capacity(event.records.len());
        for record in &event.records {
            let message_id = record.message_id().to_string();
            debug!(message_id = %message_id, "Transforming payload: {}", record.payload());

            let batch = parse_users(record.payload(), self.config.malformed_rows).map_err(
                |source| TransformError::Parse {
                    message_id: message_id.clone(),
                    source,
                },
            )?;
            batches.push((message_id, batch));
        }

        for (message_id, batch) in batches {
            summary.skipped_rows += batch.skipped.len();

            if batch.records.is_empty() {
                warn!(message_id = %message_id, "Message produced no records, nothing published");
                summary.empty_messages += 1;
                continue;
            }

            let payload = encode_batch(&batch.records)?;
            debug!("Transformed payload: {}", payload);

            let published = self
                .publisher
                .publish(topic, payload)
                .await
                .map_err(|source| TransformError::Publish {
                    topic: topic.clone(),
                    source,
                })?;

            info!(
                message_id = %message_id,
                published_id = %published,
                records = batch.records.len(),
                "Published transformed records to {}",
                topic
            );

            summary.records += batch.records.len();
            summary.published.push(published);
        }

        Ok(summary)
    }
}
