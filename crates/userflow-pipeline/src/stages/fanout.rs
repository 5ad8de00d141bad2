//! Fanout stage: forward store change-feed entries to a fanout topic.

use crate::config::FanoutStageConfig;
use crate::events::{DynamoDbEvent, DynamoDbEventRecord};
use crate::messaging::MessagePublisher;
use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutFailure {
    pub event_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutSummary {
    pub processed: usize,
    pub published: usize,
    pub failures: Vec<FanoutFailure>,
}

impl fmt::Display for FanoutSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.processed == 0 {
            return write!(f, "No DynamoDB stream records to process");
        }
        write!(
            f,
            "Processed {} DynamoDB stream events (published={}, failed={})",
            self.processed,
            self.published,
            self.failures.len()
        )
    }
}

pub struct FanoutStage {
    config: FanoutStageConfig,
    publisher: Arc<dyn MessagePublisher>,
}

impl FanoutStage {
    pub fn new(config: FanoutStageConfig, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { config, publisher }
    }

    #[instrument(skip_all, fields(records = event.records.len(), topic = %self.config.fanout_topic))]
    pub async fn handle(&self, event: &DynamoDbEvent) -> FanoutSummary {
        let mut summary = FanoutSummary {
            processed: event.records.len(),
            ..Default::default()
        };

        if event.records.is_empty() {
            warn!("DynamoDB stream event contained no records");
            return summary;
        }

        for record in &event.records {
            match self.forward(record).await {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    error!(
                        event_id = ?record.event_id,
                        error = %format!("{:#}", e),
                        "Failed to fan out change"
                    );
                    summary.failures.push(FanoutFailure {
                        event_id: record.event_id.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            published = summary.published,
            failed = summary.failures.len(),
            "Processed DynamoDB stream events"
        );

        summary
    }

    async fn forward(&self, record: &DynamoDbEventRecord) -> Result<()> {
        let entry = record
            .entry()
            .ok_or_else(|| anyhow!("stream record carries no DynamoDB detail"))?;

        info!(
            event_kind = %entry.event_kind,
            keys = ?entry.keys,
            "DynamoDB stream event"
        );

        // Published as {"eventId", "eventKind", "keys"}.
        let payload = serde_json::to_string(&entry).context("Failed to serialize change entry")?;

        self.publisher
            .publish(&self.config.fanout_topic, payload)
            .await
            .with_context(|| format!("Failed to publish to {}", self.config.fanout_topic))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::{ChangeKind, ChangeLogEntry, DynamoDbEventRecord};
    use crate::messaging::{InMemoryBus, Topic};
    use std::collections::BTreeMap;

    fn stage() -> (FanoutStage, Arc<InMemoryBus>, Topic) {
        let topic = Topic::new("arn:aws:sns:eu-west-1:1:fanout").unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let stage = FanoutStage::new(FanoutStageConfig::new(topic.clone()), bus.clone());
        (stage, bus, topic)
    }

    fn entry(id: &str, kind: ChangeKind) -> ChangeLogEntry {
        ChangeLogEntry {
            event_id: Some(format!("e-{}", id)),
            event_kind: kind,
            keys: BTreeMap::from([("id".to_string(), id.to_string())]),
        }
    }

    #[tokio::test]
    async fn test_publishes_one_notification_per_entry() {
        let (stage, bus, topic) = stage();
        let event = DynamoDbEvent::from_entries(&[
            entry("1", ChangeKind::Insert),
            entry("2", ChangeKind::Modify),
        ]);

        let summary = stage.handle(&event).await;
        assert_eq!(
            summary.to_string(),
            "Processed 2 DynamoDB stream events (published=2, failed=0)"
        );
        assert_eq!(
            bus.published_to(&topic)[0],
            r#"{"eventId":"e-1","eventKind":"INSERT","keys":{"id":"1"}}"#
        );
    }

    #[tokio::test]
    async fn test_empty_event() {
        let (stage, _, _) = stage();
        assert_eq!(
            stage.handle(&DynamoDbEvent::default()).await.to_string(),
            "No DynamoDB stream records to process"
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (stage, bus, topic) = stage();
        bus.fail_payloads_containing("\"id\":\"2\"");

        let mut event = DynamoDbEvent::from_entries(&[
            entry("1", ChangeKind::Insert),
            entry("2", ChangeKind::Insert),
        ]);
        event.records.push(DynamoDbEventRecord::default());
        event
            .records
            .extend(DynamoDbEvent::from_entries(&[entry("3", ChangeKind::Remove)]).records);

        let summary = stage.handle(&event).await;
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].event_id.as_deref(), Some("e-2"));
        assert!(summary.failures[0].reason.starts_with("Failed to publish to arn:aws:sns"));
        assert_eq!(summary.failures[1].reason, "stream record carries no DynamoDB detail");
        assert_eq!(bus.published_to(&topic).len(), 2);
    }
}
