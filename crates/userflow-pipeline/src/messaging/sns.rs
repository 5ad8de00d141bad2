use super::{MessageId, MessagePublisher, Topic};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sns::Client;

/// Publishes payloads to SNS topics.
#[derive(Clone)]
pub struct SnsPublisher {
    client: Client,
}

impl SnsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessagePublisher for SnsPublisher {
    async fn publish(&self, topic: &Topic, payload: String) -> Result<MessageId> {
        let output = self
            .client
            .publish()
            .topic_arn(topic.as_str())
            .message(payload)
            .send()
            .await
            .context(format!("Failed to publish message to {}", topic))?;

        let message_id = output
            .message_id()
            .context("SNS publish response carried no message id")?;

        Ok(MessageId::new(message_id))
    }
}
