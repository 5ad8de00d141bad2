use super::{MessageId, MessagePublisher, Topic};
use crate::events::SnsEvent;
use crate::lock;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub id: MessageId,
    pub topic: Topic,
    pub payload: String,
}

/// Message bus that keeps every published message in memory.
///
/// Publishing can be made to fail for a whole topic or for payloads
/// containing a marker string.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    messages: Mutex<Vec<PublishedMessage>>,
    failing_topics: Mutex<HashSet<Topic>>,
    failing_markers: Mutex<Vec<String>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_topic(&self, topic: &Topic) {
        lock(&self.failing_topics).insert(topic.clone());
    }

    pub fn fail_payloads_containing(&self, marker: impl Into<String>) {
        lock(&self.failing_markers).push(marker.into());
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.messages).clone()
    }

    pub fn published_to(&self, topic: &Topic) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|m| &m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Messages published to `topic`, shaped as the trigger the next
    /// subscriber would receive.
    pub fn sns_event(&self, topic: &Topic) -> SnsEvent {
        let messages = lock(&self.messages);
        SnsEvent::from_messages(
            topic,
            messages
                .iter()
                .filter(|m| &m.topic == topic)
                .map(|m| (m.id.as_str(), m.payload.as_str())),
        )
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBus {
    async fn publish(&self, topic: &Topic, payload: String) -> Result<MessageId> {
        if lock(&self.failing_topics).contains(topic) {
            bail!("Topic {} is unavailable", topic);
        }
        if lock(&self.failing_markers)
            .iter()
            .any(|marker| payload.contains(marker.as_str()))
        {
            bail!("Publish to {} rejected", topic);
        }

        let id = MessageId::new(Uuid::new_v4().to_string());
        lock(&self.messages).push(PublishedMessage {
            id: id.clone(),
            topic: topic.clone(),
            payload,
        });
        Ok(id)
    }
}
