//! Publish/subscribe messaging
//!
//! Stages hand data to each other by publishing text payloads to a [`Topic`].
//! [`SnsPublisher`] is the deployed implementation; [`InMemoryBus`] records
//! every message so chains can be driven locally.

mod memory;
mod sns;

pub use memory::{InMemoryBus, PublishedMessage};
pub use sns::SnsPublisher;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a publish/subscribe topic (an SNS topic ARN when deployed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(address: impl Into<String>) -> Result<Self, String> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err("topic address cannot be empty".to_string());
        }
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the messaging service assigns to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one payload; resolves once the service has accepted it.
    async fn publish(&self, topic: &Topic, payload: String) -> Result<MessageId>;
}
