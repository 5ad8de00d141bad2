//! Keyed record storage
//!
//! Records are stored by `id`; an upsert of an existing id replaces the row.
//! The store's change feed (a DynamoDB stream when deployed) drives the
//! fanout stage.

mod dynamodb;
mod memory;

pub use dynamodb::DynamoDbStore;
pub use memory::InMemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use userflow_common::UserRecord;

#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Insert or fully replace the row keyed by `record.id`.
    async fn upsert(&self, record: &UserRecord) -> Result<()>;
}
