use super::KeyedStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client};
use tracing::{debug, instrument};
use userflow_common::UserRecord;

/// Stores user rows in a DynamoDB table whose partition key is `id`.
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table: String,
}

impl DynamoDbStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl KeyedStore for DynamoDbStore {
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn upsert(&self, record: &UserRecord) -> Result<()> {
        debug!("Writing record to table {}", self.table);

        self.client
            .put_item()
            .table_name(&self.table)
            .item("id", AttributeValue::S(record.id.clone()))
            .item("name", AttributeValue::S(record.name.clone()))
            .item("email", AttributeValue::S(record.email.clone()))
            .send()
            .await
            .context(format!(
                "Failed to write record {} to table {}",
                record.id, self.table
            ))?;

        Ok(())
    }
}
