//! Persist stage: upsert delivered record batches into the keyed store.

use crate::config::{MalformedRowPolicy, PersistStageConfig};
use crate::events::{SnsEvent, SnsEventRecord};
use crate::parser::parse_users;
use crate::store::KeyedStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use userflow_common::record::decode_batch;
use userflow_common::{FlowError, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub message_id: String,
    /// Position in the message batch; `None` when the whole message failed.
    pub index: Option<usize>,
    pub record_id: Option<String>,
    pub reason: String,
}

/// Counts of one invocation. Every failure is also listed with its reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistenceOutcome {
    pub messages: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<RecordFailure>,
}

impl PersistenceOutcome {
    fn fail(
        &mut self,
        message_id: &str,
        index: Option<usize>,
        record_id: Option<&str>,
        reason: String,
    ) {
        self.failure_count += 1;
        self.failures.push(RecordFailure {
            message_id: message_id.to_string(),
            index,
            record_id: record_id.map(str::to_string),
            reason,
        });
    }
}

impl fmt::Display for PersistenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.messages == 0 {
            return write!(f, "No SNS records to process");
        }
        write!(
            f,
            "Written {} records to DynamoDB ({} failures)",
            self.success_count, self.failure_count
        )
    }
}

pub struct PersistStage {
    config: PersistStageConfig,
    store: Arc<dyn KeyedStore>,
}

impl PersistStage {
    pub fn new(config: PersistStageConfig, store: Arc<dyn KeyedStore>) -> Self {
        Self { config, store }
    }

    /// Upsert every record of every message. One bad message or record
    /// never prevents the others from being written.
    #[instrument(skip_all, fields(messages = event.records.len(), table = %self.config.table))]
    pub async fn handle(&self, event: &SnsEvent) -> PersistenceOutcome {
        let mut outcome = PersistenceOutcome {
            messages: event.records.len(),
            ..Default::default()
        };

        if event.records.is_empty() {
            warn!("SNS event contained no records. Nothing to persist.");
            return outcome;
        }

        for record in &event.records {
            self.persist_message(record, &mut outcome).await;
        }

        if outcome.success_count == 0 && outcome.failure_count > 0 {
            error!(
                failures = outcome.failure_count,
                "No records could be written to {}", self.config.table
            );
        } else {
            info!(
                written = outcome.success_count,
                failures = outcome.failure_count,
                "Finished writing records to {}",
                self.config.table
            );
        }

        outcome
    }

    async fn persist_message(&self, record: &SnsEventRecord, outcome: &mut PersistenceOutcome) {
        let message_id = record.message_id();
        debug!(message_id, "Persisting payload: {}", record.payload());

        let batch = match decode_payload(record.payload()) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(message_id, error = %e, "Failed to decode message payload");
                outcome.fail(message_id, None, None, e.to_string());
                return;
            }
        };

        for (index, item) in batch.into_iter().enumerate() {
            let user = match item {
                Ok(Some(user)) => user,
                Ok(None) => {
                    warn!(message_id, index, "Skipping null record");
                    let reason = format!("record #{} is null", index);
                    outcome.fail(message_id, Some(index), None, reason);
                    continue;
                }
                Err(e) => {
                    warn!(message_id, index, error = %e, "Skipping undecodable record");
                    outcome.fail(message_id, Some(index), None, e.to_string());
                    continue;
                }
            };

            if let Err(e) = user.validate() {
                warn!(message_id, index, error = %e, "Skipping invalid record");
                outcome.fail(message_id, Some(index), None, e.to_string());
                continue;
            }

            match self.store.upsert(&user).await {
                Ok(()) => {
                    debug!(id = %user.id, "Saved record");
                    outcome.success_count += 1;
                }
                Err(e) => {
                    error!(id = %user.id, error = %format!("{:#}", e), "Failed to save record");
                    outcome.fail(message_id, Some(index), Some(&user.id), format!("{:#}", e));
                }
            }
        }
    }
}

type DecodedItem = Result<Option<UserRecord>, FlowError>;

/// A structured batch when the payload is an array, otherwise tabular text
/// parsed with the fail-batch policy.
fn decode_payload(payload: &str) -> Result<Vec<DecodedItem>, FlowError> {
    if payload.trim_start().starts_with('[') || payload.trim().is_empty() {
        return decode_batch(payload);
    }

    let batch = parse_users(payload, MalformedRowPolicy::FailBatch)
        .map_err(|e| FlowError::Parse(e.to_string()))?;
    Ok(batch.records.into_iter().map(|user| Ok(Some(user))).collect())
}
