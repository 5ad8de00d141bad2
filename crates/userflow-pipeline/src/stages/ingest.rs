//! Ingest stage: forward the content of each newly created object to the
//! transform topic, unchanged.

use crate::config::IngestStageConfig;
use crate::events::{S3Event, S3EventRecord};
use crate::messaging::{MessageId, MessagePublisher};
use crate::storage::{ObjectReference, ObjectSource};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one record of an object-created notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Published {
        object: ObjectReference,
        message_id: MessageId,
    },
    SkippedFolder(ObjectReference),
    SkippedEmpty(ObjectReference),
    SkippedBlank(ObjectReference),
    InspectFailed {
        object: ObjectReference,
        error: String,
    },
    ProcessingError {
        object: ObjectReference,
        error: String,
    },
    /// The record did not identify an object.
    Invalid { index: usize, reason: String },
}

impl IngestOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, IngestOutcome::Published { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            IngestOutcome::SkippedFolder(_)
                | IngestOutcome::SkippedEmpty(_)
                | IngestOutcome::SkippedBlank(_)
        )
    }

    pub fn is_failed(&self) -> bool {
        !self.is_published() && !self.is_skipped()
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Published { object, message_id } => {
                write!(f, "Successfully published {} to SNS as message {}", object, message_id)
            }
            IngestOutcome::SkippedFolder(object) => {
                write!(f, "Skipped folder placeholder {}", object)
            }
            IngestOutcome::SkippedEmpty(object) => write!(f, "Skipped empty object {}", object),
            IngestOutcome::SkippedBlank(object) => {
                write!(f, "Skipped object with blank content {}", object)
            }
            IngestOutcome::InspectFailed { object, error } => {
                write!(f, "Failed to inspect {}: {}", object, error)
            }
            IngestOutcome::ProcessingError { object, error } => {
                write!(f, "Error processing {}: {}", object, error)
            }
            IngestOutcome::Invalid { index, reason } => {
                write!(f, "Invalid S3 record #{}: {}", index, reason)
            }
        }
    }
}

/// Per-record outcomes of one invocation, in event order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestSummary {
    pub fn published(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_published()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcomes.as_slice() {
            [] => write!(f, "No S3 records to process"),
            [single] => write!(f, "{}", single),
            outcomes => write!(
                f,
                "Processed {} S3 records (published={}, skipped={}, failed={})",
                outcomes.len(),
                self.published(),
                self.skipped(),
                self.failed()
            ),
        }
    }
}

pub struct IngestStage {
    config: IngestStageConfig,
    source: Arc<dyn ObjectSource>,
    publisher: Arc<dyn MessagePublisher>,
}

impl IngestStage {
    pub fn new(
        config: IngestStageConfig,
        source: Arc<dyn ObjectSource>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
        }
    }

    /// Process every record of the notification. Failures are confined to
    /// the record they occur in.
    #[instrument(skip_all, fields(records = event.records.len()))]
    pub async fn handle(&self, event: &S3Event) -> IngestSummary {
        if event.records.is_empty() {
            warn!("S3 event contained no records. Nothing to process.");
            return IngestSummary::default();
        }

        let mut summary = IngestSummary::default();
        for (index, record) in event.records.iter().enumerate() {
            summary.outcomes.push(self.ingest_record(index, record).await);
        }

        info!(
            published = summary.published(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Finished processing S3 event"
        );

        summary
    }

    async fn ingest_record(&self, index: usize, record: &S3EventRecord) -> IngestOutcome {
        let Some(object) = record.object_reference() else {
            warn!(index, "S3 event record is missing S3 details");
            return IngestOutcome::Invalid {
                index,
                reason: "record is missing S3 bucket or object details".to_string(),
            };
        };

        info!(bucket = %object.bucket, key = %object.key, "Processing S3 object");

        if object.is_folder_placeholder() {
            info!("Skipping S3 folder placeholder: {}", object);
            return IngestOutcome::SkippedFolder(object);
        }

        let metadata = match self.source.head(&object).await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to get metadata for {}", object);
                return IngestOutcome::InspectFailed {
                    error: format!("{:#}", e),
                    object,
                };
            }
        };

        if metadata.is_empty() {
            info!("Skipping empty S3 object (0 bytes): {}", object);
            return IngestOutcome::SkippedEmpty(object);
        }

        let content = match self.source.read_text(&object).await {
            Ok(content) => content,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to read {}", object);
                return IngestOutcome::ProcessingError {
                    error: format!("{:#}", e),
                    object,
                };
            }
        };

        if content.trim().is_empty() {
            warn!("S3 object content is blank, skipping: {}", object);
            return IngestOutcome::SkippedBlank(object);
        }

        debug!(bytes = content.len(), "Object content: {}", content);

        match self
            .publisher
            .publish(&self.config.output_topic, content)
            .await
        {
            Ok(message_id) => {
                info!(
                    message_id = %message_id,
                    topic = %self.config.output_topic,
                    "Published {} to SNS",
                    object
                );
                IngestOutcome::Published { object, message_id }
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to publish {}", object);
                IngestOutcome::ProcessingError {
                    error: format!("{:#}", e),
                    object,
                }
            }
        }
    }
}
