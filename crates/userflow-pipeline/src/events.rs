//! Trigger payloads delivered to the stages
//!
//! These mirror the JSON the platform hands to an event-driven function:
//! object-created notifications, topic deliveries and change-feed batches.
//! Unknown fields are ignored and a missing `Records` array reads as empty.

use crate::messaging::Topic;
use crate::storage::ObjectReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use userflow_common::{FlowError, Result};

// ============================================================================
// Object-created notifications
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl S3Event {
    /// Notification for a single newly created object.
    pub fn object_created(bucket: impl Into<String>, key: impl Into<String>, size: i64) -> Self {
        Self {
            records: vec![S3EventRecord {
                event_name: Some("ObjectCreated:Put".to_string()),
                event_time: Some(Utc::now()),
                s3: Some(S3Entity {
                    bucket: S3Bucket { name: bucket.into() },
                    object: S3Object {
                        key: key.into(),
                        size: Some(size),
                    },
                }),
            }],
        }
    }
}

impl S3EventRecord {
    /// Bucket and decoded key, or `None` when the record has no object detail.
    pub fn object_reference(&self) -> Option<ObjectReference> {
        let s3 = self.s3.as_ref()?;
        if s3.bucket.name.trim().is_empty() || s3.object.key.is_empty() {
            return None;
        }
        Some(ObjectReference::new(
            s3.bucket.name.clone(),
            decode_object_key(&s3.object.key),
        ))
    }
}

/// Notification keys are form-encoded: `+` is a space and the rest is
/// percent-encoded. A key that does not decode is used as delivered.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

// ============================================================================
// Topic deliveries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SnsEventRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnsEventRecord {
    #[serde(rename = "Sns", default)]
    pub sns: SnsMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_arn: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SnsEvent {
    pub fn from_messages<'a>(
        topic: &Topic,
        messages: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            records: messages
                .into_iter()
                .map(|(id, payload)| SnsEventRecord {
                    sns: SnsMessage {
                        message_id: Some(id.to_string()),
                        topic_arn: Some(topic.to_string()),
                        message: Some(payload.to_string()),
                    },
                })
                .collect(),
        }
    }
}

impl SnsEventRecord {
    pub fn message_id(&self) -> &str {
        self.sns.message_id.as_deref().unwrap_or("unknown")
    }

    pub fn payload(&self) -> &str {
        self.sns.message.as_deref().unwrap_or_default()
    }
}

// ============================================================================
// Change feed
// ============================================================================

/// Kind of mutation reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Modify => write!(f, "MODIFY"),
            ChangeKind::Remove => write!(f, "REMOVE"),
            ChangeKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamoDbEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<DynamoDbEventRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamoDbEventRecord {
    #[serde(rename = "eventID", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "eventName", default)]
    pub event_name: ChangeKind,
    #[serde(default)]
    pub dynamodb: Option<StreamRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamRecord {
    #[serde(default)]
    pub keys: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

/// One entry of the change feed with its key attributes flattened to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub event_id: Option<String>,
    pub event_kind: ChangeKind,
    pub keys: BTreeMap<String, String>,
}

impl DynamoDbEventRecord {
    /// `None` when the record carries no stream detail.
    pub fn entry(&self) -> Option<ChangeLogEntry> {
        let stream = self.dynamodb.as_ref()?;
        Some(ChangeLogEntry {
            event_id: self.event_id.clone(),
            event_kind: self.event_name,
            keys: stream
                .keys
                .iter()
                .map(|(name, value)| (name.clone(), flatten_attribute(value)))
                .collect(),
        })
    }
}

impl DynamoDbEvent {
    pub fn from_entries(entries: &[ChangeLogEntry]) -> Self {
        Self {
            records: entries
                .iter()
                .map(|entry| DynamoDbEventRecord {
                    event_id: entry.event_id.clone(),
                    event_name: entry.event_kind,
                    dynamodb: Some(StreamRecord {
                        keys: entry
                            .keys
                            .iter()
                            .map(|(k, v)| (k.clone(), serde_json::json!({ "S": v })))
                            .collect(),
                        sequence_number: None,
                    }),
                })
                .collect(),
        }
    }
}

/// Typed attribute values such as `{"S": "42"}` become `"42"`. Anything
/// without a single scalar type tag is rendered as compact JSON.
fn flatten_attribute(value: &Value) -> String {
    if let Value::Object(map) = value {
        if map.len() == 1 {
            if let Some((tag, inner)) = map.iter().next() {
                match (tag.as_str(), inner) {
                    ("S" | "N" | "B", Value::String(s)) => return s.clone(),
                    ("BOOL", Value::Bool(b)) => return b.to_string(),
                    ("NULL", _) => return "null".to_string(),
                    _ => {}
                }
            }
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Which stage a trigger is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StageKind {
    Ingest,
    Transform,
    Persist,
    Fanout,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Ingest => write!(f, "ingest"),
            StageKind::Transform => write!(f, "transform"),
            StageKind::Persist => write!(f, "persist"),
            StageKind::Fanout => write!(f, "fanout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ObjectCreated(S3Event),
    Message(SnsEvent),
    ChangeFeed(DynamoDbEvent),
}

impl PipelineEvent {
    /// Parse a trigger document for `stage`. A `null` document is an event
    /// with no records.
    pub fn parse(stage: StageKind, json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Err(FlowError::InvalidInput(format!(
                "no event document supplied for the {} stage",
                stage
            )));
        }
        let event = match stage {
            StageKind::Ingest => PipelineEvent::ObjectCreated(
                serde_json::from_str::<Option<S3Event>>(json)?.unwrap_or_default(),
            ),
            StageKind::Transform | StageKind::Persist => PipelineEvent::Message(
                serde_json::from_str::<Option<SnsEvent>>(json)?.unwrap_or_default(),
            ),
            StageKind::Fanout => PipelineEvent::ChangeFeed(
                serde_json::from_str::<Option<DynamoDbEvent>>(json)?.unwrap_or_default(),
            ),
        };
        Ok(event)
    }

    pub fn record_count(&self) -> usize {
        match self {
            PipelineEvent::ObjectCreated(e) => e.records.len(),
            PipelineEvent::Message(e) => e.records.len(),
            PipelineEvent::ChangeFeed(e) => e.records.len(),
        }
    }
}
