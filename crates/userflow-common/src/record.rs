//! The user record carried between pipeline stages
//!
//! A [`UserRecord`] is the unit of persistence. Its identity is `id`: writing
//! the same `id` twice replaces the stored row instead of adding a second one.
//!
//! On the wire a batch of records is a JSON array of objects with the string
//! fields `id`, `name` and `email`, in that order:
//!
//! ```text
//! [{"id":"1","name":"Alice","email":"alice@x.com"}]
//! ```

use crate::error::{FlowError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One user row, as produced by the transform stage and stored by the
/// persistence stage.
///
/// Missing or `null` fields decode as empty strings so that a single
/// incomplete element is rejected by [`UserRecord::validate`]. Numbers and
/// booleans are accepted in place of strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "scalar_text")]
    pub id: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub email: String,
}

fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::Bool(flag)) => Ok(flag.to_string()),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string field, found {}",
            other
        ))),
    }
}

impl UserRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Apply field normalization: the email address is lowercased.
    pub fn normalized(mut self) -> Self {
        self.email = self.email.to_lowercase();
        self
    }

    /// Minimal shape check before a record is written to the store.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FlowError::InvalidRecord(
                "record id is required and cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decode a structured payload into a batch of records.
///
/// Only a payload that is not a JSON array fails as a whole. Each element is
/// decoded on its own: `null` becomes `None` and an element of the wrong
/// shape becomes an `Err`, so callers can count both as individual failures.
pub fn decode_batch(payload: &str) -> Result<Vec<Result<Option<UserRecord>>>> {
    if payload.trim().is_empty() {
        return Err(FlowError::InvalidInput("message payload is empty".to_string()));
    }
    let elements: Vec<Value> = serde_json::from_str(payload)?;
    Ok(elements
        .into_iter()
        .map(|element| serde_json::from_value(element).map_err(FlowError::from))
        .collect())
}

/// Encode a batch of records as one structured payload.
pub fn encode_batch(records: &[UserRecord]) -> Result<String> {
    Ok(serde_json::to_string(records)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_lowercases_email_only() {
        let record = UserRecord::new("1", "Alice", "ALICE@X.COM").normalized();
        assert_eq!(record.name, "Alice");
        assert_eq!(record.email, "alice@x.com");
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        assert!(UserRecord::new("  ", "Alice", "a@x.com").validate().is_err());
        assert!(UserRecord::new("1", "", "").validate().is_ok());
    }

    #[test]
    fn test_encode_keeps_field_order() {
        let json = encode_batch(&[
            UserRecord::new("1", "Alice", "alice@x.com"),
            UserRecord::new("2", "Bob", "bob@x.com"),
        ])
        .unwrap();
        assert_eq!(
            json,
            r#"[{"id":"1","name":"Alice","email":"alice@x.com"},{"id":"2","name":"Bob","email":"bob@x.com"}]"#
        );
    }

    #[test]
    fn test_decode_batch_with_null_and_partial_elements() {
        let batch = decode_batch(r#"[{"id":"1","name":"A","email":"a@x.com"},null,{"name":"B"}]"#)
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[1].as_ref().unwrap().is_none());
        let partial = batch[2].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(partial.id, "");
        assert!(partial.validate().is_err());
    }

    #[test]
    fn test_decode_batch_isolates_badly_shaped_elements() {
        let batch = decode_batch(
            r#"[{"id":2,"name":"Bob","email":"b@x.com"},"garbage",{"id":["x"]},{"id":"3","name":null}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 4);

        let numeric = batch[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(numeric, &UserRecord::new("2", "Bob", "b@x.com"));
        assert!(matches!(batch[1], Err(FlowError::Serialization(_))));
        assert!(matches!(batch[2], Err(FlowError::Serialization(_))));
        assert_eq!(batch[3].as_ref().unwrap().as_ref().unwrap().name, "");
    }

    #[test]
    fn test_decode_batch_rejects_blank_and_malformed() {
        assert!(matches!(decode_batch("   "), Err(FlowError::InvalidInput(_))));
        assert!(matches!(decode_batch("not json"), Err(FlowError::Serialization(_))));
        assert!(matches!(
            decode_batch(r#"{"id":"1"}"#),
            Err(FlowError::Serialization(_))
        ));
    }
}
