//! Upload command: store a user file in the upload bucket, which starts the
//! pipeline through the bucket's object-created notification.

use crate::config::UploadConfig;
use crate::storage::{ObjectReference, ObjectSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const KEY_PREFIX: &str = "users/";
pub const DEFAULT_FILENAME: &str = "upload.csv";
pub const DEFAULT_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileCommand {
    pub filename: Option<String>,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFileResponse {
    pub bucket: String,
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

impl UploadFileResponse {
    pub fn object(&self) -> ObjectReference {
        ObjectReference::new(self.bucket.clone(), self.key.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFileError {
    #[error("Uploaded file is empty or missing")]
    ContentRequired,
    #[error("S3 upload failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl UploadFileCommand {
    pub fn validate(&self) -> Result<(), UploadFileError> {
        if self.content.is_empty() {
            return Err(UploadFileError::ContentRequired);
        }
        Ok(())
    }

    /// `users/<filename>`, keeping only the final path component of the
    /// supplied name.
    pub fn object_key(&self) -> String {
        let filename = self
            .filename
            .as_deref()
            .and_then(|name| Path::new(name.trim()).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_FILENAME);
        format!("{}{}", KEY_PREFIX, filename)
    }

    pub fn content_type(&self) -> String {
        self.content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }
}

#[tracing::instrument(skip(source, command), fields(bucket = %config.bucket))]
pub async fn handle(
    source: &dyn ObjectSource,
    config: &UploadConfig,
    command: UploadFileCommand,
) -> Result<UploadFileResponse, UploadFileError> {
    command.validate()?;

    let object = ObjectReference::new(config.bucket.clone(), command.object_key());
    let content_type = command.content_type();

    let upload_result = source
        .put(&object, command.content, Some(content_type))
        .await?;

    info!(
        size = upload_result.size,
        checksum = %upload_result.checksum,
        "Uploaded {}",
        object
    );

    Ok(UploadFileResponse {
        bucket: object.bucket,
        key: upload_result.key,
        checksum: upload_result.checksum,
        size: upload_result.size,
    })
}
