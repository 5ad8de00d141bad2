//! Object storage
//!
//! The ingest stage reads uploaded objects through [`ObjectSource`]; the
//! upload command writes through it. [`S3ObjectSource`] talks to S3 and
//! [`InMemoryObjectSource`] backs local runs and tests.

mod memory;
mod s3;

pub use memory::InMemoryObjectSource;
pub use s3::S3ObjectSource;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucket and decoded key of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
}

impl ObjectReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Keys ending in `/` are folder placeholders and carry no data.
    pub fn is_folder_placeholder(&self) -> bool {
        self.key.ends_with('/')
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: i64,
    pub content_type: Option<String>,
}

impl ObjectMetadata {
    pub fn is_empty(&self) -> bool {
        self.size <= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn head(&self, object: &ObjectReference) -> Result<ObjectMetadata>;

    /// Full object content decoded as UTF-8.
    async fn read_text(&self, object: &ObjectReference) -> Result<String>;

    async fn put(
        &self,
        object: &ObjectReference,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult>;
}

pub(crate) fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
