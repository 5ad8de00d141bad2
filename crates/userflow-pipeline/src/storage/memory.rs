use super::{calculate_sha256, ObjectMetadata, ObjectReference, ObjectSource, UploadResult};
use crate::lock;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Object store held in memory, with per-object failure injection.
#[derive(Debug, Default)]
pub struct InMemoryObjectSource {
    objects: Mutex<HashMap<ObjectReference, StoredObject>>,
    failing_heads: Mutex<HashSet<ObjectReference>>,
    failing_reads: Mutex<HashSet<ObjectReference>>,
    failing_puts: AtomicBool,
}

impl InMemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: ObjectReference, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(
            object,
            StoredObject {
                data: data.into(),
                content_type: None,
            },
        );
    }

    pub fn fail_head_for(&self, object: &ObjectReference) {
        lock(&self.failing_heads).insert(object.clone());
    }

    pub fn fail_read_for(&self, object: &ObjectReference) {
        lock(&self.failing_reads).insert(object.clone());
    }

    pub fn fail_puts(&self) {
        self.failing_puts.store(true, Ordering::SeqCst);
    }

    pub fn content_type(&self, object: &ObjectReference) -> Option<String> {
        lock(&self.objects)
            .get(object)
            .and_then(|o| o.content_type.clone())
    }

    fn stored(&self, object: &ObjectReference) -> Result<StoredObject> {
        lock(&self.objects)
            .get(object)
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: {}", object))
    }
}

#[async_trait]
impl ObjectSource for InMemoryObjectSource {
    async fn head(&self, object: &ObjectReference) -> Result<ObjectMetadata> {
        if lock(&self.failing_heads).contains(object) {
            bail!("Failed to get metadata for {}: access denied", object);
        }
        let stored = self.stored(object)?;
        Ok(ObjectMetadata {
            size: stored.data.len() as i64,
            content_type: stored.content_type,
        })
    }

    async fn read_text(&self, object: &ObjectReference) -> Result<String> {
        if lock(&self.failing_reads).contains(object) {
            bail!("Failed to download {}: connection reset", object);
        }
        let stored = self.stored(object)?;
        String::from_utf8(stored.data).context(format!("Object {} is not valid UTF-8", object))
    }

    async fn put(
        &self,
        object: &ObjectReference,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult> {
        if self.failing_puts.load(Ordering::SeqCst) {
            bail!("Access Denied");
        }
        let result = UploadResult {
            key: object.key.clone(),
            checksum: calculate_sha256(&data),
            size: data.len() as i64,
        };
        lock(&self.objects).insert(object.clone(), StoredObject { data, content_type });
        Ok(result)
    }
}
