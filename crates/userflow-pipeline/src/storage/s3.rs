use super::{calculate_sha256, ObjectMetadata, ObjectReference, ObjectSource, UploadResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3ObjectSource {
    client: Client,
}

impl S3ObjectSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectSource for S3ObjectSource {
    #[instrument(skip(self))]
    async fn head(&self, object: &ObjectReference) -> Result<ObjectMetadata> {
        debug!("Getting metadata for {}", object);

        let response = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .context(format!("Failed to get metadata from S3: {}", object))?;

        Ok(ObjectMetadata {
            size: response.content_length().unwrap_or(0),
            content_type: response.content_type().map(|s| s.to_string()),
        })
    }

    #[instrument(skip(self))]
    async fn read_text(&self, object: &ObjectReference) -> Result<String> {
        debug!("Downloading {}", object);

        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .context(format!("Failed to download from S3: {}", object))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from {}", data.len(), object);

        String::from_utf8(data).context(format!("Object {} is not valid UTF-8", object))
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        object: &ObjectReference,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to {}", size, object);

        let mut request = self
            .client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.context("Failed to upload to S3")?;

        info!("Successfully uploaded to {}", object);

        Ok(UploadResult {
            key: object.key.clone(),
            checksum,
            size,
        })
    }
}
