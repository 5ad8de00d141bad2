//! AWS adapter integration tests
//!
//! These tests exercise the S3, SNS and DynamoDB adapters against a real or
//! emulated AWS endpoint.
//!
//! **Requirements**:
//! - LocalStack (or AWS) must be running and accessible
//! - AWS_ENDPOINT_URL environment variable must be set (e.g., "http://localhost:4566")
//! - TEST_S3_BUCKET, TEST_SNS_TOPIC_ARN and TEST_DYNAMODB_TABLE name existing resources
//! - Tests will be skipped if AWS_ENDPOINT_URL is not configured
//!
//! **Running tests**:
//! ```bash
//! AWS_ENDPOINT_URL=http://localhost:4566 cargo test --test aws_tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use aws_config::SdkConfig;
use userflow_common::UserRecord;
use userflow_pipeline::aws::AwsSettings;
use userflow_pipeline::config::UploadConfig;
use userflow_pipeline::messaging::{MessagePublisher, SnsPublisher, Topic};
use userflow_pipeline::storage::{ObjectReference, ObjectSource, S3ObjectSource};
use userflow_pipeline::store::{DynamoDbStore, KeyedStore};
use userflow_pipeline::upload::{self, UploadFileCommand};

/// Setup helper that loads AWS settings if an endpoint is available
async fn setup() -> Option<(AwsSettings, SdkConfig)> {
    let endpoint = std::env::var("AWS_ENDPOINT_URL").ok()?;
    let settings = AwsSettings::for_localstack(endpoint);
    let sdk = settings.load().await;
    Some((settings, sdk))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::test]
async fn test_s3_put_head_read() {
    let Some((settings, sdk)) = setup().await else {
        println!("Skipping test: AWS_ENDPOINT_URL not configured");
        return;
    };

    let source = S3ObjectSource::new(settings.s3_client(&sdk));
    let object = ObjectReference::new(
        env_or("TEST_S3_BUCKET", "userflow-test"),
        format!("test/{}.csv", uuid::Uuid::new_v4()),
    );
    let content = "id,name,email\n1,Alice,alice@x.com\n";

    let result = source
        .put(&object, content.as_bytes().to_vec(), Some("text/csv".to_string()))
        .await
        .expect("Upload should succeed");
    assert_eq!(result.size, content.len() as i64);

    let metadata = source.head(&object).await.expect("Head should succeed");
    assert_eq!(metadata.size, content.len() as i64);

    let text = source.read_text(&object).await.expect("Read should succeed");
    assert_eq!(text, content);
}

#[tokio::test]
async fn test_upload_command_against_s3() {
    let Some((settings, sdk)) = setup().await else {
        println!("Skipping test: AWS_ENDPOINT_URL not configured");
        return;
    };

    let source = S3ObjectSource::new(settings.s3_client(&sdk));
    let config = UploadConfig::new(env_or("TEST_S3_BUCKET", "userflow-test"));
    let response = upload::handle(
        &source,
        &config,
        UploadFileCommand {
            filename: Some("aws-test.csv".to_string()),
            content: b"id,name,email\n".to_vec(),
            content_type: None,
        },
    )
    .await
    .expect("Upload should succeed");

    assert_eq!(response.key, "users/aws-test.csv");
}

#[tokio::test]
async fn test_sns_publish() {
    let Some((settings, sdk)) = setup().await else {
        println!("Skipping test: AWS_ENDPOINT_URL not configured");
        return;
    };

    let Ok(arn) = std::env::var("TEST_SNS_TOPIC_ARN") else {
        println!("Skipping test: TEST_SNS_TOPIC_ARN not configured");
        return;
    };

    let publisher = SnsPublisher::new(settings.sns_client(&sdk));
    let topic = Topic::new(arn).unwrap();
    let id = publisher
        .publish(&topic, "id,name,email\n".to_string())
        .await
        .expect("Publish should succeed");
    assert!(!id.as_str().is_empty());
}

#[tokio::test]
async fn test_dynamodb_upsert_twice() {
    let Some((settings, sdk)) = setup().await else {
        println!("Skipping test: AWS_ENDPOINT_URL not configured");
        return;
    };

    let store = DynamoDbStore::new(
        settings.dynamodb_client(&sdk),
        env_or("TEST_DYNAMODB_TABLE", "userflow-test-users"),
    );
    let record = UserRecord::new(uuid::Uuid::new_v4().to_string(), "Alice", "alice@x.com");

    store.upsert(&record).await.expect("First write should succeed");
    store.upsert(&record).await.expect("Second write should succeed");
}
