//! End-to-end pipeline tests
//!
//! Each stage is wired to in-memory adapters and fed exactly what the
//! previous stage published, the way the deployed triggers would.
//!
//! **Running tests**:
//! ```bash
//! cargo test --test pipeline_tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use userflow_common::UserRecord;
use userflow_pipeline::config::{
    ConfigSource, FanoutStageConfig, IngestStageConfig, MalformedRowPolicy, PersistStageConfig,
    TransformStageConfig,
};
use userflow_pipeline::events::{ChangeKind, ChangeLogEntry, DynamoDbEvent, S3Event, SnsEvent};
use userflow_pipeline::messaging::{InMemoryBus, Topic};
use userflow_pipeline::simulate::simulate;
use userflow_pipeline::stages::{
    FanoutStage, IngestOutcome, IngestStage, PersistStage, TransformError, TransformStage,
};
use userflow_pipeline::storage::{InMemoryObjectSource, ObjectReference};
use userflow_pipeline::store::InMemoryStore;

const SCENARIO_A_INPUT: &str = "id,name,email\n1,Alice,ALICE@X.COM\n2,Bob,bob@x.com";
const SCENARIO_A_OUTPUT: &str =
    r#"[{"id":"1","name":"Alice","email":"alice@x.com"},{"id":"2","name":"Bob","email":"bob@x.com"}]"#;

struct Pipeline {
    source: Arc<InMemoryObjectSource>,
    bus: Arc<InMemoryBus>,
    store: Arc<InMemoryStore>,
    ingest_topic: Topic,
    transform_topic: Topic,
    fanout_topic: Topic,
    ingest: IngestStage,
    transform: TransformStage,
    persist: PersistStage,
    fanout: FanoutStage,
}

/// Build every stage from one config source, as a deployment would.
fn pipeline(policy: &str) -> Pipeline {
    let config = ConfigSource::from_parts(
        [
            ("SNS_INGEST_TO_TRANSFORM_TOPIC_ARN", "arn:aws:sns:eu-west-1:1:ingest"),
            ("SNS_TRANSFORM_TO_DYNAMO_TOPIC_ARN", "arn:aws:sns:eu-west-1:1:transform"),
            ("SNS_USER_MIGRATION_FANOUT_TOPIC_ARN", "arn:aws:sns:eu-west-1:1:fanout"),
            ("TRANSFORM_MALFORMED_ROWS", policy),
        ],
        [("aws.dynamodb.table", "users")],
    )
    .unwrap();

    let ingest_config = IngestStageConfig::from_source(&config).unwrap();
    let transform_config = TransformStageConfig::from_source(&config).unwrap();
    let persist_config = PersistStageConfig::from_source(&config).unwrap();
    let fanout_config = FanoutStageConfig::from_source(&config).unwrap();

    let source = Arc::new(InMemoryObjectSource::new());
    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryStore::new());

    Pipeline {
        ingest_topic: ingest_config.output_topic.clone(),
        transform_topic: transform_config.output_topic.clone(),
        fanout_topic: fanout_config.fanout_topic.clone(),
        ingest: IngestStage::new(ingest_config, source.clone(), bus.clone()),
        transform: TransformStage::new(transform_config, bus.clone()),
        persist: PersistStage::new(persist_config, store.clone()),
        fanout: FanoutStage::new(fanout_config, bus.clone()),
        source,
        bus,
        store,
    }
}

fn single_message(payload: &str) -> SnsEvent {
    let topic = Topic::new("arn:aws:sns:eu-west-1:1:upstream").unwrap();
    SnsEvent::from_messages(&topic, [("m-1", payload)])
}

// ============================================================================
// Full chain
// ============================================================================

#[tokio::test]
async fn test_upload_to_fanout() {
    let p = pipeline("fail-batch");
    let object = ObjectReference::new("uploads", "users/batch.csv");
    p.source.insert(object.clone(), SCENARIO_A_INPUT);

    let ingest = p
        .ingest
        .handle(&S3Event::object_created("uploads", "users/batch.csv", 53))
        .await;
    assert_eq!(ingest.published(), 1);
    assert_eq!(p.bus.published_to(&p.ingest_topic), vec![SCENARIO_A_INPUT]);

    let transform = p
        .transform
        .handle(&p.bus.sns_event(&p.ingest_topic))
        .await
        .unwrap();
    assert_eq!(transform.records, 2);
    assert_eq!(p.bus.published_to(&p.transform_topic), vec![SCENARIO_A_OUTPUT]);

    let persist = p.persist.handle(&p.bus.sns_event(&p.transform_topic)).await;
    assert_eq!(persist.success_count, 2);
    assert_eq!(persist.failure_count, 0);
    assert_eq!(
        p.store.get("1").unwrap(),
        UserRecord::new("1", "Alice", "alice@x.com")
    );

    let fanout = p
        .fanout
        .handle(&DynamoDbEvent::from_entries(&p.store.drain_changes()))
        .await;
    assert_eq!(fanout.published, 2);
    let notifications = p.bus.published_to(&p.fanout_topic);
    assert!(notifications[0].contains(r#""eventKind":"INSERT""#));
    assert!(notifications[0].contains(r#""keys":{"id":"1"}"#));
}

#[tokio::test]
async fn test_simulate_reports_every_stage() {
    let report = simulate(
        Some("people.csv".to_string()),
        SCENARIO_A_INPUT.as_bytes().to_vec(),
        MalformedRowPolicy::FailBatch,
    )
    .await
    .unwrap();

    assert_eq!(report.upload.key, "users/people.csv");
    assert_eq!(report.ingest.published(), 1);
    assert_eq!(report.persist.success_count, 2);
    assert_eq!(report.stored.len(), 2);
    assert_eq!(report.notifications.len(), 2);

    let text = report.to_string();
    assert!(text.contains("persist:   Written 2 records to DynamoDB (0 failures)"));
    assert!(text.contains("fanout:    Processed 2 DynamoDB stream events"));
}

#[tokio::test]
async fn test_simulate_fails_on_malformed_row_by_default() {
    let result = simulate(
        None,
        b"id,name,email\n1,Alice\n".to_vec(),
        MalformedRowPolicy::FailBatch,
    )
    .await;
    assert!(result.is_err());
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_transform_output() {
    let p = pipeline("fail-batch");
    p.transform
        .handle(&single_message(SCENARIO_A_INPUT))
        .await
        .unwrap();
    assert_eq!(p.bus.published_to(&p.transform_topic), vec![SCENARIO_A_OUTPUT]);
}

#[tokio::test]
async fn test_scenario_b_folder_placeholder_is_skipped() {
    let p = pipeline("fail-batch");
    let summary = p
        .ingest
        .handle(&S3Event::object_created("uploads", "folder/", 0))
        .await;

    assert!(matches!(summary.outcomes[0], IngestOutcome::SkippedFolder(_)));
    assert!(summary.to_string().starts_with("Skipped"));
    assert!(p.bus.published().is_empty());
}

#[tokio::test]
async fn test_scenario_c_empty_object_is_skipped() {
    let p = pipeline("fail-batch");
    p.source
        .insert(ObjectReference::new("uploads", "users/empty.csv"), "");

    let summary = p
        .ingest
        .handle(&S3Event::object_created("uploads", "users/empty.csv", 0))
        .await;

    assert!(matches!(summary.outcomes[0], IngestOutcome::SkippedEmpty(_)));
    assert!(summary.to_string().starts_with("Skipped empty object"));
    assert!(p.bus.published().is_empty());
}

#[tokio::test]
async fn test_scenario_d_bad_message_and_good_message() {
    let p = pipeline("fail-batch");
    let topic = Topic::new("arn:aws:sns:eu-west-1:1:upstream").unwrap();
    let event = SnsEvent::from_messages(
        &topic,
        [
            ("m-1", "[{\"id\": broken"),
            ("m-2", r#"[{"id":"9","name":"Ivy","email":"ivy@x.com"}]"#),
        ],
    );

    let outcome = p.persist.handle(&event).await;
    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.failure_count, 1);
    assert_eq!(outcome.failures[0].message_id, "m-1");
    assert_eq!(outcome.to_string(), "Written 1 records to DynamoDB (1 failures)");
}

#[tokio::test]
async fn test_scenario_e_three_change_entries() {
    let p = pipeline("fail-batch");
    let entries: Vec<ChangeLogEntry> = [
        ("1", ChangeKind::Insert),
        ("2", ChangeKind::Modify),
        ("3", ChangeKind::Remove),
    ]
    .into_iter()
    .map(|(id, kind)| ChangeLogEntry {
        event_id: Some(format!("evt-{}", id)),
        event_kind: kind,
        keys: BTreeMap::from([("id".to_string(), id.to_string())]),
    })
    .collect();

    let summary = p.fanout.handle(&DynamoDbEvent::from_entries(&entries)).await;
    assert_eq!(summary.processed, 3);
    assert!(summary.to_string().starts_with("Processed 3 DynamoDB stream events"));
    assert_eq!(p.bus.published_to(&p.fanout_topic).len(), 3);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_redelivery_is_idempotent_in_the_store() {
    let p = pipeline("fail-batch");
    let event = single_message(SCENARIO_A_OUTPUT);

    p.persist.handle(&event).await;
    p.persist.handle(&event).await;

    assert_eq!(p.store.len(), 2);
    // Only the first delivery changes anything.
    assert_eq!(p.store.drain_changes().len(), 2);
}

#[tokio::test]
async fn test_transform_is_idempotent_in_content() {
    let p = pipeline("fail-batch");
    let event = single_message(SCENARIO_A_INPUT);

    p.transform.handle(&event).await.unwrap();
    p.transform.handle(&event).await.unwrap();

    let published = p.bus.published_to(&p.transform_topic);
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);
}

#[tokio::test]
async fn test_persist_counts_add_up() {
    let p = pipeline("fail-batch");
    p.store.fail_on_id("3");
    let outcome = p
        .persist
        .handle(&single_message(
            r#"[{"id":"1","name":"A","email":"a"},null,{"id":"3","name":"C","email":"c"},{"id":"","name":"D","email":"d"},{"id":"5","name":"E","email":"e"}]"#,
        ))
        .await;

    assert_eq!(outcome.success_count + outcome.failure_count, 5);
    assert_eq!(outcome.success_count, 2);
}

// ============================================================================
// Malformed row policies
// ============================================================================

#[tokio::test]
async fn test_fail_batch_policy_with_one_malformed_row() {
    let p = pipeline("fail-batch");
    let err = p
        .transform
        .handle(&single_message("id,name,email\n1,Alice,a@x.com\n2,Bob\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransformError::Parse { .. }));
    assert!(p.bus.published().is_empty());
}

#[tokio::test]
async fn test_skip_row_policy_with_one_malformed_row() {
    let p = pipeline("skip-row");
    let summary = p
        .transform
        .handle(&single_message("id,name,email\n1,Alice,a@x.com\n2,Bob\n3,Cy,CY@X.COM"))
        .await
        .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.skipped_rows, 1);
    assert_eq!(
        p.bus.published_to(&p.transform_topic),
        vec![r#"[{"id":"1","name":"Alice","email":"a@x.com"},{"id":"3","name":"Cy","email":"cy@x.com"}]"#]
    );
}

#[tokio::test]
async fn test_ingest_processes_every_record() {
    let p = pipeline("fail-batch");
    p.source
        .insert(ObjectReference::new("uploads", "users/a.csv"), "id\n1,a,a@x");
    p.source
        .insert(ObjectReference::new("uploads", "users/b.csv"), "id\n2,b,b@x");

    let mut event = S3Event::object_created("uploads", "users/a.csv", 10);
    event
        .records
        .extend(S3Event::object_created("uploads", "users/b.csv", 10).records);

    let summary = p.ingest.handle(&event).await;
    assert_eq!(summary.published(), 2);
    assert_eq!(p.bus.published_to(&p.ingest_topic).len(), 2);
}
