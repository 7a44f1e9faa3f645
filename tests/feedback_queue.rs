//! Feedback flows from the management API through the queue worker into the
//! columnar store

use axum::body::Body;
use http::{Request, StatusCode};
use llm_relay::config::Settings;
use llm_relay::domain::{FeedbackKey, RequestId};
use llm_relay::infrastructure::{ClickHouseClient, ColumnarStore, InMemoryColumnarStore};
use llm_relay::proxy::{AuthConfig, GatewayService, ManagementPipeline, PipelineSet};
use llm_relay::queue::{FeedbackQueue, FeedbackQueueConsumer, QueueWorker};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn feedback_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/feedback")
        .header("host", "api.relay.dev")
        .header("authorization", "Bearer mgmt-key")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_feedback_is_batched_into_store() {
    let settings = Arc::new(Settings::defaults().unwrap());
    let store = Arc::new(InMemoryColumnarStore::new());
    let (queue, receiver) = FeedbackQueue::new(settings.queue.feedback_queue_id.clone());

    let management = Arc::new(ManagementPipeline::new(
        AuthConfig::from_keys(["mgmt-key"]),
        store.clone(),
        queue.clone(),
    ));
    let router = GatewayService::new(
        settings.clone(),
        PipelineSet::new(management.clone(), management),
    )
    .into_router();

    let first = RequestId::generate();
    let second = RequestId::generate();
    for body in [
        json!({"request_id": first, "rating": true}),
        json!({"request_id": second, "rating": false, "properties": {"reason": "off-topic"}}),
    ] {
        let response = router.clone().oneshot(feedback_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let (worker, shutdown) = QueueWorker::new(
        queue.name(),
        FeedbackQueueConsumer::new(store.clone(), settings.queue.feedback_queue_id.clone()),
        receiver,
        &settings.queue,
    );
    let handle = tokio::spawn(worker.run());
    shutdown.send(()).await.unwrap();
    let stats = handle.await.unwrap();

    assert_eq!(stats.acked, 2);
    assert_eq!(stats.dead_lettered, 0);

    let rows = store.feedback();
    assert_eq!(rows.len(), 3);
    let reason = rows
        .iter()
        .find(|row| row.feedback_key == FeedbackKey::try_new("property:reason").unwrap())
        .unwrap();
    assert_eq!(reason.request_id, second);
    assert_eq!(reason.value, json!("off-topic"));
}

#[tokio::test]
async fn test_clickhouse_insert_is_idempotent_on_redelivery() {
    let mut server = Server::new_async().await;
    let insert = server
        .mock("POST", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded(
                "query".into(),
                "INSERT INTO default.feedback FORMAT JSONEachRow".into(),
            ),
            Matcher::Regex("insert_deduplication_token=[0-9a-f]{64}".into()),
        ]))
        .match_header("authorization", Matcher::Regex("^Basic ".into()))
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let settings = Settings::defaults().unwrap();
    let client = ClickHouseClient::new(reqwest::Client::new(), server.url(), settings.clickhouse);
    let records = llm_relay::domain::FeedbackPayload {
        request_id: RequestId::generate(),
        rating: Some(true),
        properties: Default::default(),
        created_at: chrono::Utc::now(),
    }
    .into_records();

    client.upsert_feedback(&records).await.unwrap();
    client.upsert_feedback(&records).await.unwrap();

    insert.assert_async().await;
}
