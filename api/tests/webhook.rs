use std::sync::Arc;

use api::routes::ErrorMessage;
use api::routes::webhook::SyncWebhookResponse;
use etl::queue::{JobQueue, MergeJob};
use etl::test_utils::queue::FailingJobQueue;
use reqwest::StatusCode;
use telemetry::init_test_tracing;

use crate::support::test_app::{spawn_test_app, spawn_test_app_with_queue};

mod support {
    pub(crate) mod test_app;
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_cycle_enqueues_one_merge_job() {
    init_test_tracing();
    let (app, queue) = spawn_test_app().await;

    for object in ["contact", "opportunity"] {
        let response = app.send_event("conn-1", object, "SUCCESS").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(queue.stats().await.unwrap().pending, 0);

    let response = app.send_event("conn-1", "account", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: SyncWebhookResponse = response.json().await.unwrap();
    assert_eq!(body.status, "OK");

    assert_eq!(queue.stats().await.unwrap().pending, 1);
    let claimed = queue.claim().await.unwrap().unwrap();
    assert_eq!(claimed.job, MergeJob::new("conn-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsuccessful_events_are_acknowledged_and_ignored() {
    init_test_tracing();
    let (app, queue) = spawn_test_app().await;

    for result in ["FAILURE", "PARTIAL"] {
        for object in ["contact", "opportunity", "account"] {
            let response = app.send_event("conn-1", object, result).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    // Missing result and missing identifiers are ignored too.
    let response = app
        .send_webhook(&serde_json::json!({ "object": "contact" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(queue.stats().await.unwrap(), Default::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_event_without_connection_is_rejected() {
    init_test_tracing();
    let (app, _queue) = spawn_test_app().await;

    let response = app
        .send_webhook(&serde_json::json!({ "object": "contact", "result": "SUCCESS" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = response.json().await.unwrap();
    assert!(body.error.contains("connection_id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_event_without_object_is_rejected() {
    init_test_tracing();
    let (app, _queue) = spawn_test_app().await;

    let response = app
        .send_webhook(&serde_json::json!({ "connection_id": "conn-1", "result": "SUCCESS" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsuccessful_events_with_unexpected_types_are_ignored() {
    init_test_tracing();
    let (app, queue) = spawn_test_app().await;

    for body in [
        serde_json::json!({ "connection_id": 42, "object": "contact", "result": "FAILURE" }),
        serde_json::json!({ "connection_id": "conn-1", "object": ["contact"], "result": null }),
        serde_json::json!({ "connection_id": "conn-1", "object": "contact", "result": 1 }),
    ] {
        let response = app.send_webhook(&body).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(queue.stats().await.unwrap(), Default::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_event_with_non_string_connection_is_rejected() {
    init_test_tracing();
    let (app, _queue) = spawn_test_app().await;

    let response = app
        .send_webhook(&serde_json::json!({
            "connection_id": 42,
            "object": "contact",
            "result": "SUCCESS",
        }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = response.json().await.unwrap();
    assert!(body.error.contains("connection_id"));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_rejected_with_error_message() {
    init_test_tracing();
    let (app, _queue) = spawn_test_app().await;

    let response = app
        .api_client
        .post(format!("{}/webhook", &app.address))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = response.json().await.unwrap();
    assert!(body.error.starts_with("invalid request body"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_object_kind_is_dropped() {
    init_test_tracing();
    let (app, queue) = spawn_test_app().await;

    let response = app.send_event("conn-1", "invoice", "SUCCESS").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.stats().await.unwrap(), Default::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn extra_payload_fields_are_ignored() {
    init_test_tracing();
    let (app, queue) = spawn_test_app().await;

    for object in ["contact", "opportunity", "account"] {
        let response = app
            .send_webhook(&serde_json::json!({
                "connection_id": "conn-1",
                "object": object,
                "result": "SUCCESS",
                "num_records_synced": 12,
                "customer_id": "cust-1",
            }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(queue.stats().await.unwrap().pending, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_failure_returns_internal_error_and_retriggers() {
    init_test_tracing();
    let app = spawn_test_app_with_queue(Arc::new(FailingJobQueue)).await;

    for object in ["contact", "opportunity"] {
        let response = app.send_event("conn-1", object, "SUCCESS").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.send_event("conn-1", "account", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorMessage = response.json().await.unwrap();
    assert_eq!(body.error, "internal server error");

    // Progress was restored, so the next successful event dispatches again.
    let response = app.send_event("conn-1", "contact", "SUCCESS").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
