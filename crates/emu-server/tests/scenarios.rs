//! End-to-end HTTP scenarios from spec.md §8, driven directly against the
//! axum router via `tower::ServiceExt::oneshot` (no socket bound).
//!
//! Grounded in the teacher's integration-test style (`rustpress-server`'s
//! `tests` modules exercising routes through `tower::ServiceExt`) and
//! `original_source/app/servertest/server.go`'s in-process test server
//! idea, adapted to axum's in-memory service testing instead of a real
//! listener.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use emu_server::config::AppConfig;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let (_, router, _) = emu_server::build_app(AppConfig::default());
    router
}

async fn post_form(app: axum::Router, body: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn create_and_send_and_receive_message() {
    let app = test_app();

    let (status, body) = post_form(app.clone(), "Action=CreateQueue&QueueName=orders").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<QueueUrl>"));

    let (status, body) = post_form(
        app.clone(),
        "Action=SendMessage&QueueUrl=orders&MessageBody=hello",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<MessageId>"));

    let (status, body) = post_form(
        app.clone(),
        "Action=ReceiveMessage&QueueUrl=orders&MaxNumberOfMessages=10&WaitTimeSeconds=0",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Body>hello</Body>"));
}

#[tokio::test]
async fn receive_on_missing_queue_is_queue_does_not_exist() {
    let app = test_app();
    let (status, body) = post_form(app, "Action=ReceiveMessage&QueueUrl=nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("QueueDoesNotExist"));
}

#[tokio::test]
async fn unknown_action_is_invalid_action() {
    let app = test_app();
    let (status, body) = post_form(app, "Action=DoesNotExist").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("InvalidAction"));
}

/// S1: delayed message is invisible until the delay elapses.
#[tokio::test]
async fn s1_delay() {
    let app = test_app();
    post_form(app.clone(), "Action=CreateQueue&QueueName=delayed").await;
    post_form(
        app.clone(),
        "Action=SendMessage&QueueUrl=delayed&MessageBody=x&DelaySeconds=1",
    )
    .await;

    let (_, body) = post_form(
        app.clone(),
        "Action=ReceiveMessage&QueueUrl=delayed&WaitTimeSeconds=0",
    )
    .await;
    assert!(!body.contains("<Body>"));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let (_, body) = post_form(app, "Action=ReceiveMessage&QueueUrl=delayed&WaitTimeSeconds=0").await;
    assert!(body.contains("<Body>x</Body>"));
}

/// S3: a long poll wakes up shortly after a message is sent.
#[tokio::test]
async fn s3_long_poll_wakeup() {
    let app = test_app();
    post_form(app.clone(), "Action=CreateQueue&QueueName=lp").await;

    let receiver = tokio::spawn(post_form(
        app.clone(),
        "Action=ReceiveMessage&QueueUrl=lp&WaitTimeSeconds=5",
    ));

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    post_form(app, "Action=SendMessage&QueueUrl=lp&MessageBody=z").await;

    let (status, body) = tokio::time::timeout(std::time::Duration::from_millis(800), receiver)
        .await
        .expect("long poll should wake promptly")
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Body>z</Body>"));
}

/// S4: fan-out respects per-subscription filter policies.
#[tokio::test]
async fn s4_fan_out_and_filter() {
    let app = test_app();
    post_form(app.clone(), "Action=CreateQueue&QueueName=q1").await;
    post_form(app.clone(), "Action=CreateQueue&QueueName=q2").await;
    post_form(app.clone(), "Action=CreateTopic&Name=t").await;
    post_form(
        app.clone(),
        "Action=Subscribe&TopicArn=t&Protocol=sqs&Endpoint=q1&FilterPolicy=%7B%22color%22%3A%5B%22red%22%5D%7D",
    )
    .await;
    post_form(app.clone(), "Action=Subscribe&TopicArn=t&Protocol=sqs&Endpoint=q2").await;

    post_form(
        app.clone(),
        "Action=Publish&TopicArn=t&Message=m&MessageAttribute.1.Name=color&MessageAttribute.1.Value.StringValue=blue&MessageAttribute.1.Value.DataType=String",
    )
    .await;

    let (_, body_q1) = post_form(app.clone(), "Action=ReceiveMessage&QueueUrl=q1&WaitTimeSeconds=0").await;
    assert!(!body_q1.contains("<Message>"));

    let (_, body_q2) = post_form(app, "Action=ReceiveMessage&QueueUrl=q2&WaitTimeSeconds=0").await;
    assert!(body_q2.contains("<Message>"));
}

/// The signing cert is reachable by GET at the path `SigningCertURL` points
/// at, not just assembled as a dead string in the envelope.
#[tokio::test]
async fn signing_cert_is_served_by_get() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(emu_core::signing::SIGNING_CERT_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let pem = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(pem.contains("BEGIN CERTIFICATE"));
}

/// Raw SQS delivery forwards the publish's message attributes onto the
/// delivered queue message instead of dropping them (spec.md §4.3).
#[tokio::test]
async fn raw_sqs_delivery_forwards_attributes() {
    let app = test_app();
    post_form(app.clone(), "Action=CreateQueue&QueueName=q1").await;
    post_form(app.clone(), "Action=CreateTopic&Name=t").await;
    post_form(
        app.clone(),
        "Action=Subscribe&TopicArn=t&Protocol=sqs&Endpoint=q1&RawMessageDelivery=true",
    )
    .await;

    post_form(
        app.clone(),
        "Action=Publish&TopicArn=t&Message=m&MessageAttribute.1.Name=color&MessageAttribute.1.Value.StringValue=blue&MessageAttribute.1.Value.DataType=String",
    )
    .await;

    let (_, body) = post_form(app, "Action=ReceiveMessage&QueueUrl=q1&WaitTimeSeconds=0").await;
    assert!(body.contains("<Name>color</Name>"));
    assert!(body.contains("<StringValue>blue</StringValue>"));
}
