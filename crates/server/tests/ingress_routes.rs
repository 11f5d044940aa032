mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use relay_server::bootstrap::Application;
use relay_server::ingress::{router, IngressState};
use serde_json::{json, Value};
use support::{app, FakePlatform, BOT_ID, ROOM_ID};
use tower::ServiceExt;

const WEBHOOK_PATH: &str = "/webhooks/webex";

fn routes(app: &Application) -> Router {
    router(
        IngressState {
            hydrator: app.hydrator.clone(),
            runner: app.runner.clone(),
            conversations: app.conversations.clone(),
            service: "relay".to_owned(),
            started_at: Instant::now(),
        },
        WEBHOOK_PATH,
    )
}

fn notification(resource: &str, data: Value) -> Request<Body> {
    let body = json!({
        "id": "webhook-1",
        "resource": resource,
        "event": "created",
        "actorId": data["personId"],
        "data": data,
    });
    Request::builder()
        .method("POST")
        .uri(WEBHOOK_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn wait_for_reply(platform: &FakePlatform) -> Option<Value> {
    wait_for_replies(platform, 1).await.pop()
}

async fn wait_for_replies(platform: &FakePlatform, count: usize) -> Vec<Value> {
    for _ in 0..200 {
        let replies = platform.sent_to("roomId");
        if replies.len() >= count {
            return replies;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    platform.sent_to("roomId")
}

fn stored_text(platform: &FakePlatform, id: &str, text: &str) {
    platform.store_message(
        id,
        json!({
            "id": id,
            "roomId": ROOM_ID,
            "personId": "alice-id",
            "personEmail": "alice@example.com",
            "text": text,
        }),
    );
}

#[tokio::test]
async fn message_notification_is_accepted_and_dispatched() {
    let platform = Arc::new(FakePlatform::new());
    stored_text(&platform, "m1", "echo hello there");
    let app = app(&platform).await;

    let response = routes(&app)
        .oneshot(notification("messages", json!({ "id": "m1", "personId": "alice-id", "roomId": ROOM_ID })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let reply = wait_for_reply(&platform).await.expect("echo reply");
    assert_eq!(reply["markdown"], "hello there");
    assert_eq!(reply["roomId"], ROOM_ID);
}

#[tokio::test]
async fn bot_authored_message_is_ignored_without_fetch() {
    let platform = Arc::new(FakePlatform::new());
    let app = app(&platform).await;

    let response = routes(&app)
        .oneshot(notification("messages", json!({ "id": "m2", "personId": BOT_ID, "roomId": ROOM_ID })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.runner.active_senders(), 0);
}

#[tokio::test]
async fn same_sender_replies_follow_arrival_order_when_a_fetch_is_slow() {
    let platform =
        Arc::new(FakePlatform::new().delaying_message("m1", Duration::from_millis(300)));
    stored_text(&platform, "m1", "echo first");
    stored_text(&platform, "m2", "echo second");
    let app = app(&platform).await;
    let routes = routes(&app);

    let first = tokio::spawn(routes.clone().oneshot(notification(
        "messages",
        json!({ "id": "m1", "personId": "alice-id", "roomId": ROOM_ID }),
    )));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = routes
        .oneshot(notification("messages", json!({ "id": "m2", "personId": "alice-id", "roomId": ROOM_ID })))
        .await
        .expect("response");
    let first = first.await.expect("join").expect("response");

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let replies: Vec<Value> =
        wait_for_replies(&platform, 2).await.into_iter().map(|reply| reply["markdown"].clone()).collect();
    assert_eq!(replies, vec![json!("first"), json!("second")]);
}

#[tokio::test]
async fn unknown_message_is_accepted_and_dropped_by_the_worker() {
    let platform = Arc::new(FakePlatform::new());
    let app = app(&platform).await;

    let response = routes(&app)
        .oneshot(notification("messages", json!({ "id": "missing", "personId": "alice-id" })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(platform.sent().is_empty());
}

#[tokio::test]
async fn submission_after_shutdown_is_refused() {
    let platform = Arc::new(FakePlatform::new());
    platform.store_action(
        "a1",
        json!({
            "id": "a1",
            "personId": "alice-id",
            "roomId": ROOM_ID,
            "messageId": "card-1",
            "inputs": { "message": "hi", "callback_keyword": "echo_callback" },
        }),
    );
    let app = app(&platform).await;
    app.runner.shutdown();

    let response = routes(&app)
        .oneshot(notification("attachmentActions", json!({ "id": "a1", "personId": "alice-id" })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_runtime_state() {
    let platform = Arc::new(FakePlatform::new());
    let app = app(&platform).await;

    let response = routes(&app)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(payload["status"], "ready");
    assert_eq!(payload["service"], "relay");
    assert_eq!(payload["pending_chains"], 0);
}
