/// HTTP surface: authentication, tenant scoping and response shapes
mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use realtime_messaging_service::middleware::ADMIN_ROLE;
use realtime_messaging_service::models::Message;
use realtime_messaging_service::routes;
use serde_json::{json, Value};

use common::{seeded_state, token_for, TENANT};

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(routes::configure),
        )
        .await
    };
}

fn bearer(tenant: &str, user: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(tenant, user, None)))
}

#[actix_web::test]
async fn test_health_reports_connections() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["rooms"], 0);
}

#[actix_web::test]
async fn test_conversations_require_token() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/messages/alice").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/messages/alice")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "unauthorized");
}

#[actix_web::test]
async fn test_other_users_inbox_is_forbidden_except_for_admin() {
    let (state, _, _) = seeded_state().await;
    state
        .conversations
        .send(TENANT, Message::new("bob", "alice", "private"))
        .await
        .unwrap();
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/messages/alice")
            .insert_header(bearer(TENANT, "bob"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin = token_for(TENANT, "ops", Some(ADMIN_ROLE));
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/messages/alice")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body[0]["toId"], "bob");
    assert_eq!(body[0]["messages"][0]["text"], "private");
}

#[actix_web::test]
async fn test_tenant_scope_comes_from_token() {
    let (state, _, _) = seeded_state().await;
    state
        .conversations
        .send(TENANT, Message::new("bob", "alice", "tenant a only"))
        .await
        .unwrap();
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/messages/alice")
            .insert_header(bearer("tenant-b", "alice"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!([]));
}

#[actix_web::test]
async fn test_send_msg_persists_and_pushes() {
    let (state, _, gateway) = seeded_state().await;
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/messages/send_msg")
            .insert_header(bearer(TENANT, "alice"))
            .set_json(json!({
                "tenantId": TENANT,
                "message": { "fromId": "alice", "toId": "bob", "text": "over http" }
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["id"].as_str().is_some());
    assert_eq!(body["read"], false);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/messages/bob/alice")
            .insert_header(bearer(TENANT, "bob"))
            .to_request(),
    )
    .await;
    let conversation: Value = test::read_body_json(resp).await;
    assert_eq!(conversation["toId"], "alice");
    assert_eq!(conversation["messages"][0]["id"], body["id"]);

    // The push runs detached from the request
    for _ in 0..50 {
        if !gateway.sent().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(gateway.sent()[0].1.to, "bob-device-token");
}

#[actix_web::test]
async fn test_send_msg_rejects_impersonation_and_bad_input() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);

    let spoofed = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/messages/send_msg")
            .insert_header(bearer(TENANT, "alice"))
            .set_json(json!({
                "tenantId": TENANT,
                "message": { "fromId": "bob", "toId": "alice", "text": "hi" }
            }))
            .to_request(),
    )
    .await;
    assert_eq!(spoofed.status(), StatusCode::FORBIDDEN);

    let empty = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/messages/send_msg")
            .insert_header(bearer(TENANT, "alice"))
            .set_json(json!({
                "tenantId": TENANT,
                "message": { "fromId": "alice", "toId": "bob", "text": "" }
            }))
            .to_request(),
    )
    .await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_admin_sends_from_admin_inbox() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);
    let admin = token_for(TENANT, "ops", Some(ADMIN_ROLE));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/messages/send_msg")
            .insert_header(("Authorization", format!("Bearer {admin}")))
            .set_json(json!({
                "tenantId": TENANT,
                "message": { "fromId": "admin", "toId": "alice", "text": "welcome" }
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn test_delete_only_by_sender() {
    let (state, _, _) = seeded_state().await;
    let sent = state
        .conversations
        .send(TENANT, Message::new("alice", "bob", "oops"))
        .await
        .unwrap();
    let id = sent.id.unwrap();
    let app = app!(state);

    let by_recipient = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/messages/{id}"))
            .insert_header(bearer(TENANT, "bob"))
            .to_request(),
    )
    .await;
    assert_eq!(by_recipient.status(), StatusCode::FORBIDDEN);

    let by_sender = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/messages/{id}"))
            .insert_header(bearer(TENANT, "alice"))
            .to_request(),
    )
    .await;
    assert_eq!(by_sender.status(), StatusCode::NO_CONTENT);

    let again = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/messages/{id}"))
            .insert_header(bearer(TENANT, "alice"))
            .to_request(),
    )
    .await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_like_notification_report() {
    let (state, _, gateway) = seeded_state().await;
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/notifications/like")
            .insert_header(bearer(TENANT, "alice"))
            .set_json(json!({
                "senderId": "alice",
                "recipientId": "bob",
                "postId": "post-7",
                "url": "https://app.example.com/p/post-7",
                "tags": ["Bob", "nobody"]
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["recipient"]["status"], "delivered");
    assert_eq!(report["tags"][0]["tag"], "Bob");
    assert_eq!(report["tags"][0]["outcome"]["status"], "delivered");
    assert_eq!(report["tags"][1]["outcome"]["status"], "skipped");

    let sent = gateway.sent();
    assert_eq!(sent[0].1.notification.body, "liked your post");
    assert_eq!(sent[0].1.data["postId"], "post-7");
    assert_eq!(sent[1].1.notification.body, "mentioned you in a post");
    assert_eq!(sent[1].1.data["url"], "https://app.example.com/p/post-7");
}

#[actix_web::test]
async fn test_notification_requires_matching_sender() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/notifications/comment")
            .insert_header(bearer(TENANT, "bob"))
            .set_json(json!({
                "senderId": "alice",
                "recipientId": "bob",
                "postId": "post-7",
                "commentText": "forged"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_ws_handshake_rejects_mismatched_identity() {
    let (state, _, _) = seeded_state().await;
    let app = app!(state);

    let token = token_for(TENANT, "alice", None);
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/ws?tenantId={TENANT}&userId=bob&token={token}"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/ws?userId=alice&token={token}"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
