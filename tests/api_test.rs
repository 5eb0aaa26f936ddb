use std::sync::Arc;

use adoption_chat::{
    middleware::auth::issue_token,
    models::account::Account,
    routes,
    store::{MemoryAccountDirectory, MemoryChatStore},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

struct TestApp {
    app: Router,
    store: MemoryChatStore,
    user: Account,
    shelter: Account,
}

fn setup_app() -> TestApp {
    let user = Account::new(Uuid::new_v4(), "Ana", false);
    let shelter = Account::new(Uuid::new_v4(), "Refugio Patitas", true);
    let store = MemoryChatStore::new();
    let directory = MemoryAccountDirectory::with_accounts([user.clone(), shelter.clone()]);
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(directory),
        None,
        SECRET,
        "https://adopt.example",
    );
    TestApp {
        app: routes::router(state, 1000),
        store,
        user,
        shelter,
    }
}

fn bearer(account_id: Uuid) -> String {
    let token = issue_token(SECRET, account_id, chrono::Duration::minutes(10)).expect("token");
    format!("Bearer {}", token)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<Uuid>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = caller {
        builder = builder.header(header::AUTHORIZATION, bearer(id));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

#[tokio::test]
async fn adoption_chat_round_trip_over_http() {
    let t = setup_app();
    let animal = Uuid::new_v4();

    let payload = json!({ "shelter_id": t.shelter.id, "animal_id": animal, "animal_name": "Luna" });
    let (status, body) = call(&t.app, "POST", "/api/chats", Some(t.user.id), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    assert_eq!(body["message"]["content"], "I'm interested in adopting Luna");
    let chat_id = body["chat_id"].as_str().unwrap().to_string();

    let (status, body) = call(&t.app, "POST", "/api/chats", Some(t.user.id), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
    assert!(body["message"].is_null());

    let (status, body) = call(&t.app, "GET", "/api/chats/unread", Some(t.shelter.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, inbox) = call(&t.app, "GET", "/api/chats", Some(t.shelter.id), None).await;
    assert_eq!(inbox[0]["counterpart"]["display_name"], "Ana");
    assert_eq!(inbox[0]["unread_count"], 1);
    assert_eq!(inbox[0]["role"], "shelter");

    let (status, reply) = call(
        &t.app,
        "POST",
        &format!("/api/chats/{}/messages", chat_id),
        Some(t.shelter.id),
        Some(json!({ "content": "Come visit on Saturday" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["read"], false);

    let (status, opened) = call(
        &t.app,
        "POST",
        &format!("/api/chats/{}/open", chat_id),
        Some(t.shelter.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["messages_marked_read"], 1);

    let (_, body) = call(&t.app, "GET", "/api/chats/unread", Some(t.shelter.id), None).await;
    assert_eq!(body["count"], 0);
    let (_, body) = call(&t.app, "GET", "/api/chats/unread", Some(t.user.id), None).await;
    assert_eq!(body["count"], 1);

    let (status, messages) = call(
        &t.app,
        "GET",
        &format!("/api/chats/{}/messages", chat_id),
        Some(t.user.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["read"], true);
    assert_eq!(messages[1]["content"], "Come visit on Saturday");

    let (status, detail) = call(&t.app, "GET", &format!("/api/chats/{}", chat_id), Some(t.user.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["shelter"]["display_name"], "Refugio Patitas");
    assert_eq!(detail["animal_name"], "Luna");
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let t = setup_app();

    let (status, body) = call(&t.app, "GET", "/api/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let req = Request::builder()
        .uri("/api/chats")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = call(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn send_errors_map_to_statuses() {
    let t = setup_app();
    let (_, body) = call(
        &t.app,
        "POST",
        "/api/chats",
        Some(t.user.id),
        Some(json!({ "shelter_id": t.shelter.id, "with_interest_message": false })),
    )
    .await;
    assert!(body["message"].is_null());
    let chat_id = body["chat_id"].as_str().unwrap().to_string();
    let uri = format!("/api/chats/{}/messages", chat_id);

    let (status, body) = call(&t.app, "POST", &uri, Some(t.user.id), Some(json!({ "content": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["retryable"], false);

    let (status, _) = call(&t.app, "POST", &uri, Some(Uuid::new_v4()), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &t.app,
        "POST",
        &format!("/api/chats/{}/messages", Uuid::new_v4()),
        Some(t.user.id),
        Some(json!({ "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    t.store.set_unavailable(true);
    let (status, body) = call(&t.app, "POST", &uri, Some(t.user.id), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn push_token_registration() {
    let t = setup_app();
    let uri = "/api/accounts/me/push-token";

    let (status, body) = call(&t.app, "PUT", uri, Some(t.shelter.id), Some(json!({ "token": "player-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscribed"], true);

    let (_, body) = call(&t.app, "PUT", uri, Some(t.shelter.id), Some(json!({ "token": null }))).await;
    assert_eq!(body["subscribed"], false);

    let (status, _) = call(&t.app, "PUT", uri, Some(Uuid::new_v4()), Some(json!({ "token": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_store_backend() {
    let t = setup_app();

    let (status, body) = call(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");

    t.store.set_unavailable(true);
    let (status, body) = call(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["store"], "memory");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn openapi_document_lists_chat_routes() {
    let t = setup_app();
    let (status, doc) = call(&t.app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/chats/{id}/open"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
}
