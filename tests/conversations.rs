mod common;

use airwatch::models::Role;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn create_conversation_with_and_without_title() {
    let app = common::spawn_app().await;

    let response = app
        .api_client
        .post(app.url("/conversations"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let untitled: Value = response.json().await.unwrap();
    assert_eq!(untitled["title"], "New Chat");
    assert!(untitled["createdAt"].is_string());

    let id = app.create_conversation("Itwari smog").await;
    let response = app
        .api_client
        .get(app.url("/conversations"))
        .send()
        .await
        .unwrap();
    let list: Vec<Value> = response.json().await.unwrap();
    assert_eq!(list.len(), 2);
    // newest first
    assert_eq!(list[0]["id"], id);
    assert_eq!(list[0]["title"], "Itwari smog");
}

#[tokio::test]
async fn invalid_conversation_body_is_rejected() {
    let app = common::spawn_app().await;

    let response = app
        .api_client
        .post(app.url("/conversations"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .api_client
        .post(app.url("/conversations"))
        .json(&json!({ "title": "x".repeat(300) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn get_and_delete_conversation() {
    let app = common::spawn_app().await;
    let id = app.create_conversation("Air").await;

    let response = app
        .api_client
        .get(app.url(&format!("/conversations/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], id);
    assert_eq!(body["messages"], json!([]));

    let response = app
        .api_client
        .delete(app.url(&format!("/conversations/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    for _ in 0..2 {
        let response = app
            .api_client
            .get(app.url(&format!("/conversations/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
    let response = app
        .api_client
        .delete(app.url(&format!("/conversations/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn message_reply_is_streamed_and_persisted() {
    let app = common::spawn_app().await;
    app.mount_completion(&["AQI", " is..."]).await;
    let id = app.create_conversation("Air").await;

    let response = app
        .api_client
        .post(app.url(&format!("/conversations/{}/messages", id)))
        .json(&json!({ "content": "What is AQI?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let body = response.text().await.unwrap();
    assert_eq!(
        body,
        "data: {\"content\":\"AQI\"}\ndata: {\"content\":\" is...\"}\ndata: {\"content\":\"\",\"done\":true}\n"
    );

    let messages = app.store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "What is AQI?");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "AQI is...");

    // the whole history went to the completion service
    let requests = app.completion.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["messages"][0]["role"], "user");
    assert_eq!(sent["messages"][0]["content"], "What is AQI?");
}

#[tokio::test]
async fn failed_completion_ends_stream_without_reply() {
    let app = common::spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.completion)
        .await;
    let id = app.create_conversation("Air").await;

    let response = app
        .api_client
        .post(app.url(&format!("/conversations/{}/messages", id)))
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "");

    let messages = app.store.list_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn message_to_unknown_conversation_is_not_found() {
    let app = common::spawn_app().await;

    let response = app
        .api_client
        .post(app.url("/conversations/999/messages"))
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let app = common::spawn_app().await;
    let id = app.create_conversation("Air").await;

    for body in [json!({ "content": "" }), json!({ "text": "hello" })] {
        let response = app
            .api_client
            .post(app.url(&format!("/conversations/{}/messages", id)))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "body {}", body);
    }
    assert!(app.store.list_messages(id).await.unwrap().is_empty());
}
