//! Realtime collaboration over the WebSocket endpoint

mod common;

use axum::http::StatusCode;
use common::{spawn_app, TestApp};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp, token: &str) -> Socket {
    let (socket, _) = connect_async(app.ws_url(token)).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    socket.send(Message::Text(frame)).await.unwrap();
}

/// Read until an event named `name` arrives, skipping everything else
async fn expect_event(socket: &mut Socket, name: &str) -> Value {
    let wait = async {
        while let Some(frame) = socket.next().await {
            if let Message::Text(text) = frame.unwrap() {
                let event: Value = serde_json::from_str(&text).unwrap();
                if event["event"] == name {
                    return event["data"].clone();
                }
            }
        }
        panic!("socket closed before {}", name);
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", name))
}

async fn create_brd(app: &TestApp, token: &str) -> String {
    let (status, brd) = app
        .post("/api/brd", token, json!({ "title": "Shared", "content": "" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    brd["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_socket_requires_valid_token() {
    let app = spawn_app().await;

    for url in [
        format!("ws://{}/ws", app.addr),
        app.ws_url("garbage"),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401)
            }
            other => panic!("expected 401 handshake, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn test_presence_locks_and_edits() {
    let app = spawn_app().await;
    let (alice_token, alice) = app.register("alice@example.com").await;
    let (bob_token, bob) = app.register("bob@example.com").await;
    let brd = create_brd(&app, &alice_token).await;

    let mut alice_ws = connect(&app, &alice_token).await;
    send(&mut alice_ws, "join-brd", json!({ "brdId": brd })).await;
    let info = expect_event(&mut alice_ws, "session-info").await;
    assert_eq!(info["activeUsers"], json!([alice]));

    let mut bob_ws = connect(&app, &bob_token).await;
    send(&mut bob_ws, "join-brd", json!({ "brdId": brd, "userName": "Bobby" })).await;
    expect_event(&mut bob_ws, "session-info").await;
    let joined = expect_event(&mut alice_ws, "user-joined").await;
    assert_eq!(joined["userId"], bob);
    assert_eq!(joined["userName"], "Bobby");

    send(&mut alice_ws, "section-lock", json!({ "brdId": brd, "sectionId": "scope" })).await;
    expect_event(&mut alice_ws, "section-locked").await;
    let update = expect_event(&mut bob_ws, "section-lock-updated").await;
    assert_eq!(update["lockedBy"], alice);

    send(&mut bob_ws, "section-lock", json!({ "brdId": brd, "sectionId": "scope" })).await;
    let failed = expect_event(&mut bob_ws, "lock-failed").await;
    assert_eq!(failed["lockedBy"], alice);

    send(
        &mut alice_ws,
        "content-change",
        json!({ "brdId": brd, "sectionId": "scope", "change": { "text": "In scope: web" } }),
    )
    .await;
    let ack = expect_event(&mut alice_ws, "change-acknowledged").await;
    assert!(ack["operationId"].is_u64());
    let changed = expect_event(&mut bob_ws, "content-changed").await;
    assert_eq!(changed["change"]["text"], "In scope: web");
    assert_eq!(changed["userId"], alice);

    let (status, session) = app
        .get(&format!("/api/collaboration/session/{}", brd), &bob_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["activeUsers"].as_array().unwrap().len(), 2);
    assert_eq!(session["lockedSections"][0]["sectionId"], "scope");

    let (_, history) = app
        .get(&format!("/api/collaboration/operations/{}", brd), &bob_token)
        .await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["operations"][0]["type"], "content-change");

    // Dropping a socket releases its locks and persists its room's log
    alice_ws.close(None).await.unwrap();
    let left = expect_event(&mut bob_ws, "user-left").await;
    assert_eq!(left["userId"], alice);
    let unlocked = expect_event(&mut bob_ws, "section-lock-updated").await;
    assert_eq!(unlocked["lockedBy"], Value::Null);

    let mut restored = Value::Null;
    for _ in 0..50 {
        let (_, body) = app
            .get(&format!("/api/collaboration/restore/{}", brd), &bob_token)
            .await;
        if body.as_array().is_some_and(|ops| !ops.is_empty()) {
            restored = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let restored = restored.as_array().expect("operations were persisted");
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0]["operation_type"], "content-change");

    // Nothing left to flush
    let (_, persisted) = app
        .post(&format!("/api/collaboration/persist/{}", brd), &bob_token, json!({}))
        .await;
    assert_eq!(persisted["persisted"], 0);
}

#[tokio::test]
async fn test_failed_persist_keeps_operations() {
    let app = spawn_app().await;
    let (token, _) = app.register("writer@example.com").await;
    let brd = create_brd(&app, &token).await;

    let mut socket = connect(&app, &token).await;
    send(&mut socket, "join-brd", json!({ "brdId": brd })).await;
    expect_event(&mut socket, "session-info").await;
    send(
        &mut socket,
        "content-change",
        json!({ "brdId": brd, "sectionId": "goals", "change": { "text": "v1" } }),
    )
    .await;
    expect_event(&mut socket, "change-acknowledged").await;

    sqlx::query("ALTER TABLE collaboration_operations RENAME TO collaboration_operations_offline")
        .execute(app.db.pool())
        .await
        .unwrap();
    let (status, _) = app
        .post(&format!("/api/collaboration/persist/{}", brd), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    sqlx::query("ALTER TABLE collaboration_operations_offline RENAME TO collaboration_operations")
        .execute(app.db.pool())
        .await
        .unwrap();
    let (status, body) = app
        .post(&format!("/api/collaboration/persist/{}", brd), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["persisted"], 1);

    let (_, restored) = app
        .get(&format!("/api/collaboration/restore/{}", brd), &token)
        .await;
    assert_eq!(restored.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_mentions_reach_socket_and_inbox() {
    let app = spawn_app().await;
    let (alice_token, alice) = app.register("alice@example.com").await;
    let (bob_token, bob) = app.register("bob@example.com").await;
    let brd = create_brd(&app, &alice_token).await;

    let mut alice_ws = connect(&app, &alice_token).await;
    let mut bob_ws = connect(&app, &bob_token).await;
    send(&mut alice_ws, "join-brd", json!({ "brdId": brd })).await;
    expect_event(&mut alice_ws, "session-info").await;

    // Claiming to be someone else is refused
    send(
        &mut alice_ws,
        "mention",
        json!({ "brdId": brd, "mentionedUserId": bob, "mentionedByUserId": bob, "context": "x" }),
    )
    .await;
    expect_event(&mut alice_ws, "error").await;

    send(
        &mut alice_ws,
        "mention",
        json!({
            "brdId": brd,
            "mentionedUserId": bob,
            "mentionedByUserId": alice,
            "context": "please review scope",
        }),
    )
    .await;
    let sent = expect_event(&mut alice_ws, "mention-sent").await;
    assert_eq!(sent["mentionedUserId"], bob);

    let received = expect_event(&mut bob_ws, "you-were-mentioned").await;
    assert_eq!(received["brdId"], brd.as_str());
    assert_eq!(received["context"], "please review scope");

    let (_, mentions) = app
        .get("/api/collaboration/mentions?unreadOnly=true", &bob_token)
        .await;
    assert_eq!(mentions["count"], 1);
    let mention_id = mentions["mentions"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            &format!("/api/collaboration/mentions/{}/read", mention_id),
            &bob_token,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post("/api/collaboration/mentions/unknown/read", &bob_token, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, mentions) = app
        .get("/api/collaboration/mentions?unreadOnly=true", &bob_token)
        .await;
    assert_eq!(mentions["count"], 0);

    let mut message = None;
    for _ in 0..50 {
        let (_, inbox) = app.get("/api/notifications", &bob_token).await;
        if let Some(n) = inbox
            .as_array()
            .and_then(|items| items.iter().find(|n| n["type"] == "MENTION"))
        {
            message = n["message"].as_str().map(str::to_string);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(
        message.as_deref(),
        Some("Test alice mentioned you: please review scope")
    );
}

#[tokio::test]
async fn test_malformed_frames_get_an_error_event() {
    let app = spawn_app().await;
    let (token, _) = app.register("noisy@example.com").await;
    let mut socket = connect(&app, &token).await;

    socket
        .send(Message::Text("{\"event\":\"dance\"}".to_string()))
        .await
        .unwrap();
    let error = expect_event(&mut socket, "error").await;
    assert!(error["message"].as_str().unwrap().starts_with("Invalid message"));

    // The connection stays usable
    send(&mut socket, "join-brd", json!({ "brdId": "b-1" })).await;
    expect_event(&mut socket, "session-info").await;
}
