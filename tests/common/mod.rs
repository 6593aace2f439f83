//! Shared harness: the real router on an in-memory database, plus a fake
//! OpenAI-compatible upstream.

#![allow(dead_code)]

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ba_assistant::api::{router, AppState};
use ba_assistant::config::AppConfig;
use ba_assistant::db::Database;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub const PASSWORD: &str = "secret123";
pub const REJECTED_KEY: &str = "sk-rejected";

pub const FAKE_BRD: &str = "# Business Requirements Document\n\n## 1. Executive Summary\nA checkout flow.";
pub const FAKE_STORIES: &str = r#"Here you go:
[
  {
    "title": "Guest checkout",
    "description": "As a shopper I want to pay without an account so that I finish quickly",
    "acceptance_criteria": ["Email is collected", "Receipt is sent"],
    "estimated_points": 4,
    "priority": "P1",
    "business_value": "Fewer abandoned carts"
  },
  {
    "title": "Saved cards",
    "description": "As a returning shopper I want to reuse a card",
    "acceptance_criteria": "Card is tokenized\nCVV is asked again",
    "estimated_points": 8,
    "priority": "P2"
  }
]"#;
pub const FAKE_ANALYSIS: &str = r#"{"score": 72, "summary": "Solid draft", "strengths": ["Clear scope"], "gaps": ["No NFRs"], "suggestions": ["Add SLAs"], "risk_level": "Medium"}"#;

fn rejected(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", REJECTED_KEY))
}

/// Answer by recognising the system prompt of each workflow
async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if rejected(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" }))).into_response();
    }

    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let reply;
    let content = if system.contains("assistant for a Business Analyst tool") {
        // Echo the conversation shape so callers can check what was forwarded
        let roles: Vec<&str> = messages.iter().filter_map(|m| m["role"].as_str()).collect();
        let last = messages.last().and_then(|m| m["content"].as_str()).unwrap_or_default();
        reply = format!("{} | {}", roles.join(","), last);
        reply.as_str()
    } else if system.contains("BRD) writer") {
        FAKE_BRD
    } else if system.contains("Auditor") {
        FAKE_ANALYSIS
    } else if system.contains("estimation expert") {
        "8"
    } else if system.contains("Agile") {
        FAKE_STORIES
    } else {
        "Rewritten text"
    };

    Json(json!({
        "model": body["model"],
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

async fn models(headers: HeaderMap) -> Response {
    if rejected(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "data": [{ "id": "gpt-4" }, { "id": "gpt-3.5-turbo" }] })).into_response()
}

/// Start the fake upstream; returns its base URL
pub async fn spawn_fake_openai() -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(models));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub db: Database,
    pub client: reqwest::Client,
}

/// Server with a fallback OpenAI key pointing at the fake upstream
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with<F>(customize: F) -> TestApp
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = AppConfig::default();
    config.jwt_secret = Some("integration-secret".to_string());
    config.openai.base_url = spawn_fake_openai().await;
    config.openai.api_key = Some("sk-server".to_string());
    config.cors_origins = vec!["http://localhost:3000".to_string()];
    customize(&mut config);

    let db = Database::in_memory().await.unwrap();
    let state = AppState::new(&config, db.clone()).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestApp {
        addr,
        db,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let response = request.send().await.unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        let text = response.text().await.unwrap();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (status, body)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path)).bearer_auth(token))
            .await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.patch(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    pub async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token))
            .await
    }

    pub async fn delete_json(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    pub async fn post_anonymous(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).json(&body)).await
    }

    /// Register an analyst; returns (token, user id)
    pub async fn register(&self, email: &str) -> (String, i64) {
        let (status, body) = self
            .post_anonymous(
                "/api/auth/register",
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "firstName": "Test",
                    "lastName": email.split('@').next().unwrap_or("user"),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }

    /// Register then promote to the given role
    pub async fn register_as(&self, email: &str, role: &str) -> (String, i64) {
        let (token, id) = self.register(email).await;
        self.db.update_role(id, role).await.unwrap();
        (token, id)
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post_anonymous(
            "/api/auth/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn create_story(&self, token: &str, title: &str) -> i64 {
        let (status, body) = self
            .post(
                "/api/user-stories",
                token,
                json!({
                    "title": title,
                    "description": format!("As a user I want {}", title),
                    "acceptanceCriteria": ["first", "second"],
                    "priority": "High",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "story failed: {}", body);
        body["id"].as_i64().unwrap()
    }
}
