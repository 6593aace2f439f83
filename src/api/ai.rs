//! AI story generation, stored AI stories and per-user model settings

use super::auth::{audit, AuthUser};
use super::brds::estimate_stories;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::ai::{AiSettings, ChatRole, ChatTurn, ALLOWED_MODELS};
use crate::db::{AiConfiguration, AiStory, NewAuditLog};
use crate::security::mask_secret;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_STORY_COUNT: usize = 5;
const MAX_STORY_COUNT: usize = 20;

pub(super) fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/generate-stories", post(generate_stories))
        .route("/estimate", post(estimate))
        .route("/chat", post(chat))
}

pub(super) fn story_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stories))
        .route("/:id", delete(delete_story))
}

pub(super) fn config_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_config).put(put_config))
        .route("/test", post(test_connection))
        .route("/models", get(models))
        .route("/reset", post(reset_config))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    requirements: Option<String>,
    count: Option<usize>,
}

async fn generate_stories(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "generate").await?;

    let requirements = req
        .requirements
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::bad_request("Requirements are required"))?;
    let count = req
        .count
        .unwrap_or(DEFAULT_STORY_COUNT)
        .clamp(1, MAX_STORY_COUNT);

    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let stories = ai.stories_from_requirements(&requirements, count).await?;

    Ok(Json(json!({
        "success": true,
        "data": stories,
    })))
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: Option<String>,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// Entries with an unknown role or no content are dropped
fn chat_history(history: Vec<ChatMessage>) -> Vec<ChatTurn> {
    history
        .into_iter()
        .filter_map(|m| {
            let role = ChatRole::parse(m.role.as_deref()?)?;
            let content = m.content.filter(|c| !c.trim().is_empty())?;
            Some(ChatTurn { role, content })
        })
        .collect()
}

async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChatBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "generate").await?;

    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Message is required"))?;
    let history = chat_history(req.history);

    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let reply = ai.chat(&message, &history).await?;

    Ok(Json(json!({
        "success": true,
        "message": reply,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest {
    #[serde(default, alias = "story_ids")]
    story_ids: Vec<i64>,
}

async fn estimate(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<EstimateRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "generate").await?;

    if req.story_ids.is_empty() {
        return Err(ApiError::bad_request("At least one story is required"));
    }
    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let stories = state.db.stories_by_ids(auth.id(), &req.story_ids).await?;

    let mut estimates = estimate_stories(&state, &ai, auth.id(), &stories).await?;
    for id in &req.story_ids {
        estimates.entry(id.to_string()).or_insert(Value::Null);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Estimations updated",
        "data": estimates,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryQuery {
    #[serde(alias = "brd_id")]
    brd_id: Option<String>,
}

async fn list_stories(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<StoryQuery>,
) -> ApiResult<Json<Vec<AiStory>>> {
    auth.require(&state, "ai", "read").await?;
    Ok(Json(
        state
            .db
            .list_ai_stories(auth.id(), query.brd_id.as_deref())
            .await?,
    ))
}

async fn delete_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "generate").await?;
    state.db.delete_ai_story(auth.id(), id).await?;
    Ok(Json(json!({ "message": "AI story deleted" })))
}

fn config_view(settings: &AiSettings, key_preview: Option<String>) -> Value {
    json!({
        "model": settings.model,
        "temperature": settings.temperature,
        "max_tokens": settings.max_tokens,
        "language": settings.language,
        "detail_level": settings.detail_level,
        "api_key_configured": key_preview.is_some(),
        "api_key_preview": key_preview,
    })
}

async fn get_config(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "read").await?;

    let stored = state.db.get_ai_config(auth.id()).await?;
    let view = match stored {
        Some(config) => {
            let preview = state
                .ai
                .cipher()
                .decrypt(&config.api_key)
                .ok()
                .filter(|k| !k.is_empty())
                .map(|k| mask_secret(&k));
            config_view(&AiSettings::from_config(&config), preview)
        }
        None => config_view(&AiSettings::default(), None),
    };

    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    #[serde(alias = "maxTokens")]
    max_tokens: Option<i64>,
    language: Option<String>,
    #[serde(alias = "detailLevel")]
    detail_level: Option<String>,
}

impl ConfigRequest {
    /// Overlay the request on the current settings
    fn merge(&self, current: AiSettings) -> AiSettings {
        AiSettings {
            model: self.model.clone().unwrap_or(current.model),
            temperature: self.temperature.unwrap_or(current.temperature),
            max_tokens: self.max_tokens.unwrap_or(current.max_tokens),
            language: self.language.clone().unwrap_or(current.language),
            detail_level: self.detail_level.clone().unwrap_or(current.detail_level),
        }
    }
}

async fn put_config(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ConfigRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "configure").await?;

    let stored = state.db.get_ai_config(auth.id()).await?;
    let current = stored
        .as_ref()
        .map(AiSettings::from_config)
        .unwrap_or_default();
    let settings = req.merge(current);
    settings.validate().map_err(ApiError::BadRequest)?;

    let new_key = req
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    let (encrypted_key, preview) = match (new_key, &stored) {
        (Some(key), _) => (state.ai.cipher().encrypt(key)?, Some(mask_secret(key))),
        (None, Some(existing)) => (
            existing.api_key.clone(),
            state
                .ai
                .cipher()
                .decrypt(&existing.api_key)
                .ok()
                .map(|k| mask_secret(&k)),
        ),
        (None, None) => return Err(ApiError::bad_request("API key is required")),
    };

    let now = Utc::now().to_rfc3339();
    state
        .db
        .save_ai_config(&AiConfiguration {
            user_id: auth.id(),
            api_key: encrypted_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            language: settings.language.clone(),
            detail_level: settings.detail_level.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
        .await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "AI_CONFIG_UPDATED", "ai_configuration")
            .entity(auth.id())
            .new_values(json!({
                "model": settings.model,
                "keyChanged": new_key.is_some(),
            })),
    )
    .await;

    Ok(Json(json!({
        "message": "AI configuration saved",
        "config": config_view(&settings, preview),
    })))
}

#[derive(Debug, Deserialize)]
struct TestRequest {
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
}

async fn test_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<TestRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "configure").await?;

    let key = match req.api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => {
            let stored = state
                .db
                .get_ai_config(auth.id())
                .await?
                .ok_or_else(|| ApiError::bad_request("API key is required"))?;
            state.ai.cipher().decrypt(&stored.api_key)?
        }
    };

    Ok(Json(match state.ai.test_key(&key).await {
        Ok(()) => json!({ "success": true, "message": "Connection successful" }),
        Err(e) => {
            tracing::warn!("AI connection test failed for user {}: {}", auth.id(), e);
            json!({ "success": false, "message": e.to_string() })
        }
    }))
}

async fn models(auth: AuthUser) -> Json<Value> {
    tracing::debug!("Model list requested by user {}", auth.id());
    Json(json!({ "models": ALLOWED_MODELS }))
}

async fn reset_config(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "configure").await?;

    let removed = state.db.delete_ai_config(auth.id()).await?;
    if removed {
        audit(
            &state.db,
            NewAuditLog::new(auth.id(), "AI_CONFIG_RESET", "ai_configuration").entity(auth.id()),
        )
        .await;
    }

    Ok(Json(json!({
        "message": "AI configuration reset",
        "config": config_view(&AiSettings::default(), None),
    })))
}
