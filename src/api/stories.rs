//! User story CRUD

use super::auth::{audit, AuthUser, ClientInfo};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{NewAuditLog, StoryFilter, StoryInput, UserStory};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
}

/// Story body as clients send it; criteria may be text or a list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRequest {
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "acceptance_criteria")]
    acceptance_criteria: Option<Value>,
    priority: Option<String>,
    status: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(alias = "group_id")]
    group_id: Option<i64>,
    #[serde(alias = "estimated_points")]
    estimated_points: Option<i64>,
}

impl StoryRequest {
    fn into_input(self) -> StoryInput {
        let acceptance_criteria = self.acceptance_criteria.and_then(|value| match value {
            Value::Null => None,
            Value::String(text) => Some(text),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            other => Some(other.to_string()),
        });

        StoryInput {
            title: self.title,
            description: self.description,
            acceptance_criteria,
            priority: self.priority,
            status: self.status,
            tags: self.tags,
            group_id: self.group_id,
            estimated_points: self.estimated_points,
        }
    }
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(req): Json<StoryRequest>,
) -> ApiResult<(StatusCode, Json<UserStory>)> {
    auth.require(&state, "user_stories", "create").await?;

    let input = req.into_input();
    if input.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let story = state.db.create_story(auth.id(), &input).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_STORY_CREATED", "user_story")
            .entity(story.id)
            .new_values(json!(story))
            .ip(client.ip_address),
    )
    .await;

    Ok((StatusCode::CREATED, Json(story)))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<StoryFilter>,
) -> ApiResult<Json<Vec<UserStory>>> {
    auth.require(&state, "user_stories", "read").await?;
    Ok(Json(state.db.list_stories(auth.id(), &filter).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserStory>> {
    auth.require(&state, "user_stories", "read").await?;
    Ok(Json(state.db.get_story(auth.id(), id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(id): Path<i64>,
    Json(req): Json<StoryRequest>,
) -> ApiResult<Json<UserStory>> {
    auth.require(&state, "user_stories", "update").await?;

    let before = state.db.get_story(auth.id(), id).await?;
    let after = state.db.update_story(auth.id(), id, &req.into_input()).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_STORY_UPDATED", "user_story")
            .entity(id)
            .old_values(json!(before))
            .new_values(json!(after))
            .ip(client.ip_address),
    )
    .await;

    Ok(Json(after))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "user_stories", "delete").await?;

    let before = state.db.get_story(auth.id(), id).await?;
    state.db.delete_story(auth.id(), id).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_STORY_DELETED", "user_story")
            .entity(id)
            .old_values(json!(before))
            .ip(client.ip_address),
    )
    .await;

    Ok(Json(json!({ "message": "User story deleted successfully" })))
}
