//! BRD documents: CRUD, versions, AI generation and analysis, comments

use super::auth::{audit, AuthUser, ClientInfo};
use super::error::{ApiError, ApiResult};
use super::{AppState, Paging};
use crate::ai::{normalize_criteria_text, AiClient};
use crate::db::{
    Brd, BrdAnalysis, BrdComment, BrdUpdate, BrdVersion, NewAuditLog, StoryInput, UserStory,
};
use crate::notify::{self, Notice, BRD_CREATED, BRD_UPDATED};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::types::Json as SqlJson;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/generate", post(generate))
        .route("/regenerate-section", post(regenerate_section))
        .route("/smart-edit", post(smart_edit))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/:id/versions", get(versions))
        .route("/:id/versions/:version_number", get(version))
        .route("/:id/analyze", post(analyze))
        .route("/:id/analysis", get(analysis))
        .route("/:id/convert-to-stories", post(convert_to_stories))
        .route("/:id/estimate", get(estimate).post(estimate))
        .route("/:id/export-text", get(export_text))
        .route("/:id/comments", get(comments).post(add_comment))
        .route("/:id/comments/:comment_id", delete(remove_comment))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "read").await?;

    let limit = paging.limit_or(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let (data, total) = state
        .db
        .list_brds(auth.id(), paging.offset(), limit)
        .await?;

    Ok(Json(json!({ "data": data, "total": total })))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Brd>> {
    auth.require(&state, "brds", "read").await?;
    Ok(Json(state.db.get_brd(auth.id(), &id).await?))
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    title: Option<String>,
    content: Option<String>,
    template: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(req): Json<CreateRequest>,
) -> ApiResult<(StatusCode, Json<Brd>)> {
    auth.require(&state, "brds", "create").await?;

    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;

    let mut brd = Brd::new(auth.id(), title, req.content.unwrap_or_default());
    if let Some(template) = req.template.filter(|t| !t.is_empty()) {
        brd = brd.with_template(template);
    }
    let brd = state.db.create_brd(&brd).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "BRD_CREATED", "brd")
            .entity(&brd.id)
            .new_values(json!({ "title": brd.title }))
            .ip(client.ip_address),
    )
    .await;

    Ok((StatusCode::CREATED, Json(brd)))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<BrdUpdate>,
) -> ApiResult<Json<Brd>> {
    auth.require(&state, "brds", "update").await?;

    let before = state.db.get_brd(auth.id(), &id).await?;
    let after = state.db.update_brd(auth.id(), &id, &req).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "BRD_UPDATED", "brd")
            .entity(&id)
            .old_values(json!({ "title": before.title, "status": before.status, "version": before.version }))
            .new_values(json!({ "title": after.title, "status": after.status, "version": after.version }))
            .ip(client.ip_address),
    )
    .await;
    notify::notify_quietly(
        &state.db,
        Notice::new(auth.id(), BRD_UPDATED)
            .actor(auth.id())
            .resource("brd", &after.id)
            .meta("brd_title", after.title.clone())
            .meta("version", after.version),
    )
    .await;

    Ok(Json(after))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "delete").await?;

    let before = state.db.get_brd(auth.id(), &id).await?;
    state.db.delete_brd(auth.id(), &id).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "BRD_DELETED", "brd")
            .entity(&id)
            .old_values(json!({ "title": before.title }))
            .ip(client.ip_address),
    )
    .await;

    Ok(Json(json!({ "message": "BRD deleted successfully" })))
}

async fn versions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BrdVersion>>> {
    auth.require(&state, "brds", "read").await?;
    Ok(Json(state.db.list_brd_versions(auth.id(), &id).await?))
}

async fn version(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, version_number)): Path<(String, i64)>,
) -> ApiResult<Json<BrdVersion>> {
    auth.require(&state, "brds", "read").await?;
    Ok(Json(
        state
            .db
            .get_brd_version(auth.id(), &id, version_number)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default, alias = "story_ids")]
    story_ids: Vec<i64>,
    title: Option<String>,
    template: Option<String>,
    #[serde(default)]
    options: Map<String, Value>,
}

impl GenerateRequest {
    fn context(&self) -> Option<&str> {
        ["context", "additionalContext", "additional_context"]
            .iter()
            .find_map(|key| self.options.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<Brd>)> {
    auth.require(&state, "brds", "generate").await?;

    if req.story_ids.is_empty() {
        return Err(ApiError::bad_request("At least one story is required"));
    }
    let ai = state.ai.client_for(&state.db, auth.id()).await?;

    let stories = state.db.stories_by_ids(auth.id(), &req.story_ids).await?;
    if stories.is_empty() {
        return Err(ApiError::not_found("No stories found"));
    }

    let template = req.template.as_deref().filter(|t| !t.is_empty());
    let content = ai.generate_brd(&stories, template, req.context()).await?;

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("BRD - {}", Utc::now().format("%Y-%m-%d")));

    let brd = Brd::new(auth.id(), title, content)
        .with_stories(stories.iter().map(|s| s.id).collect())
        .with_template(template.unwrap_or("full"));
    let brd = state.db.create_brd(&brd).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "BRD_CREATED", "brd")
            .entity(&brd.id)
            .new_values(json!({
                "title": brd.title,
                "storyIds": brd.story_ids.0,
                "model": ai.settings().model,
            }))
            .ip(client.ip_address),
    )
    .await;
    notify::notify_quietly(
        &state.db,
        Notice::new(auth.id(), BRD_CREATED)
            .actor(auth.id())
            .resource("brd", &brd.id)
            .meta("brd_title", brd.title.clone()),
    )
    .await;
    tracing::info!("Generated BRD {} from {} stories", brd.id, stories.len());

    Ok((StatusCode::CREATED, Json(brd)))
}

async fn analyze(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BrdAnalysis>> {
    auth.require(&state, "brds", "generate").await?;

    let brd = state.db.get_brd(auth.id(), &id).await?;
    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let report = ai.analyze_brd(&brd.content).await?;

    let analysis = BrdAnalysis {
        brd_id: brd.id,
        score: report.score,
        risk_level: report.risk_level,
        summary: report.summary,
        strengths: SqlJson(report.strengths),
        gaps: SqlJson(report.gaps),
        suggestions: SqlJson(report.suggestions),
        analyzed_at: Utc::now().to_rfc3339(),
    };
    state.db.save_brd_analysis(&analysis).await?;

    Ok(Json(analysis))
}

async fn analysis(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BrdAnalysis>> {
    auth.require(&state, "brds", "read").await?;

    state.db.get_brd(auth.id(), &id).await?;
    Ok(Json(state.db.get_brd_analysis(&id).await?))
}

async fn convert_to_stories(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "generate").await?;

    let brd = state.db.get_brd(auth.id(), &id).await?;
    let ai = state.ai.client_for(&state.db, auth.id()).await?;

    let generated = ai.stories_from_brd(&brd.content).await?;
    let new_rows: Vec<_> = generated
        .into_iter()
        .map(|story| story.into_new(Some(brd.id.clone()), None))
        .collect();
    let saved = state.db.insert_ai_stories(auth.id(), &new_rows).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully extracted {} stories", saved.len()),
        "data": saved,
    })))
}

fn criteria_of(story: &UserStory) -> Vec<String> {
    story
        .acceptance_criteria
        .as_deref()
        .map(normalize_criteria_text)
        .unwrap_or_default()
}

/// Estimate each story, store the points on it and map story id to points
pub(super) async fn estimate_stories(
    state: &AppState,
    ai: &AiClient,
    user_id: i64,
    stories: &[UserStory],
) -> ApiResult<Map<String, Value>> {
    let mut results = Map::new();
    for story in stories {
        let points = ai
            .estimate_points(
                &story.title,
                story.description.as_deref().unwrap_or(""),
                &criteria_of(story),
            )
            .await;

        state
            .db
            .update_story(
                user_id,
                story.id,
                &StoryInput {
                    estimated_points: Some(points),
                    ..Default::default()
                },
            )
            .await?;
        results.insert(story.id.to_string(), json!(points));
    }
    Ok(results)
}

async fn estimate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "generate").await?;

    let brd = state.db.get_brd(auth.id(), &id).await?;
    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let stories = state.db.stories_by_ids(auth.id(), &brd.story_ids.0).await?;

    let estimates = estimate_stories(&state, &ai, auth.id(), &stories).await?;
    let total: i64 = estimates.values().filter_map(Value::as_i64).sum();

    Ok(Json(json!({
        "success": true,
        "brdId": brd.id,
        "data": estimates,
        "totalPoints": total,
    })))
}

/// Filesystem-safe stem for a download name
fn export_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "brd.txt".to_string()
    } else {
        format!("{}.txt", stem)
    }
}

fn export_body(brd: &Brd) -> String {
    format!("{}\n\nGenerated: {}\n\n{}", brd.title, brd.created_at, brd.content)
}

async fn export_text(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    auth.require(&state, "brds", "read").await?;

    let brd = state.db.get_brd(auth.id(), &id).await?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(&brd.title));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export_body(&brd),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateRequest {
    brd_id: Option<String>,
    section_title: Option<String>,
    instructions: Option<String>,
}

async fn regenerate_section(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<RegenerateRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "generate").await?;

    let section_title = req.section_title.filter(|s| !s.trim().is_empty());
    let (Some(brd_id), Some(section_title)) = (req.brd_id, section_title) else {
        return Err(ApiError::bad_request("brdId and sectionTitle are required"));
    };

    let brd = state.db.get_brd(auth.id(), &brd_id).await?;
    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let content = ai
        .regenerate_section(&brd.content, &section_title, req.instructions.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "sectionTitle": section_title,
        "content": content,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmartEditRequest {
    brd_id: Option<String>,
    selected_text: Option<String>,
    instruction: Option<String>,
}

async fn smart_edit(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SmartEditRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "brds", "generate").await?;

    let (Some(selected), Some(instruction)) = (
        req.selected_text.filter(|t| !t.trim().is_empty()),
        req.instruction.filter(|t| !t.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("selectedText and instruction are required"));
    };

    let context = match req.brd_id.as_deref() {
        Some(id) => Some(state.db.get_brd(auth.id(), id).await?.title),
        None => None,
    };

    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let edited = ai
        .smart_edit(&selected, &instruction, context.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "originalText": selected,
        "editedText": edited,
    })))
}

async fn comments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BrdComment>>> {
    auth.require(&state, "brds", "read").await?;

    if !state.db.brd_exists(&id).await? {
        return Err(ApiError::not_found("BRD not found"));
    }
    Ok(Json(state.db.list_brd_comments(&id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    content: Option<String>,
    section_id: Option<String>,
}

async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<BrdComment>)> {
    auth.require(&state, "brds", "comment").await?;

    let content = req
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Comment content is required"))?;
    if !state.db.brd_exists(&id).await? {
        return Err(ApiError::not_found("BRD not found"));
    }

    let comment = state
        .db
        .add_brd_comment(&id, auth.id(), req.section_id.as_deref(), &content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn remove_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, comment_id)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    let comment = state.db.get_brd_comment(comment_id).await?;
    if comment.brd_id != id {
        return Err(ApiError::not_found("Comment not found"));
    }
    if comment.user_id != auth.id() && !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "Only the author or an admin can delete this comment".to_string(),
        ));
    }

    state.db.delete_brd_comment(comment_id).await?;
    Ok(Json(json!({ "message": "Comment deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_filename() {
        assert_eq!(export_filename("Checkout Flow v2"), "Checkout_Flow_v2.txt");
        assert_eq!(export_filename("***"), "brd.txt");
        assert_eq!(export_filename("pay-ments"), "pay-ments.txt");
    }

    #[test]
    fn test_export_body_layout() {
        let mut brd = Brd::new(1, "Payments", "## Scope\nCards");
        brd.created_at = "2026-01-02T03:04:05+00:00".into();

        assert_eq!(
            export_body(&brd),
            "Payments\n\nGenerated: 2026-01-02T03:04:05+00:00\n\n## Scope\nCards"
        );
    }

    #[test]
    fn test_generate_request_context() {
        let req: GenerateRequest = serde_json::from_value(json!({
            "storyIds": [1, 2],
            "options": { "additionalContext": "  retail bank  " }
        }))
        .unwrap();

        assert_eq!(req.story_ids, vec![1, 2]);
        assert_eq!(req.context(), Some("retail bank"));
    }
}
