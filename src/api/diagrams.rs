//! Diagram CRUD and story extraction

use super::auth::{audit, AuthUser, ClientInfo};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{Diagram, DiagramFilter, DiagramInput, NewAuditLog};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/:id/extract-stories", post(extract_stories))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(input): Json<DiagramInput>,
) -> ApiResult<(StatusCode, Json<Diagram>)> {
    auth.require(&state, "diagrams", "create").await?;

    if input.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }

    let diagram = state.db.create_diagram(auth.id(), &input).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "DIAGRAM_CREATED", "diagram")
            .entity(diagram.id)
            .new_values(json!({ "title": diagram.title, "type": diagram.diagram_type }))
            .ip(client.ip_address),
    )
    .await;

    Ok((StatusCode::CREATED, Json(diagram)))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<DiagramFilter>,
) -> ApiResult<Json<Vec<Diagram>>> {
    auth.require(&state, "diagrams", "read").await?;
    Ok(Json(state.db.list_diagrams(auth.id(), &filter).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Diagram>> {
    auth.require(&state, "diagrams", "read").await?;
    Ok(Json(state.db.get_diagram(auth.id(), id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Path(id): Path<i64>,
    Json(input): Json<DiagramInput>,
) -> ApiResult<Json<Diagram>> {
    auth.require(&state, "diagrams", "update").await?;

    let before = state.db.get_diagram(auth.id(), id).await?;
    let after = state.db.update_diagram(auth.id(), id, &input).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "DIAGRAM_UPDATED", "diagram")
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
    auth.require(&state, "diagrams", "delete").await?;

    let before = state.db.get_diagram(auth.id(), id).await?;
    state.db.delete_diagram(auth.id(), id).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "DIAGRAM_DELETED", "diagram")
            .entity(id)
            .old_values(json!({ "title": before.title }))
            .ip(client.ip_address),
    )
    .await;

    Ok(Json(json!({ "message": "Diagram deleted successfully" })))
}

async fn extract_stories(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "ai", "generate").await?;

    let diagram = state.db.get_diagram(auth.id(), id).await?;
    if diagram.content.trim().is_empty() {
        return Err(ApiError::bad_request("Diagram has no content to analyze"));
    }

    let ai = state.ai.client_for(&state.db, auth.id()).await?;
    let generated = ai
        .stories_from_diagram(&diagram.diagram_type, &diagram.content)
        .await?;

    let rows: Vec<_> = generated
        .into_iter()
        .map(|story| story.into_new(diagram.brd_id.clone(), Some(diagram.id)))
        .collect();
    let saved = state.db.insert_ai_stories(auth.id(), &rows).await?;
    tracing::info!("Extracted {} stories from diagram {}", saved.len(), diagram.id);

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully extracted {} stories", saved.len()),
        "data": saved,
    })))
}
