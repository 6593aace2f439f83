//! User groups and their membership

use super::auth::{audit, AuthUser};
use super::error::{ApiError, ApiResult};
use super::{AppState, Paging};
use crate::db::{Group, GroupMember, NewAuditLog};
use crate::notify::{self, Notice, GROUP_MEMBER_ADDED};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/my-groups", get(my_groups))
        .route("/:group_id", get(fetch).put(update).delete(remove))
        .route("/:group_id/members", get(members).post(add_member))
        .route("/:group_id/members/:user_id", delete(remove_member))
}

#[derive(Debug, Deserialize)]
struct GroupRequest {
    name: Option<String>,
    description: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<GroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    auth.require(&state, "groups", "create").await?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Group name is required"))?;

    let group = state
        .db
        .create_group(&name, req.description.as_deref(), auth.id())
        .await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "GROUP_CREATED", "group")
            .entity(group.id)
            .new_values(json!({ "name": group.name })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(group)))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "groups", "read").await?;

    let (data, total) = state
        .db
        .list_groups(paging.limit_or(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE), paging.offset())
        .await?;
    Ok(Json(json!({ "data": data, "total": total })))
}

async fn my_groups(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(state.db.groups_for_user(auth.id()).await?))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Group>> {
    auth.require(&state, "groups", "read").await?;
    Ok(Json(state.db.get_group(group_id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<i64>,
    Json(req): Json<GroupRequest>,
) -> ApiResult<Json<Group>> {
    auth.require(&state, "groups", "update").await?;

    let name = req.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(ApiError::bad_request("Group name cannot be empty"));
    }

    let group = state
        .db
        .update_group(group_id, name, req.description.as_deref())
        .await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "GROUP_UPDATED", "group")
            .entity(group_id)
            .new_values(json!({ "name": group.name, "description": group.description })),
    )
    .await;

    Ok(Json(group))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "groups", "delete").await?;

    state.db.delete_group(group_id).await?;
    audit(&state.db, NewAuditLog::new(auth.id(), "GROUP_DELETED", "group").entity(group_id)).await;

    Ok(Json(json!({ "message": "Group deleted successfully" })))
}

async fn members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Vec<GroupMember>>> {
    auth.require(&state, "groups", "read").await?;

    state.db.get_group(group_id).await?;
    Ok(Json(state.db.list_group_members(group_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRequest {
    #[serde(alias = "user_id")]
    user_id: Option<i64>,
    role: Option<String>,
}

async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<i64>,
    Json(req): Json<MemberRequest>,
) -> ApiResult<(StatusCode, Json<GroupMember>)> {
    auth.require(&state, "groups", "manage_members").await?;

    let user_id = req
        .user_id
        .ok_or_else(|| ApiError::bad_request("userId is required"))?;
    let role = req
        .role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("member");

    let member = state.db.add_group_member(group_id, user_id, role).await?;
    let group = state.db.get_group(group_id).await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "GROUP_MEMBER_ADDED", "group")
            .entity(group_id)
            .new_values(json!({ "userId": user_id, "role": role })),
    )
    .await;
    notify::notify_quietly(
        &state.db,
        Notice::new(user_id, GROUP_MEMBER_ADDED)
            .actor(auth.id())
            .resource("group", group_id)
            .meta("group_name", group.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "groups", "manage_members").await?;

    state.db.remove_group_member(group_id, user_id).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "GROUP_MEMBER_REMOVED", "group")
            .entity(group_id)
            .old_values(json!({ "userId": user_id })),
    )
    .await;

    Ok(Json(json!({ "message": "Member removed from group" })))
}
