//! In-app notifications and their admin controls

use super::auth::{audit, AuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{NewAuditLog, Notification, NotificationSetting, NotificationTemplate};
use crate::notify::{self, BulkTarget};
use crate::permissions::Role;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read/all", post(read_all))
        .route("/read/:id", post(read_one))
        .route("/admin/settings", get(settings).put(update_settings))
        .route("/admin/templates", get(templates).put(update_templates))
        .route("/admin/targets", get(targets))
        .route("/admin/send-bulk", post(send_bulk))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    limit: Option<i64>,
    #[serde(default, alias = "unread_only")]
    unread_only: bool,
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(
        state
            .db
            .list_notifications(auth.id(), query.unread_only, limit)
            .await?,
    ))
}

async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let count = state.db.unread_notification_count(auth.id()).await?;
    Ok(Json(json!({ "count": count })))
}

async fn read_one(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.db.mark_notification_read(auth.id(), id).await?;
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

async fn read_all(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let updated = state.db.mark_all_notifications_read(auth.id()).await?;
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated": updated,
    })))
}

/// Accepts either one object or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

async fn settings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<NotificationSetting>>> {
    auth.require_admin()?;
    Ok(Json(state.db.list_notification_settings().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<OneOrMany<NotificationSetting>>,
) -> ApiResult<Json<Vec<NotificationSetting>>> {
    auth.require_admin()?;

    let updates = body.into_vec();
    for setting in &updates {
        state.db.upsert_notification_setting(setting).await?;
    }
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "NOTIFICATION_SETTINGS_UPDATED", "notification_settings")
            .new_values(json!(updates)),
    )
    .await;

    Ok(Json(state.db.list_notification_settings().await?))
}

async fn templates(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<NotificationTemplate>>> {
    auth.require_admin()?;
    Ok(Json(state.db.list_notification_templates().await?))
}

async fn update_templates(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<OneOrMany<NotificationTemplate>>,
) -> ApiResult<Json<Vec<NotificationTemplate>>> {
    auth.require_admin()?;

    let updates = body.into_vec();
    if updates.iter().any(|t| t.message_template.trim().is_empty()) {
        return Err(ApiError::bad_request("Message template cannot be empty"));
    }
    for template in &updates {
        state.db.upsert_notification_template(template).await?;
    }
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "NOTIFICATION_TEMPLATES_UPDATED", "notification_templates")
            .new_values(json!(updates)),
    )
    .await;

    Ok(Json(state.db.list_notification_templates().await?))
}

async fn targets(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    auth.require_admin()?;

    let users: Vec<Value> = state
        .db
        .list_users()
        .await?
        .into_iter()
        .filter(|u| u.is_active)
        .map(|u| {
            json!({
                "id": u.id,
                "email": u.email,
                "name": u.full_name(),
                "role": u.role,
            })
        })
        .collect();
    let roles: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();

    Ok(Json(json!({ "users": users, "roles": roles })))
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    message: Option<String>,
    target_type: Option<String>,
    target_value: Option<Value>,
}

async fn send_bulk(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<BulkRequest>,
) -> ApiResult<Json<Value>> {
    auth.require_admin()?;

    let message = req
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Message is required"))?;
    let target = BulkTarget::parse(req.target_type.as_deref(), req.target_value.as_ref())
        .map_err(ApiError::BadRequest)?;

    let sent = notify::send_bulk(&state.db, auth.id(), &target, &message).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "BULK_NOTIFICATION_SENT", "notification")
            .new_values(json!({ "target": format!("{:?}", target), "sent": sent })),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Notification sent to {} users", sent),
        "sent": sent,
    })))
}
