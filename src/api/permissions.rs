//! Permission lookups and the admin-managed override rows

use super::auth::{audit, AuthUser};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{CustomPermission, NewAuditLog};
use crate::permissions::{Role, RESOURCES, ROLE_PERMISSIONS};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", get(check))
        .route("/my-permissions", get(my_permissions))
        .route("/accessible", get(accessible))
        .route("/all", get(all))
        .route("/", get(custom).post(grant).delete(revoke))
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    resource: Option<String>,
    action: Option<String>,
}

async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Json<Value>> {
    let (Some(resource), Some(action)) = (query.resource, query.action) else {
        return Err(ApiError::bad_request("resource and action are required"));
    };

    let allowed = state
        .permissions
        .has_permission(auth.role(), &resource, &action)
        .await;
    Ok(Json(json!({
        "resource": resource,
        "action": action,
        "role": auth.role(),
        "hasPermission": allowed,
    })))
}

async fn my_permissions(State(state): State<AppState>, auth: AuthUser) -> Json<Value> {
    Json(json!({
        "role": auth.role(),
        "permissions": state.permissions.user_permissions(auth.role()).await,
    }))
}

async fn accessible(State(state): State<AppState>, auth: AuthUser) -> Json<Value> {
    Json(json!({
        "role": auth.role(),
        "resources": state.permissions.accessible_resources(auth.role()).await,
    }))
}

async fn all(auth: AuthUser) -> ApiResult<Json<Value>> {
    auth.require_admin()?;
    Ok(Json(json!({
        "roles": Role::ALL,
        "resources": RESOURCES,
        "permissions": *ROLE_PERMISSIONS,
    })))
}

async fn custom(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<CustomPermission>>> {
    auth.require_admin()?;
    Ok(Json(state.db.list_custom_permissions().await?))
}

#[derive(Debug, Deserialize)]
struct PermissionRow {
    role: Option<String>,
    resource: Option<String>,
    action: Option<String>,
}

impl PermissionRow {
    fn validate(self) -> ApiResult<(Role, String, String)> {
        let (Some(role), Some(resource), Some(action)) = (
            self.role,
            self.resource.filter(|r| !r.trim().is_empty()),
            self.action.filter(|a| !a.trim().is_empty()),
        ) else {
            return Err(ApiError::bad_request("role, resource and action are required"));
        };
        let role: Role = role.parse().map_err(ApiError::BadRequest)?;
        Ok((role, resource.trim().to_string(), action.trim().to_string()))
    }
}

async fn grant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(row): Json<PermissionRow>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    auth.require_admin()?;
    let (role, resource, action) = row.validate()?;

    let added = state
        .permissions
        .grant(&state.db, role.as_str(), &resource, &action)
        .await?;
    if !added {
        return Err(ApiError::Conflict("Permission already exists".to_string()));
    }

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "PERMISSION_GRANTED", "permission")
            .new_values(json!({ "role": role, "resource": resource, "action": action })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Permission added", "role": role, "resource": resource, "action": action })),
    ))
}

async fn revoke(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(row): Json<PermissionRow>,
) -> ApiResult<Json<Value>> {
    auth.require_admin()?;
    let (role, resource, action) = row.validate()?;

    let removed = state
        .permissions
        .revoke(&state.db, role.as_str(), &resource, &action)
        .await?;
    if !removed {
        return Err(ApiError::not_found("Permission not found"));
    }

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "PERMISSION_REVOKED", "permission")
            .old_values(json!({ "role": role, "resource": resource, "action": action })),
    )
    .await;

    Ok(Json(json!({ "message": "Permission removed" })))
}
