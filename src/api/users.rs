//! The caller's profile and admin user management

use super::auth::{audit, user_payload, AuthUser, ClientInfo};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{NewAuditLog, NewUser, ProfileUpdate, UserView};
use crate::permissions::Role;
use crate::security::PasswordManager;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(profile).put(update_profile))
        .route("/change-password", post(change_password))
}

pub(super) fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:user_id", get(fetch).delete(remove))
        .route("/:user_id/role", patch(change_role))
        .route("/:user_id/status", patch(change_status))
        .route("/:user_id/reset-password", post(reset_password))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn profile(State(state): State<AppState>, auth: AuthUser) -> Json<Value> {
    Json(user_payload(&state, &auth.user).await)
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Value>> {
    let update = ProfileUpdate {
        first_name: blank_to_none(update.first_name),
        last_name: blank_to_none(update.last_name),
        username: blank_to_none(update.username),
        mobile: blank_to_none(update.mobile),
    };

    let before = auth.user.view();
    let user = state.db.update_profile(auth.id(), &update).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "PROFILE_UPDATED", "user")
            .entity(auth.id())
            .old_values(json!(before))
            .new_values(json!(user.view()))
            .ip(client.ip_address),
    )
    .await;

    Ok(Json(user_payload(&state, &user).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(current), Some(new_password)) = (req.current_password, req.new_password) else {
        return Err(ApiError::bad_request(
            "Current password and new password are required",
        ));
    };

    if !state
        .passwords
        .verify_password(&current, &auth.user.password_hash)?
    {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }
    PasswordManager::check_policy(&new_password)?;

    let hash = state.passwords.hash_password(&new_password)?;
    state.db.update_password(auth.id(), &hash).await?;
    let ended = state
        .db
        .end_user_sessions(auth.id(), Some(&auth.session_id))
        .await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "PASSWORD_CHANGED", "user")
            .entity(auth.id())
            .ip(client.ip_address),
    )
    .await;
    tracing::info!("User {} changed password, ended {} other sessions", auth.id(), ended);

    Ok(Json(json!({ "message": "Password changed successfully" })))
}

async fn list(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Vec<UserView>>> {
    auth.require(&state, "users", "read").await?;
    Ok(Json(
        state
            .db
            .list_users()
            .await?
            .iter()
            .map(|u| u.view())
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    email: Option<String>,
    username: Option<String>,
    mobile: Option<String>,
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    role: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    auth.require(&state, "users", "create").await?;

    let (Some(email), Some(password), Some(first_name), Some(last_name)) = (
        blank_to_none(req.email),
        req.password.filter(|p| !p.is_empty()),
        blank_to_none(req.first_name),
        blank_to_none(req.last_name),
    ) else {
        return Err(ApiError::bad_request(
            "Email, password, first name and last name are required",
        ));
    };
    let role: Role = req
        .role
        .as_deref()
        .unwrap_or("analyst")
        .parse()
        .map_err(ApiError::BadRequest)?;

    let hash = state.passwords.hash_password(&password)?;
    let user = state
        .db
        .create_user(
            &NewUser::new(email, hash, first_name, last_name)
                .with_username(blank_to_none(req.username))
                .with_mobile(blank_to_none(req.mobile))
                .with_role(role.as_str()),
        )
        .await?;

    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_CREATED", "user")
            .entity(user.id)
            .new_values(json!({ "email": user.email, "role": user.role })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user.view())))
}

async fn fetch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserView>> {
    auth.require(&state, "users", "read").await?;
    Ok(Json(state.db.get_user(user_id).await?.view()))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    role: Option<String>,
}

async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<UserView>> {
    auth.require(&state, "users", "manage_roles").await?;

    let role: Role = req
        .role
        .ok_or_else(|| ApiError::bad_request("Role is required"))?
        .parse()
        .map_err(ApiError::BadRequest)?;

    let before = state.db.get_user(user_id).await?;
    let user = state.db.update_role(user_id, role.as_str()).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_ROLE_CHANGED", "user")
            .entity(user_id)
            .old_values(json!({ "role": before.role }))
            .new_values(json!({ "role": user.role })),
    )
    .await;

    Ok(Json(user.view()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    #[serde(alias = "is_active")]
    is_active: Option<bool>,
}

async fn change_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<UserView>> {
    auth.require(&state, "users", "manage_status").await?;

    let active = req
        .is_active
        .ok_or_else(|| ApiError::bad_request("isActive is required"))?;
    if !active && user_id == auth.id() {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let user = state.db.set_user_active(user_id, active).await?;
    if !active {
        let ended = state.db.end_user_sessions(user_id, None).await?;
        tracing::info!("Deactivated user {}, ended {} sessions", user_id, ended);
    }

    audit(
        &state.db,
        NewAuditLog::new(
            auth.id(),
            if active { "USER_ACTIVATED" } else { "USER_DEACTIVATED" },
            "user",
        )
        .entity(user_id),
    )
    .await;

    Ok(Json(user.view()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    new_password: Option<String>,
}

async fn reset_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "users", "reset_password").await?;

    let password = req
        .new_password
        .ok_or_else(|| ApiError::bad_request("New password is required"))?;
    let hash = state.passwords.hash_password(&password)?;

    state.db.update_password(user_id, &hash).await?;
    state.db.end_user_sessions(user_id, None).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_PASSWORD_RESET", "user").entity(user_id),
    )
    .await;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    auth.require(&state, "users", "delete").await?;

    if user_id == auth.id() {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let user = state.db.get_user(user_id).await?;
    state.db.delete_user(user_id).await?;
    audit(
        &state.db,
        NewAuditLog::new(auth.id(), "USER_DELETED", "user")
            .entity(user_id)
            .old_values(json!({ "email": user.email })),
    )
    .await;

    Ok(Json(json!({ "message": "User deleted successfully" })))
}
